//! 提示模板
//!
//! 占位符：`{view}` 相机视角、`{desc}` 任务描述、`{pos}` 当前位置、`{goal}` 上一步目标（仅端到端任务）。

use super::StepContext;

const ACTIONS: &str = r#"You can control the drone to perform the following actions:
1. Turn (left/right) 90 degrees, where action_name="turn_left"/"turn_right", params=[]
2. Fly in a certain direction (left/right/forward/backward/up/down/up-left/up-right/down-left/down-right), where action_name="move_left"/"move_right"/"move_forward"/"move_backward"/"move_up"/"move_down"/"move_upleft"/"move_upright"/"move_downleft"/"move_downright", params=[]
3. Fly to specified coordinates, where action_name="fly_to", params={"x":int,"y":int}
4. Switch camera view (toggle between front and downward views), where action_name="switch_view", params=[]
5. Land, where action_name="land", params=[]"#;

const STAGE_FORMAT: &str = r#"Note: Your response should be in JSON format, containing the following information:
1. The next action (when the mission objective is completed, the next action is "task_complete");
2. Action parameters;
3. Basis/analysis for selecting the action (should be brief and concise!).
The following is an example:
{
    "action_name": "xxx",
    "params": {"xxx": 1.0},
    "analysis": "xxx"
}"#;

const E2E_FORMAT: &str = r#"First, determine whether the previous action achieved its goal. If not, keep the same goal. If it was achieved, plan the next goal and the corresponding action.
Note: Your response should be in JSON format and include the following information:
1. Whether the previous action achieved its goal;
2. The current mission goal;
3. The next action (when all steps are completed, the next action is "task_complete");
4. Parameters for the action;
5. Reasoning/analysis for selecting this action (should be concise!).
Here is an example:
{
    "last_goal_reached": true,
    "current_goal": "xxx",
    "action_name": "xxx",
    "params": {"xxx": 1.0},
    "analysis": "xxx"
}"#;

const INTRO: &str = "You are operating a drone, and this image is captured by the drone's {view} camera. Your overall mission objective is {desc}.";

pub const LAND_ON_SHIP_PLAN: &str = r#"You should complete the task step-by-step according to the following instructions:
1. Fly to the sea area where the target ship is located.
2. Search for the target ship within the target sea area.
3. Approach the target ship and fly directly above it.
4. Land on the target ship.

The known information is as follows:
1. The current position coordinates of the drone are {pos}.
2. The center coordinates of Sea Area X1 are (1100,2500).
3. The goal of the previous action was {goal}.

Hints (Important!!!):
1. If the destination coordinates are known and the distance is far (more than 200m), use the "fly_to" action.
2. If the target ship cannot be seen in the front view, turn left and search again; after a full rotation, ascend and search again.
3. If the target ship is visible in the front view, fly toward it. Once it disappears from the front view, switch to the downward view (do not switch while it is still visible in front!!!).
4. In the downward view, land only when the main body of the ship is at the center of the image."#;

pub const DELIVERY_PLAN: &str = r#"You should complete the task step by step as follows:
1. Fly over Bruce Port.
2. Search for a red cargo ship in the port.
3. Fly directly above the red cargo ship.
4. Land on the red cargo ship.

The known information is as follows:
1. The current position of the drone is {pos}.
2. The approximate coordinates of Bruce Port are (-2400, 400). Bruce Port is an area, so being a few hundred metres off can still be inside it.
3. The goal of the previous action was {goal}.

Tips (Important!!!):
1. If the destination is far (over 200m), use "fly_to".
2. If the red cargo ship is not visible in the front view, turn left and search again; after a full rotation, ascend and try again.
3. While the ship is visible in the front view, keep approaching. When it is no longer visible, switch to the downward view.
4. In the downward view, land only when containers of the red cargo ship fill the center of the image."#;

pub const FLY_TO_SEA_AREA: &str = r#"The known information is as follows:
1. The current position coordinates of the drone are {pos}.
2. The center coordinates of Area X1 are (1100, 2500).

Tips (Important!!!):
1. If the destination coordinates are known and the distance is far (more than 200m), it is recommended to use the "fly_to" action."#;

pub const FLY_TO_PORT: &str = r#"The known information is as follows:
1. The current position coordinates of the drone are {pos}.
2. The approximate coordinates of Bruce Port are (-2400, 400).

Tips (Important!!!):
1. If the destination coordinates are known and the distance is far (more than 200m), it is recommended to use the "fly_to" action."#;

pub const SEARCH_FOR_SHIP: &str = r#"The known information is as follows:
1. The current position coordinates of the drone are {pos}.

Tips (Important!!!):
1. If the target ship is not visible in the forward-looking camera view, try turning left and searching again;
2. If the target ship is still not found after a full rotation, try flying higher and searching again."#;

pub const APPROACH_SHIP: &str = r#"The known information is as follows:
1. The current position coordinates of the drone are {pos}.

Tips (Important!!!):
1. When the target ship appears in the front camera view, the drone is still far from it: fly toward the ship;
2. When the ship disappears from the front view, the drone is close: switch to the downward view (do NOT switch while it is still visible in the front view!!!);
3. In the downward view, if the center of the image shows the main body of the ship, the drone is directly above it; otherwise keep flying toward it."#;

/// 提示模板：端到端任务带上一步目标与目标追踪格式，分阶段任务只给当前阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    EndToEnd(&'static str),
    Stage(&'static str),
}

impl PromptTemplate {
    pub fn render(&self, desc: &str, ctx: &StepContext) -> String {
        let (body, format) = match self {
            Self::EndToEnd(body) => (*body, E2E_FORMAT),
            Self::Stage(body) => (*body, STAGE_FORMAT),
        };
        let text = format!("{}\n{}\n\n{}\n\n{}", INTRO, body, ACTIONS, format);
        let text = text
            .replace("{view}", &ctx.state.view)
            .replace("{desc}", desc)
            .replace("{pos}", &ctx.state.position_text());
        match self {
            Self::EndToEnd(_) => text.replace("{goal}", &ctx.last_goal),
            Self::Stage(_) => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::PositionView;

    fn ctx() -> StepContext {
        StepContext {
            step: 3,
            state: PositionView {
                x: 500.0,
                y: 2100.0,
                z: -50.0,
                view: "forward-looking".to_string(),
            },
            last_goal: "search for the carrier".to_string(),
        }
    }

    #[test]
    fn test_end_to_end_includes_goal() {
        let prompt = PromptTemplate::EndToEnd(LAND_ON_SHIP_PLAN).render("land on the carrier", &ctx());
        assert!(prompt.contains("forward-looking camera"));
        assert!(prompt.contains("(500, 2100, -50)"));
        assert!(prompt.contains("search for the carrier"));
        assert!(prompt.contains("last_goal_reached"));
        assert!(!prompt.contains("{pos}"));
        assert!(!prompt.contains("{goal}"));
    }

    #[test]
    fn test_stage_omits_goal() {
        let prompt = PromptTemplate::Stage(SEARCH_FOR_SHIP).render("find the carrier", &ctx());
        assert!(prompt.contains("find the carrier"));
        assert!(!prompt.contains("search for the carrier"));
        assert!(!prompt.contains("last_goal_reached"));
    }
}

//! 状态定义：TaskState 与对外投影 TaskSnapshot
//!
//! TaskState 只由步循环修改；外部（Hub、测试）只通过 watch 通道看到 TaskSnapshot 投影。

use std::sync::Arc;

use serde::Serialize;

use crate::mission::Mission;

/// 首步时的「上一步目标」
pub const INITIAL_GOAL: &str = "none(currently the first step)";

/// 任务阶段：IDLE → RUNNING → {COMPLETED, FAILED, ABORTED} → IDLE
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionPhase {
    Idle,
    Running,
    Completed,
    Failed,
    Aborted,
}

/// 单个任务的运行状态（每个编排器同一时刻只有一个处于活动中）
#[derive(Clone, Default)]
pub struct TaskState {
    pub mission: Option<Arc<dyn Mission>>,
    pub step_count: usize,
    pub last_goal: String,
    pub needs_enforcement: bool,
    pub started: bool,
    pub completed: bool,
}

impl TaskState {
    /// 任务开始时填充
    pub fn begin(mission: Arc<dyn Mission>) -> Self {
        Self {
            mission: Some(mission),
            step_count: 0,
            last_goal: INITIAL_GOAL.to_string(),
            needs_enforcement: false,
            started: true,
            completed: false,
        }
    }

    /// 完成、失败或步数耗尽后清空
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn snapshot(&self, phase: MissionPhase) -> TaskSnapshot {
        TaskSnapshot {
            phase,
            mission: self.mission.as_ref().map(|m| m.name().to_string()),
            step_count: self.step_count,
            needs_enforcement: self.needs_enforcement,
            last_goal: self.last_goal.clone(),
        }
    }
}

impl std::fmt::Debug for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskState")
            .field("mission", &self.mission.as_ref().map(|m| m.name()))
            .field("step_count", &self.step_count)
            .field("last_goal", &self.last_goal)
            .field("needs_enforcement", &self.needs_enforcement)
            .field("started", &self.started)
            .field("completed", &self.completed)
            .finish()
    }
}

/// 对外投影（watch 通道）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub phase: MissionPhase,
    pub mission: Option<String>,
    pub step_count: usize,
    pub needs_enforcement: bool,
    pub last_goal: String,
}

impl Default for TaskSnapshot {
    fn default() -> Self {
        TaskState::default().snapshot(MissionPhase::Idle)
    }
}

//! 数据驱动的任务描述：名称、描述、提示模板、强制提示、终止动作、初始位姿、完成规则

use async_trait::async_trait;

use crate::config::BOTTOM_VIEW;
use crate::control::{ActionGateway, Pose};
use crate::core::MissionError;

use super::geometry::{within_radius, Polygon};
use super::mask::SegMask;
use super::prompts::PromptTemplate;
use super::{Mission, StepContext};

/// 掩码中心窗口半边长（像素）
const CENTER_HALF_WINDOW: usize = 50;

/// 完成判定规则
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionRule {
    /// 位置落在区域内；require_downward 时还要求当前为下视
    InsideArea {
        area: Polygon,
        require_downward: bool,
    },
    /// 位置在圆形区域内
    NearPoint { center: (f64, f64), radius: f64 },
    /// 整幅掩码非零占比超过阈值
    MaskRatio { threshold: f64 },
    /// 下视且掩码中心窗口非零占比超过阈值
    CenterMaskRatio { threshold: f64 },
    /// 掩码非零像素数超过阈值
    MaskPixels { min: usize },
}

impl CompletionRule {
    pub async fn evaluate(&self, gateway: &dyn ActionGateway) -> Result<bool, MissionError> {
        match self {
            Self::InsideArea {
                area,
                require_downward,
            } => {
                let state = gateway.get_state().await?;
                if *require_downward && state.view != BOTTOM_VIEW {
                    return Ok(false);
                }
                Ok(area.contains(state.x, state.y))
            }
            Self::NearPoint { center, radius } => {
                let state = gateway.get_state().await?;
                Ok(within_radius(state.x, state.y, *center, *radius))
            }
            Self::MaskRatio { threshold } => {
                let mask = SegMask::load(&gateway.get_segmentation().await?).await?;
                Ok(mask.nonzero_ratio() > *threshold)
            }
            Self::CenterMaskRatio { threshold } => {
                let state = gateway.get_state().await?;
                if state.view != BOTTOM_VIEW {
                    return Ok(false);
                }
                let mask = SegMask::load(&gateway.get_segmentation().await?).await?;
                Ok(mask.center_ratio(CENTER_HALF_WINDOW) > *threshold)
            }
            Self::MaskPixels { min } => {
                let mask = SegMask::load(&gateway.get_segmentation().await?).await?;
                Ok(mask.nonzero_count() > *min)
            }
        }
    }
}

/// 不可变的任务描述；任务开始时按 key 查出，运行期间不修改
#[derive(Debug, Clone)]
pub struct MissionDescriptor {
    pub key: String,
    pub name: String,
    pub description: String,
    pub template: PromptTemplate,
    pub force_prompt: String,
    pub terminal_actions: Vec<String>,
    pub initial_pose: Option<Pose>,
    pub completion: CompletionRule,
}

#[async_trait]
impl Mission for MissionDescriptor {
    fn key(&self) -> &str {
        &self.key
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn build_prompt(&self, ctx: &StepContext) -> String {
        self.template.render(&self.description, ctx)
    }

    fn force_prompt(&self) -> &str {
        &self.force_prompt
    }

    fn terminal_actions(&self) -> &[String] {
        &self.terminal_actions
    }

    fn initial_pose(&self) -> Option<Pose> {
        self.initial_pose.clone()
    }

    async fn check_complete(&self, gateway: &dyn ActionGateway) -> Result<bool, MissionError> {
        let done = self.completion.evaluate(gateway).await?;
        tracing::info!(mission = %self.name, done, "Completion check");
        Ok(done)
    }
}

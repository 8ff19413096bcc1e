//! 任务层：任务能力接口、任务描述、任务目录
//!
//! 编排器只依赖 [`Mission`] 这一个能力接口（构建提示、决策、完成判定、格式化），
//! 不做任何按任务类型的分支；具体任务由 [`MissionKind`] 在任务开始时选出。

pub mod catalog;
pub mod descriptor;
pub mod geometry;
pub mod mask;
pub mod prompts;

use std::path::Path;

use async_trait::async_trait;

use crate::control::{ActionGateway, Pose, PositionView};
use crate::core::decision::{parse_decision, Decision};
use crate::core::{AgentError, MissionError};
use crate::llm::VisionAgent;

pub use catalog::{MissionCatalog, MissionKind};
pub use descriptor::{CompletionRule, MissionDescriptor};

/// 单步上下文：构建提示与格式化输出时使用
#[derive(Debug, Clone, PartialEq)]
pub struct StepContext {
    pub step: usize,
    pub state: PositionView,
    pub last_goal: String,
}

/// 任务能力接口
#[async_trait]
pub trait Mission: Send + Sync {
    /// 观众端使用的任务 key（如 drone_landing）
    fn key(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn build_prompt(&self, ctx: &StepContext) -> String;

    /// 判定未通过后追加到下一步提示末尾
    fn force_prompt(&self) -> &str;

    /// 选中即触发完成判定、不下发给飞行器的动作
    fn terminal_actions(&self) -> &[String];

    fn initial_pose(&self) -> Option<Pose>;

    fn is_terminal(&self, action_name: &str) -> bool {
        self.terminal_actions().iter().any(|a| a == action_name)
    }

    /// 调用视觉模型并解析为 Decision
    async fn decide(
        &self,
        agent: &dyn VisionAgent,
        prompt: &str,
        frame: &Path,
        _ctx: &StepContext,
    ) -> Result<Decision, AgentError> {
        let raw = agent.ask(prompt, Some(frame)).await?;
        tracing::info!(model = agent.model_name(), "Model response: {}", raw);
        parse_decision(&raw)
    }

    /// 完成判定；可自行向控制端取位置、分割掩码
    async fn check_complete(&self, gateway: &dyn ActionGateway) -> Result<bool, MissionError>;

    /// 给观众展示的决策文本
    fn format(&self, decision: &Decision, ctx: &StepContext) -> String {
        format_decision(decision, ctx)
    }
}

/// 默认格式：步数、位置、视角、动作、参数、依据
pub fn format_decision(decision: &Decision, ctx: &StepContext) -> String {
    let mut content = format!("步数: {}\n", ctx.step);
    content.push_str(&format!("当前位置: {}\n", ctx.state.position_text()));
    content.push_str(&format!("当前视角: {}\n", ctx.state.view));
    content.push_str(&format!("动作命令: {}\n", decision.action_name));
    content.push_str(&format!(
        "动作参数: {}\n",
        serde_json::Value::Object(decision.params.clone())
    ));
    content.push_str(&format!("决策依据: {}\n", decision.analysis));
    content
}

//! 错误类型与单步结果
//!
//! 控制端错误、模型错误都属于「单步致命」：在步循环边界被捕获，转成 system 事件并终止任务。
//! 完成判定失败不是错误，走 StepOutcome::Retry（强制提示重试）。

use thiserror::Error;

/// 飞行器控制端点错误（不可达、非 200、响应无法解析）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("control endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("control endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid control response: {0}")]
    Decode(String),

    #[error("control response missing field `{0}`")]
    MissingField(&'static str),
}

/// 视觉模型错误（请求失败、超时、输出无法解析为决策）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("agent request failed: {0}")]
    Request(String),

    #[error("agent call timed out after {0}s")]
    Timeout(u64),

    #[error("failed to parse decision: {0}")]
    Parse(String),

    #[error("failed to load image: {0}")]
    Image(String),
}

/// 任务级错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MissionError {
    /// 配置错误：未知任务 key，任务不会进入 RUNNING
    #[error("unknown mission type: {0}")]
    UnknownMission(String),

    #[error("mission `{0}` is already running")]
    AlreadyRunning(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("segmentation mask error: {0}")]
    Mask(String),
}

/// 任务终态
#[derive(Debug, Clone, PartialEq)]
pub enum MissionOutcome {
    /// 模型选择终止动作且完成判定通过
    Completed,
    /// 步数耗尽，但最后一次判定通过
    CompletedAtStepLimit,
    /// 步数耗尽且判定未通过
    StepLimitExceeded,
    /// 单步致命错误
    Failed(String),
    /// 关闭信号（步与步之间检查）
    Aborted,
}

impl MissionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::CompletedAtStepLimit)
    }
}

/// 单步执行结果，由步循环驱动状态迁移
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// 已执行一个飞行动作，继续下一步
    Advanced,
    /// 模型选择了终止动作但判定未通过：下一步带强制提示重试
    Retry,
    /// 任务结束
    Finished(MissionOutcome),
    /// 单步致命错误
    Fatal(String),
}

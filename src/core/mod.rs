//! 核心编排层：错误与单步结果、任务状态投影、决策解析、步循环编排、优雅关闭

pub mod decision;
pub mod error;
pub mod orchestrator;
pub mod shutdown;
pub mod state;

pub use decision::{parse_decision, Decision};
pub use error::{AgentError, GatewayError, MissionError, MissionOutcome, StepOutcome};
pub use orchestrator::{OrchestratorSettings, TaskOrchestrator};
pub use shutdown::{EventBusDrain, MissionDrain, ShutdownCoordinator, ShutdownManager, ShutdownReason};
pub use state::{MissionPhase, TaskSnapshot, TaskState, INITIAL_GOAL};

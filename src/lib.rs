//! UAV Pilot - 视觉模型驱动的无人机任务编排
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **observability**: 日志（终端 + 滚动文件）
//! - **core**: 错误、任务状态、决策解析、步循环编排、优雅关闭
//! - **control**: 动作网关（`POST /control`）、内置仿真器、静态帧服务
//! - **llm**: 视觉模型抽象与实现（OpenAI 兼容 / Ollama / Scripted）
//! - **mission**: 任务能力接口、任务描述与目录、提示模板、几何与掩码判定
//! - **gateway**: 事件总线与观众 WebSocket 网关

pub mod config;
pub mod control;
pub mod core;
pub mod gateway;
pub mod llm;
pub mod mission;
pub mod observability;

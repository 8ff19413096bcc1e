//! 观众网关：事件总线、观众端协议、WebSocket 连接中枢
//!
//! ## 数据流
//!
//! ConnectionHub → TaskOrchestrator（启动任务）→ ActionGateway / VisionAgent →
//! EventBus → 所有已注册的观众连接。
//!
//! 总线是唯一的广播出口：步循环只管 publish（入队即返回），
//! 分发任务负责带超时的逐连接投递并清理失效连接。

mod bus;
mod hub;
mod message;

pub use bus::{EventBus, EventSink};
pub use hub::{ConnectionHub, WsSink};
pub use message::{Event, EventBody, Inbound, Role};

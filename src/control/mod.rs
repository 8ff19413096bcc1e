//! 飞行器控制层：动作网关、协议类型、内置仿真器、静态帧服务

pub mod client;
pub mod files;
pub mod sim;
pub mod types;

pub use client::{ActionGateway, HttpActionGateway};
pub use sim::VehicleSim;
pub use types::{ActionResult, ControlRequest, Pose, PositionView};

//! 观众端协议：入站 `{type, content}`，出站事件 `{role, image|response}`

use std::path::Path;

use serde::{Deserialize, Serialize};

/// 事件角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Model,
    System,
}

/// 事件载荷：图像引用（文件名，经静态帧服务取回）或文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventBody {
    Image(String),
    Response(String),
}

/// 发给观众的不可变事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub role: Role,
    #[serde(flatten)]
    pub body: EventBody,
}

impl Event {
    /// 图像事件；只保留文件名
    pub fn image(role: Role, path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            role,
            body: EventBody::Image(name),
        }
    }

    pub fn response(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            body: EventBody::Response(text.into()),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::response(Role::System, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::response(Role::Model, text)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawInbound {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: String,
}

/// 入站请求
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// 启动任务，content 为任务 key
    Task(String),
    /// 一次性提问，绕过步循环
    Message(String),
}

impl Inbound {
    /// 解析入站文本；非法 JSON 或未知 type 属于协议错误
    pub fn parse(text: &str) -> Result<Self, String> {
        let raw: RawInbound = serde_json::from_str(text).map_err(|e| format!("invalid message: {}", e))?;
        match raw.kind.as_str() {
            "task" => Ok(Self::Task(raw.content)),
            "message" => Ok(Self::Message(raw.content)),
            other => Err(format!("未知的消息类型: {}", other)),
        }
    }
}

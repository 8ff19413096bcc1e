//! 脚本化视觉模型（测试与 `mock` provider 使用，无需后端）
//!
//! 按入队顺序逐条回放响应，并记录收到的每个提示，便于断言强制提示等行为。

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::llm::VisionAgent;

/// 默认回放：原地悬停
pub const HOVER_RESPONSE: &str = r#"{"action_name": "hover", "params": {}, "analysis": "scripted agent", "current_goal": "hold position"}"#;

#[derive(Debug, Default)]
pub struct ScriptedAgent {
    responses: Mutex<VecDeque<Result<String, AgentError>>>,
    /// 队列为空时的回放；None 时返回 Request 错误
    fallback: Option<String>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
    images: Mutex<Vec<Option<PathBuf>>>,
}

impl ScriptedAgent {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|s| Ok(s.into())).collect()),
            ..Self::default()
        }
    }

    /// 队列耗尽后一直返回同一条响应
    pub fn repeating(response: impl Into<String>) -> Self {
        Self {
            fallback: Some(response.into()),
            ..Self::default()
        }
    }

    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// 每次调用前等待，用于超时测试
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, response: impl Into<String>) {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(Ok(response.into()));
        }
    }

    pub fn push_error(&self, err: AgentError) {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(Err(err));
        }
    }

    /// 已收到的提示（按调用顺序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn images(&self) -> Vec<Option<PathBuf>> {
        self.images.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl VisionAgent for ScriptedAgent {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn ask(&self, question: &str, image: Option<&Path>) -> Result<String, AgentError> {
        if let Ok(mut p) = self.prompts.lock() {
            p.push(question.to_string());
        }
        if let Ok(mut i) = self.images.lock() {
            i.push(image.map(Path::to_path_buf));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(result) => result,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| AgentError::Request("scripted agent has no response left".to_string())),
        }
    }
}

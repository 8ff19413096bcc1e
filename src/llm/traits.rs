//! 视觉决策模型抽象
//!
//! 所有后端（OpenAI 兼容 / Ollama / Scripted）实现 VisionAgent：给定提示与可选图像，返回原始文本。
//! 契约里没有重试；超时由调用方用 `tokio::time::timeout` 包裹。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::core::AgentError;

/// 视觉模型客户端 trait
#[async_trait]
pub trait VisionAgent: Send + Sync {
    fn model_name(&self) -> &str;

    /// 单轮问答；image 为本地帧路径
    async fn ask(&self, question: &str, image: Option<&Path>) -> Result<String, AgentError>;
}

/// 在调用方给定的时限内调用模型
pub async fn ask_with_timeout(
    agent: &dyn VisionAgent,
    question: &str,
    image: Option<&Path>,
    timeout_secs: u64,
) -> Result<String, AgentError> {
    match tokio::time::timeout(Duration::from_secs(timeout_secs), agent.ask(question, image)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(model = agent.model_name(), "Agent call timed out after {}s", timeout_secs);
            Err(AgentError::Timeout(timeout_secs))
        }
    }
}

/// 读取图像并编码为 base64；返回 (mime, data)
pub async fn encode_image(path: &Path) -> Result<(&'static str, String), AgentError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AgentError::Image(format!("{}: {}", path.display(), e)))?;
    Ok((mime_for(path), STANDARD.encode(bytes)))
}

/// `data:` URL 形式，供 OpenAI 兼容接口的 image_url 使用
pub async fn image_data_url(path: &Path) -> Result<String, AgentError> {
    let (mime, data) = encode_image(path).await?;
    Ok(format!("data:{};base64,{}", mime, data))
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

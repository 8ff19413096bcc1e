//! OpenAI 兼容视觉模型客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 OpenAI、DashScope（Qwen-VL）、自建代理等。
//! 图像以 base64 `data:` URL 放入 user 消息的 image_url 部分。

use std::path::Path;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessageContentPartImageArgs, ChatCompletionRequestMessageContentPartTextArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
    CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::core::AgentError;
use crate::llm::traits::image_data_url;
use crate::llm::VisionAgent;

/// OpenAI 兼容客户端：持有 Client、model 名与 max_tokens
pub struct OpenAiAgent {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
}

impl OpenAiAgent {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>, max_tokens: u32) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .or_else(|| std::env::var("DASHSCOPE_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            max_tokens,
        }
    }

    async fn user_parts(
        &self,
        question: &str,
        image: Option<&Path>,
    ) -> Result<Vec<ChatCompletionRequestUserMessageContentPart>, AgentError> {
        let mut parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();
        if let Some(path) = image {
            let url = ImageUrlArgs::default()
                .url(image_data_url(path).await?)
                .detail(ImageDetail::Auto)
                .build()
                .map_err(|e| AgentError::Request(e.to_string()))?;
            parts.push(
                ChatCompletionRequestMessageContentPartImageArgs::default()
                    .image_url(url)
                    .build()
                    .map_err(|e| AgentError::Request(e.to_string()))?
                    .into(),
            );
        }
        parts.push(
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(question)
                .build()
                .map_err(|e| AgentError::Request(e.to_string()))?
                .into(),
        );
        Ok(parts)
    }
}

#[async_trait]
impl VisionAgent for OpenAiAgent {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn ask(&self, question: &str, image: Option<&Path>) -> Result<String, AgentError> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(self.user_parts(question, image).await?)
            .build()
            .map_err(|e| AgentError::Request(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![message.into()])
            .max_completion_tokens(self.max_tokens)
            .build()
            .map_err(|e| AgentError::Request(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AgentError::Request(e.to_string()))?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Token usage"
            );
        }

        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}

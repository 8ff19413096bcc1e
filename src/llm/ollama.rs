//! Ollama 视觉模型客户端（`POST {base}/api/chat`，非流式）

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::traits::encode_image;
use crate::llm::VisionAgent;

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    num_predict: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

pub struct OllamaAgent {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

impl OllamaAgent {
    pub fn new(base_url: Option<&str>, model: &str, max_tokens: u32) -> Self {
        let base = base_url.unwrap_or(OLLAMA_BASE_URL).trim_end_matches('/');
        Self {
            client: Client::new(),
            endpoint: format!("{}/api/chat", base),
            model: model.to_string(),
            max_tokens,
        }
    }
}

#[async_trait]
impl VisionAgent for OllamaAgent {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn ask(&self, question: &str, image: Option<&Path>) -> Result<String, AgentError> {
        let images = match image {
            Some(path) => vec![encode_image(path).await?.1],
            None => Vec::new(),
        };
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: question.to_string(),
                images,
            }],
            stream: false,
            options: ChatOptions {
                num_predict: self.max_tokens,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::Request(format!("ollama returned {}: {}", status, text)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Request(e.to_string()))?;
        Ok(parsed.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_chat_sends_base64_image() {
        let app = Router::new().route(
            "/api/chat",
            post(|Json(body): Json<Value>| async move {
                let msg = &body["messages"][0];
                Json(json!({
                    "model": body["model"],
                    "message": {
                        "role": "assistant",
                        "content": format!("{}|{}|{}", msg["content"].as_str().unwrap_or(""), msg["images"][0].as_str().unwrap_or(""), body["stream"]),
                    },
                    "done": true
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let frame = dir.path().join("f.png");
        std::fs::write(&frame, [1u8, 2, 3]).unwrap();

        let agent = OllamaAgent::new(Some(&format!("http://{}/", addr)), "qwen2.5vl:7b", 300);
        let out = agent.ask("where?", Some(&frame)).await.unwrap();
        assert_eq!(out, "where?|AQID|false");
    }
}

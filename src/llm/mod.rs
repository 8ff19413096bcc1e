//! 视觉模型层：客户端抽象与实现（OpenAI 兼容 / Ollama / Scripted）

pub mod mock;
pub mod ollama;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::ScriptedAgent;
pub use ollama::OllamaAgent;
pub use openai::OpenAiAgent;
pub use traits::{ask_with_timeout, VisionAgent};

use crate::config::AgentSection;

/// 按配置创建视觉模型客户端；未知 provider 回退到 Ollama
pub fn create_agent_from_config(cfg: &AgentSection) -> Arc<dyn VisionAgent> {
    let base_url = cfg.base_url.as_deref();
    match cfg.provider.as_str() {
        "openai" | "dashscope" => Arc::new(OpenAiAgent::new(
            base_url,
            &cfg.model,
            cfg.api_key.as_deref(),
            cfg.max_tokens,
        )),
        "mock" => Arc::new(ScriptedAgent::repeating(mock::HOVER_RESPONSE)),
        "ollama" => Arc::new(OllamaAgent::new(base_url, &cfg.model, cfg.max_tokens)),
        other => {
            tracing::warn!("Unknown agent provider {}, falling back to ollama", other);
            Arc::new(OllamaAgent::new(base_url, &cfg.model, cfg.max_tokens))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_picks_provider() {
        let mut cfg = AgentSection::default();
        assert_eq!(create_agent_from_config(&cfg).model_name(), "qwen2.5vl:7b");
        cfg.provider = "mock".to_string();
        assert_eq!(create_agent_from_config(&cfg).model_name(), "scripted");
    }
}

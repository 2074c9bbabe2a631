//! 决策 oracle：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use deepseek::{create_deepseek_client, deepseek_api_key, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmReply, ToolCall, ToolSpec};

use crate::config::LlmSection;
use crate::core::{CataError, Result};

/// 按配置构造 oracle；没有可用配置时返回 OracleUnavailable
pub fn create_client(cfg: &LlmSection) -> Result<Arc<dyn LlmClient>> {
    if !cfg.enabled {
        return Err(CataError::OracleUnavailable("llm.enabled = false".into()));
    }
    let timeout = Duration::from_secs(cfg.timeout_secs.max(1));

    match cfg.provider.trim().to_ascii_lowercase().as_str() {
        "mock" => Ok(Arc::new(MockLlmClient::new())),
        "deepseek" => {
            let key = deepseek_api_key(cfg.api_key.as_deref()).ok_or_else(|| {
                CataError::OracleUnavailable("no DeepSeek API key configured".into())
            })?;
            let client = match &cfg.base_url {
                Some(url) => OpenAiClient::new(
                    url,
                    cfg.model.as_deref().unwrap_or(DEEPSEEK_CHAT),
                    &key,
                    cfg.max_tokens,
                    timeout,
                ),
                None => create_deepseek_client(cfg.model.as_deref(), &key, cfg.max_tokens, timeout),
            }
            .map_err(CataError::OracleUnavailable)?;
            Ok(Arc::new(client))
        }
        "openai" => {
            let key = cfg
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| CataError::OracleUnavailable("no OpenAI API key configured".into()))?;
            let client = OpenAiClient::new(
                cfg.base_url.as_deref().unwrap_or(openai::OPENAI_BASE_URL),
                cfg.model.as_deref().unwrap_or(openai::OPENAI_DEFAULT_MODEL),
                &key,
                cfg.max_tokens,
                timeout,
            )
            .map_err(CataError::OracleUnavailable)?;
            Ok(Arc::new(client))
        }
        other => Err(CataError::OracleUnavailable(format!(
            "unknown llm provider: {}",
            other
        ))),
    }
}

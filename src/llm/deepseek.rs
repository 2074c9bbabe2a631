//! DeepSeek 预设（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat (常规对话), deepseek-reasoner (思考模式)

use std::time::Duration;

use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 密钥：显式传入 > DEEPSEEK_API_KEY > OPENAI_API_KEY；都没有时返回 None
pub fn deepseek_api_key(explicit: Option<&str>) -> Option<String> {
    explicit
        .filter(|k| !k.trim().is_empty())
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_API_KEY").ok())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .filter(|k| !k.trim().is_empty())
}

/// 模型：显式传入 > DEEPSEEK_MODEL > deepseek-chat
pub fn create_deepseek_client(
    model: Option<&str>,
    api_key: &str,
    max_tokens: u32,
    timeout: Duration,
) -> Result<OpenAiClient, String> {
    let model = model
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());

    OpenAiClient::new(DEEPSEEK_BASE_URL, &model, api_key, max_tokens, timeout)
}

//! 决策 oracle 抽象
//!
//! complete 用于纯文本补全；complete_with_tools 额外声明可调用的函数，返回文本与函数调用。
//! 输出一律视为不可信文本，由调用方解析。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::memory::Message;

/// 提供给 oracle 的函数声明（技能以零参数函数形式暴露）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    /// 无必填参数；可选 `args: string[]`
    pub fn no_args(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "args": { "type": "array", "items": { "type": "string" } }
                }
            }),
        }
    }
}

/// oracle 请求的一次函数调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// 原始 JSON 参数文本
    #[serde(default)]
    pub arguments: String,
}

impl ToolCall {
    /// 解析 `{"args": [..]}`；缺失或格式不符时为空
    pub fn args(&self) -> Vec<String> {
        serde_json::from_str::<serde_json::Value>(&self.arguments)
            .ok()
            .and_then(|v| v.get("args").and_then(|a| a.as_array()).cloned())
            .map(|arr| {
                arr.iter()
                    .filter_map(|x| x.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 默认实现忽略 tools，只返回文本
    async fn complete_with_tools(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<LlmReply, String> {
        let content = self.complete(messages).await?;
        Ok(LlmReply {
            content,
            tool_calls: Vec::new(),
        })
    }

    /// 累计 token：(prompt, completion, total)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }

    fn model_name(&self) -> &str {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_args() {
        let call = ToolCall {
            id: "1".into(),
            name: "skill_x".into(),
            arguments: r#"{"args":["a","b"]}"#.into(),
        };
        assert_eq!(call.args(), vec!["a", "b"]);

        let empty = ToolCall {
            id: "2".into(),
            name: "skill_x".into(),
            arguments: "{}".into(),
        };
        assert!(empty.args().is_empty());
    }
}

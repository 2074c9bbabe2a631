//! Mock oracle（测试与 `provider = "mock"` 使用，无需网络）
//!
//! 按顺序弹出预置回复；队列为空时返回一个 idle 方案。可切换为始终失败。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmReply, ToolCall, ToolSpec};
use crate::memory::Message;

pub const MOCK_IDLE_PLAN: &str = r#"{"action":"idle","reason":"mock oracle has nothing scripted","steps":[],"expected_outcome":"","priority":1}"#;

#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<LlmReply>>,
    failing: AtomicBool,
    calls: AtomicUsize,
    last_tools: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次调用都返回错误
    pub fn failing() -> Self {
        let m = Self::default();
        m.failing.store(true, Ordering::SeqCst);
        m
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let m = Self::default();
        for r in replies {
            m.push_reply(r);
        }
        m
    }

    pub fn push_reply(&self, content: impl Into<String>) {
        self.push(LlmReply {
            content: content.into(),
            tool_calls: Vec::new(),
        });
    }

    /// 预置一条带函数调用的回复
    pub fn push_tool_reply(&self, content: impl Into<String>, calls: Vec<(&str, &str)>) {
        self.push(LlmReply {
            content: content.into(),
            tool_calls: calls
                .into_iter()
                .enumerate()
                .map(|(i, (name, args))| ToolCall {
                    id: format!("call_{}", i),
                    name: name.to_string(),
                    arguments: args.to_string(),
                })
                .collect(),
        });
    }

    fn push(&self, reply: LlmReply) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(reply);
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 最近一次调用收到的函数名
    pub fn last_tool_names(&self) -> Vec<String> {
        self.last_tools.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn next(&self) -> Result<LlmReply, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err("mock oracle failure".to_string());
        }
        let scripted = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        Ok(scripted.unwrap_or_else(|| LlmReply {
            content: MOCK_IDLE_PLAN.to_string(),
            tool_calls: Vec::new(),
        }))
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        Ok(self.next()?.content)
    }

    async fn complete_with_tools(
        &self,
        _messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<LlmReply, String> {
        if let Ok(mut last) = self.last_tools.lock() {
            *last = tools.iter().map(|t| t.name.clone()).collect();
        }
        self.next()
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_default() {
        let mock = MockLlmClient::with_replies(["first"]);
        assert_eq!(mock.complete(&[]).await.unwrap(), "first");
        assert_eq!(mock.complete(&[]).await.unwrap(), MOCK_IDLE_PLAN);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let mock = MockLlmClient::failing();
        assert!(mock.complete(&[]).await.is_err());
        mock.set_failing(false);
        assert!(mock.complete(&[]).await.is_ok());
    }
}

//! 控制协议：每行一个 JSON 请求，每个请求恰好一行 JSON 响应

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Request {
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok_with(message: impl Into<String>, data: impl Serialize) -> Self {
        // 序列化失败时降级为无 data 的响应
        let data = serde_json::to_value(data).ok();
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    /// 一行 JSON（不含换行）
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"success":false,"message":"response encoding failed: {}"}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }
}

/// 解析一行请求；失败时返回应答给客户端的错误响应
pub fn parse_request(line: &str) -> Result<Request, Response> {
    serde_json::from_str(line).map_err(|e| Response::error(format!("Invalid request: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pong_line_omits_data() {
        assert_eq!(Response::ok("pong").to_line(), r#"{"success":true,"message":"pong"}"#);
    }

    #[test]
    fn test_parse_request() {
        let req = parse_request(r#"{"command":"recall","args":["tokio","3"]}"#).unwrap();
        assert_eq!(req, Request::new("recall", ["tokio", "3"]));

        let no_args = parse_request(r#"{"command":"ping"}"#).unwrap();
        assert!(no_args.args.is_empty());

        let bad = parse_request("{not json").unwrap_err();
        assert!(!bad.success);
        assert!(bad.message.starts_with("Invalid request: "));
    }
}

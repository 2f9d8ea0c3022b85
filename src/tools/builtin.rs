//! 内置演示工具：echo 与 clock
//!
//! 参数 schema 由 schemars 从参数结构体派生，保证与解析代码一致。

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::tools::Tool;

/// Echo 工具：回显文本（测试用）
pub struct EchoTool;

#[derive(Deserialize, JsonSchema)]
struct EchoArgs {
    /// 要回显的文本
    text: String,
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text back (for testing). Args: {\"text\": \"message\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schema_for!(EchoArgs)).unwrap_or_default()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: EchoArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        Ok(args.text)
    }
}

/// Clock 工具：返回当前 UTC 时间（RFC 3339）
pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Return the current UTC time in RFC 3339 format. No arguments."
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        Ok(chrono::Utc::now().to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo() {
        let out = EchoTool
            .execute(serde_json::json!({"text": "hello"}))
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_echo_missing_arg_fails() {
        assert!(EchoTool.execute(serde_json::json!({})).await.is_err());
    }

    #[test]
    fn test_echo_schema_is_object() {
        let schema = EchoTool.parameters_schema();
        assert_eq!(schema.get("type").unwrap().as_str().unwrap(), "object");
    }

    #[tokio::test]
    async fn test_clock_returns_rfc3339() {
        let out = ClockTool.execute(serde_json::json!({})).await.unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&out).is_ok());
    }
}

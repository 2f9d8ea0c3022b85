//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时，dispatch 一个 ToolCallRequest 并产出
//! ToolCallRecord：成功、失败、超时、未注册统一收敛为记录 + 工具结果文本，
//! 调用彼此隔离（单个失败不影响其余调用）；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::ToolCallRequest;
use crate::tools::ToolRegistry;

/// 一次工具调用的记录（随任务结果返回，供观测与诊断）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    /// 成功时的结果文本
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// 失败时的错误文本（与 result 互斥）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ToolCallRecord {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// 写回对话的工具结果文本：成功为结果本身，失败为 Error: 前缀文本，
    /// 让模型能在下一轮感知并自行恢复
    pub fn observation(&self) -> String {
        match (&self.result, &self.error) {
            (Some(r), _) => r.clone(),
            (None, Some(e)) => format!("Error: {}", e),
            (None, None) => String::new(),
        }
    }
}

/// 工具执行器：对每次调用施加超时，并把结果映射为 ToolCallRecord
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// 分发一次调用；任何失败（未注册 / 执行失败 / 超时）都收敛为带 error
    /// 的记录而不向上抛出，保证调用间隔离。输出 JSON 审计日志。
    pub async fn dispatch(&self, call: &ToolCallRequest) -> ToolCallRecord {
        let start = Instant::now();
        let result = timeout(
            self.timeout,
            self.registry.execute(&call.name, call.arguments.clone()),
        )
        .await;

        let (outcome, record_result, record_error) = match result {
            Ok(Ok(content)) => ("ok", Some(content), None),
            Ok(Err(AgentError::ToolNotFound(name))) => (
                "not_found",
                None,
                Some(format!("tool '{}' is not registered", name)),
            ),
            Ok(Err(e)) => ("error", None, Some(e.to_string())),
            Err(_) => (
                "timeout",
                None,
                Some(format!(
                    "tool '{}' timed out after {}s",
                    call.name,
                    self.timeout.as_secs()
                )),
            ),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "ok": record_error.is_none(),
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview(&call.arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        ToolCallRecord {
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            result: record_result,
            error: record_error,
            duration_ms,
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EchoTool, FunctionTool};

    fn call(name: &str, args: serde_json::Value) -> ToolCallRequest {
        ToolCallRequest {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments: args,
        }
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(EchoTool).unwrap();
        let executor = ToolExecutor::new(registry, 5);

        let record = executor
            .dispatch(&call("echo", serde_json::json!({"text": "hi"})))
            .await;
        assert!(record.is_ok());
        assert_eq!(record.observation(), "hi");
        assert_eq!(record.tool_name, "echo");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool_is_isolated() {
        let registry = Arc::new(ToolRegistry::new());
        let executor = ToolExecutor::new(registry, 5);

        let record = executor.dispatch(&call("nope", serde_json::json!({}))).await;
        assert!(!record.is_ok());
        assert!(record.observation().contains("not registered"));
    }

    #[tokio::test]
    async fn test_dispatch_failure_becomes_record() {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(FunctionTool::new(
                "failing",
                "always fails",
                serde_json::json!({"type": "object", "properties": {}}),
                |_| std::future::ready(Err("boom".to_string())),
            ))
            .unwrap();
        let executor = ToolExecutor::new(registry, 5);

        let record = executor.dispatch(&call("failing", serde_json::json!({}))).await;
        assert!(!record.is_ok());
        assert!(record.observation().starts_with("Error:"));
        assert!(record.observation().contains("boom"));
    }

    #[tokio::test]
    async fn test_dispatch_timeout() {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(FunctionTool::new(
                "slow",
                "sleeps forever",
                serde_json::json!({"type": "object", "properties": {}}),
                |_| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(String::new())
                },
            ))
            .unwrap();
        let executor = ToolExecutor::new(registry, 1);

        let start = Instant::now();
        let record = executor.dispatch(&call("slow", serde_json::json!({}))).await;
        assert!(!record.is_ok());
        assert!(record.observation().contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}

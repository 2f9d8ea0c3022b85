//! 工具调用 JSON Schema 生成（schemars）
//!
//! 将「合法 tool call」的 JSON 结构注入 system prompt，帮助不支持原生
//! tool calling 的端点也能输出格式正确的调用。

use schemars::{schema_for, JsonSchema};
use std::collections::HashMap;

/// 工具调用请求格式（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，必须是已注册工具之一
    pub tool: String,
    /// 工具参数，依工具各自的 parameters schema 而定
    pub args: HashMap<String, String>,
}

/// 返回工具调用的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

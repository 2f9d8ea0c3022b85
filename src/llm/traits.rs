//! 完成服务抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 ChatClient：chat（非流式，返回文本
//! 或工具调用请求列表）、chat_stream（流式增量）。工具 schema 由注册表
//! 提供，随请求下发给 API。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::Message;

/// 完成服务错误（本层不重试，重试策略属于具体客户端）
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,
}

/// 模型发起的一次工具调用请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// 调用 id，工具结果消息通过 tool_call_id 与之对应
    pub id: String,
    /// 工具名
    pub name: String,
    /// 参数（键值 JSON 对象）
    pub arguments: serde_json::Value,
}

/// 下发给完成服务的工具描述（来自注册表 list_schemas）
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema（object 类型）
    pub parameters: serde_json::Value,
}

/// 一次完成调用的结果：文本回复和/或工具调用请求
#[derive(Debug, Clone, Default)]
pub struct ChatOutcome {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ChatOutcome {
    pub fn reply(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: String::new(),
            tool_calls: calls,
        }
    }
}

/// 流式增量：文本片段或完整的工具调用请求
#[derive(Debug, Clone)]
pub enum ChatDelta {
    Content(String),
    ToolCall(ToolCallRequest),
}

/// 流式完成返回的增量流
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatDelta, LlmError>> + Send>>;

/// 完成服务客户端 trait
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// 非流式完成
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ChatOutcome, LlmError>;

    /// 流式完成，返回增量流
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ChatStream, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

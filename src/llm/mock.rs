//! Mock 完成服务（用于测试，无需 API）
//!
//! 按预置脚本依次弹出 ChatOutcome；脚本耗尽后回显最后一条 user 消息，
//! 便于本地跑通整个执行循环。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{ChatClient, ChatDelta, ChatOutcome, ChatStream, LlmError, ToolCallRequest, ToolSchema};
use crate::memory::{Message, Role};

/// Mock 客户端：脚本驱动，记录调用次数
#[derive(Default)]
pub struct MockChatClient {
    script: Mutex<VecDeque<ChatOutcome>>,
    calls: AtomicUsize,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以预置脚本创建：每次 chat 依次弹出一个结果
    pub fn with_script(outcomes: Vec<ChatOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// 追加一个纯文本回复
    pub fn push_reply(&self, content: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(ChatOutcome::reply(content));
    }

    /// 追加一个工具调用回合
    pub fn push_tool_call(&self, name: &str, arguments: serde_json::Value) {
        let seq = self.script.lock().unwrap().len();
        self.script
            .lock()
            .unwrap()
            .push_back(ChatOutcome::with_tool_calls(vec![ToolCallRequest {
                id: format!("call_{}", seq),
                name: name.to_string(),
                arguments,
            }]));
    }

    /// 已处理的 chat 调用次数
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn chat(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
    ) -> Result<ChatOutcome, LlmError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return Ok(next);
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(ChatOutcome::reply(format!("Echo: {}", last_user)))
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ChatStream, LlmError> {
        let outcome = self.chat(messages, tools).await?;
        let mut deltas: Vec<Result<ChatDelta, LlmError>> = Vec::new();
        if !outcome.content.is_empty() {
            deltas.push(Ok(ChatDelta::Content(outcome.content)));
        }
        for call in outcome.tool_calls {
            deltas.push(Ok(ChatDelta::ToolCall(call)));
        }
        Ok(Box::pin(stream::iter(deltas)))
    }
}

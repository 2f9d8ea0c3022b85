//! 短期记忆：单次任务内的有序消息历史
//!
//! 可选上界（max_messages），超出时从最旧一侧淘汰；消息顺序即对话顺序，
//! 引擎在 COLLECT_CONTEXT / DISPATCH_TOOLS 阶段写入，CALL_MODEL 阶段整体读出。

use crate::memory::{Message, Role};

/// 短期记忆：有序、可选有界的消息序列
#[derive(Clone, Debug)]
pub struct ShortTermMemory {
    messages: Vec<Message>,
    /// None 表示不设上界
    max_messages: Option<usize>,
}

impl ShortTermMemory {
    pub fn new(max_messages: Option<usize>) -> Self {
        Self {
            messages: Vec::new(),
            max_messages,
        }
    }

    /// 追加一条消息并按需淘汰最旧消息
    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
        self.prune();
    }

    /// 追加 role + content（system/user/assistant 场景）
    pub fn add(&mut self, role: Role, content: impl Into<String>) {
        let content = content.into();
        let msg = match role {
            Role::User => Message::user(content),
            Role::Assistant => Message::assistant(content),
            Role::System => Message::system(content),
            Role::Tool => Message {
                role: Role::Tool,
                content,
                tool_call_id: None,
                tool_calls: Vec::new(),
            },
        };
        self.push(msg);
    }

    /// 追加一条工具结果消息；content 前缀工具名便于模型对应多次调用
    pub fn add_tool_result(
        &mut self,
        tool_name: &str,
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
    ) {
        let body = format!("[{}] {}", tool_name, content.into());
        self.push(Message::tool(body, tool_call_id));
    }

    pub fn get_all(&self) -> &[Message] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 超出 max_messages 时丢弃最旧的消息，保留最近部分
    fn prune(&mut self) {
        if let Some(max) = self.max_messages {
            if self.messages.len() > max {
                let excess = self.messages.len() - max;
                self.messages.drain(..excess);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_keeps_all() {
        let mut mem = ShortTermMemory::new(None);
        for i in 0..100 {
            mem.add(Role::User, format!("msg {}", i));
        }
        assert_eq!(mem.len(), 100);
    }

    #[test]
    fn test_oldest_first_eviction() {
        let mut mem = ShortTermMemory::new(Some(3));
        mem.add(Role::User, "a");
        mem.add(Role::Assistant, "b");
        mem.add(Role::User, "c");
        mem.add(Role::Assistant, "d");
        assert_eq!(mem.len(), 3);
        assert_eq!(mem.get_all()[0].content, "b");
        assert_eq!(mem.get_all()[2].content, "d");
    }

    #[test]
    fn test_add_tool_result() {
        let mut mem = ShortTermMemory::new(None);
        mem.add_tool_result("get_weather", "Sunny, 20°C", "call_1");
        let msg = &mem.get_all()[0];
        assert_eq!(msg.role, Role::Tool);
        assert!(msg.content.contains("get_weather"));
        assert!(msg.content.contains("Sunny"));
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_clear() {
        let mut mem = ShortTermMemory::new(None);
        mem.add(Role::User, "a");
        mem.clear();
        assert!(mem.is_empty());
    }
}

//! 任务执行过程事件：用于流式/SSE 展示推理、工具调用、观察与回复

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// 循环步数更新（当前第几轮）
    StepUpdate { iteration: usize, max_iterations: usize },
    /// 正在调用完成服务
    Thinking,
    /// 从长期记忆注入了历史消息
    MemoryPrimed { messages: usize },
    /// 规划完成（步骤数；cyclic 表示存在依赖环、已按出现顺序回退）
    PlanReady { steps: usize, cyclic: bool },
    /// 发起工具调用
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    /// 工具执行失败（已转为工具结果消息，循环继续）
    ToolFailure { tool: String, reason: String },
    /// 最终回复的一小段（流式输出）
    MessageChunk { text: String },
    /// 最终回复结束
    MessageDone,
    /// 错误
    Error { text: String },
}

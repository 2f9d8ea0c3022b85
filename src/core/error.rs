//! Agent 错误类型
//!
//! 错误分级：ValidationError 立即拒绝不重试；工具类错误按调用隔离、
//! 转为工具结果消息后循环继续；IterationLimitExceeded / Collaborator /
//! Cancelled 为终止性错误，随 TaskFailure 携带已完成的部分进度返回。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::MemoryError;
use crate::tools::ToolCallRecord;

/// Agent 运行过程中可能出现的错误
#[derive(Debug, Error)]
pub enum AgentError {
    /// 输入校验失败（空任务、空工具名、非法 schema 等）
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    /// 超过最大推理-工具循环次数，防止无限循环
    #[error("Iteration limit exceeded after {0} iteration(s)")]
    IterationLimitExceeded(usize),

    /// 任务级墙钟超时（可选配置）
    #[error("Task timeout after {0}s")]
    TaskTimeout(u64),

    /// 完成服务不可用或返回错误；本层不重试
    #[error("Completion service error: {0}")]
    Collaborator(#[from] LlmError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Cancelled")]
    Cancelled,
}

/// 任务失败载荷：终止性错误 + 已完成的部分进度（供诊断）
#[derive(Debug, Error)]
#[error("task failed after {iterations} iteration(s): {error}")]
pub struct TaskFailure {
    #[source]
    pub error: AgentError,
    /// 已完成的推理-工具循环次数
    pub iterations: usize,
    /// 失败前累计的工具调用记录
    pub tool_calls: Vec<ToolCallRecord>,
}

impl TaskFailure {
    pub fn new(error: AgentError, iterations: usize, tool_calls: Vec<ToolCallRecord>) -> Self {
        Self {
            error,
            iterations,
            tool_calls,
        }
    }

    /// 无进度的快速失败（如输入校验）
    pub fn immediate(error: AgentError) -> Self {
        Self::new(error, 0, Vec::new())
    }
}

//! 核心：错误类型、事件、调度、执行引擎与构建器

pub mod builder;
pub mod engine;
pub mod error;
pub mod events;
pub mod scheduler;

pub use builder::EngineBuilder;
pub use engine::{AgentEngine, EngineConfig, RunOptions, TaskReport};
pub use error::{AgentError, TaskFailure};
pub use events::EngineEvent;
pub use scheduler::TaskScheduler;

//! Hive - Rust 多智能体编排内核
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、事件、任务执行引擎与构建器
//! - **llm**: 完成服务客户端抽象与实现（OpenAI 兼容 / Mock）、嵌入 API
//! - **memory**: 短期消息历史与会话长期记忆（内存 / SQLite + 相似度检索）
//! - **planner**: 任务分解与依赖图拓扑排序
//! - **tools**: 工具 trait、注册表、执行器与内置演示工具
//! - **orchestrator**: 多智能体任务分发与结果聚合

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod planner;
pub mod tools;

pub use crate::config::{load_config, AppConfig};
pub use crate::core::{AgentEngine, EngineBuilder, RunOptions, TaskReport};
pub use crate::orchestrator::AgentOrchestrator;

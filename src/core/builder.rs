//! 引擎构建器：统一的组件装配逻辑
//!
//! 从 AppConfig 构建 LLM 客户端、工具注册表、长期记忆与引擎，
//! 保证各接入方式（CLI / 编排器 / 测试）用同一套装配路径。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{AgentEngine, AgentError, EngineConfig, TaskScheduler};
use crate::llm::{create_embedder_from_config, ChatClient, MockChatClient, OpenAiChatClient};
use crate::memory::{
    InMemoryStore, InMemoryVectorIndex, KeywordIndex, LongTermMemory, SqliteStore,
};
use crate::planner::TaskPlanner;
use crate::tools::{tool_call_schema_json, ClockTool, EchoTool, ToolRegistry};

/// 引擎构建器：按配置装配各组件，可用 with_* 注入替身（如 Mock 客户端）
pub struct EngineBuilder {
    config: AppConfig,
    client: Option<Arc<dyn ChatClient>>,
    registry: Option<Arc<ToolRegistry>>,
    enable_planner: bool,
    register_builtins: bool,
}

impl EngineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            client: None,
            registry: None,
            enable_planner: true,
            register_builtins: true,
        }
    }

    /// 注入客户端（测试 / 自定义后端）
    pub fn with_client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// 注入共享注册表（多个引擎共享同一工具集时使用）
    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 是否装配规划器
    pub fn with_planner(mut self, enable: bool) -> Self {
        self.enable_planner = enable;
        self
    }

    /// 是否注册内置演示工具（echo / clock）
    pub fn with_builtin_tools(mut self, enable: bool) -> Self {
        self.register_builtins = enable;
        self
    }

    /// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
    pub fn build_client(&self) -> Arc<dyn ChatClient> {
        if let Some(client) = &self.client {
            return client.clone();
        }
        let provider = self.config.llm.provider.to_lowercase();
        let has_key = std::env::var("OPENAI_API_KEY").is_ok();
        if provider == "mock" || !has_key {
            if provider != "mock" {
                tracing::warn!("no OPENAI_API_KEY set, falling back to mock client");
            }
            return Arc::new(MockChatClient::new());
        }
        tracing::info!("using OpenAI-compatible endpoint ({})", self.config.llm.model);
        let mut client = OpenAiChatClient::new(
            self.config.llm.base_url.as_deref(),
            &self.config.llm.model,
            None,
        );
        if let Some(t) = self.config.llm.temperature {
            client = client.with_temperature(t);
        }
        if let Some(m) = self.config.llm.max_tokens {
            client = client.with_max_tokens(m);
        }
        Arc::new(client)
    }

    /// 构建工具注册表（共享注册表优先，否则新建并按需注册内置工具）
    pub fn build_registry(&self) -> Result<Arc<ToolRegistry>, AgentError> {
        if let Some(registry) = &self.registry {
            return Ok(registry.clone());
        }
        let registry = ToolRegistry::new();
        if self.register_builtins {
            registry.register(EchoTool)?;
            registry.register(ClockTool)?;
        }
        Ok(Arc::new(registry))
    }

    /// 构建长期记忆：backend none 返回 None；memory / sqlite 叠加检索后端
    pub fn build_long_term(&self) -> Result<Option<Arc<LongTermMemory>>, AgentError> {
        let section = &self.config.memory;
        let mut long_term = match section.backend.to_lowercase().as_str() {
            "none" => return Ok(None),
            "sqlite" => {
                let path = section
                    .sqlite_path
                    .clone()
                    .unwrap_or_else(|| "memory/conversations.db".into());
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).ok();
                }
                LongTermMemory::new(Arc::new(SqliteStore::open(&path)?))
            }
            _ => LongTermMemory::new(Arc::new(InMemoryStore::new())),
        };

        if section.vector_enabled {
            if let Some(embedder) = create_embedder_from_config(
                self.config.llm.base_url.as_deref(),
                &section.embedding_model,
                None,
            ) {
                long_term = long_term.with_vector_backend(
                    Arc::new(InMemoryVectorIndex::new(section.max_index_entries)),
                    embedder,
                );
            }
        }
        if section.keyword_fallback {
            long_term = long_term
                .with_keyword_fallback(Arc::new(KeywordIndex::new(section.max_index_entries)));
        }
        Ok(Some(Arc::new(long_term)))
    }

    /// 构建完整系统提示词：基础 prompt + 工具调用格式 + 已注册工具 schema
    pub fn build_system_prompt(&self, registry: &ToolRegistry) -> Option<String> {
        let base = self.config.engine.system_prompt.clone()?;
        let schemas = registry.list_schemas();
        if schemas.is_empty() {
            return Some(base);
        }
        let tools_json =
            serde_json::to_string_pretty(&schemas).unwrap_or_else(|_| "[]".to_string());
        Some(format!(
            "{}\n\n## Tool call format\n```json\n{}\n```\n\n## Available tools\n```json\n{}\n```",
            base,
            tool_call_schema_json(),
            tools_json
        ))
    }

    /// 装配引擎
    pub fn build(&self) -> Result<AgentEngine, AgentError> {
        let client = self.build_client();
        let registry = self.build_registry()?;
        let engine_config = EngineConfig {
            max_iterations: self.config.engine.max_iterations,
            tool_timeout_secs: self.config.engine.tool_timeout_secs,
            task_timeout_secs: self.config.engine.task_timeout_secs,
            max_short_term_messages: self.config.app.max_short_term_messages,
            system_prompt: self.build_system_prompt(&registry),
        };

        let mut engine = AgentEngine::new(client.clone(), registry, engine_config)
            .with_scheduler(Arc::new(TaskScheduler::new(
                self.config.engine.max_concurrent_tools,
            )));
        if let Some(long_term) = self.build_long_term()? {
            engine = engine.with_long_term(long_term);
        }
        if self.enable_planner {
            engine = engine.with_planner(Arc::new(TaskPlanner::new(client)));
        }
        Ok(engine)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_defaults() {
        let builder = EngineBuilder::new(AppConfig::default())
            .with_client(Arc::new(MockChatClient::new()));
        let engine = builder.build().unwrap();
        // 内置工具按注册顺序可见
        assert_eq!(engine.registry().tool_names(), vec!["echo", "clock"]);
    }

    #[test]
    fn test_memory_backend_selection() {
        let mut config = AppConfig::default();
        config.memory.backend = "memory".to_string();
        let builder =
            EngineBuilder::new(config).with_client(Arc::new(MockChatClient::new()));
        assert!(builder.build_long_term().unwrap().is_some());

        let builder = EngineBuilder::new(AppConfig::default());
        assert!(builder.build_long_term().unwrap().is_none());
    }

    #[test]
    fn test_system_prompt_includes_tools() {
        let mut config = AppConfig::default();
        config.engine.system_prompt = Some("You are a helpful agent.".to_string());
        let builder = EngineBuilder::new(config);
        let registry = builder.build_registry().unwrap();
        let prompt = builder.build_system_prompt(&registry).unwrap();
        assert!(prompt.contains("helpful agent"));
        assert!(prompt.contains("echo"));
        assert!(prompt.contains("Tool call format"));
    }
}

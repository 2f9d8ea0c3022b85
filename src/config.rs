//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示
//! 嵌套，如 `HIVE__LLM__PROVIDER=mock`）。所有段均有默认值，缺省可运行。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub engine: EngineSection,
    pub memory: MemorySection,
    pub orchestrator: OrchestratorSection,
}

/// [app] 段：应用名与短期记忆上界
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 短期记忆消息数上限；None 表示不设上界
    pub max_short_term_messages: Option<usize>,
}

/// [llm] 段：后端选择与采样参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock；无 API Key 时自动回落 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// [engine] 段：执行循环的上限与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// 单次任务最大推理-工具循环次数，防止死循环
    pub max_iterations: usize,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 任务级墙钟超时（秒）；None 表示不限制
    pub task_timeout_secs: Option<u64>,
    /// 工具并发上限
    pub max_concurrent_tools: usize,
    pub system_prompt: Option<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tool_timeout_secs: 30,
            task_timeout_secs: None,
            max_concurrent_tools: 3,
            system_prompt: None,
        }
    }
}

/// [memory] 段：长期记忆后端与检索配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// 后端：none / memory / sqlite
    pub backend: String,
    pub sqlite_path: Option<PathBuf>,
    /// 有 API Key 时是否启用向量检索
    pub vector_enabled: bool,
    pub embedding_model: String,
    /// 无嵌入时是否启用关键词退化检索
    pub keyword_fallback: bool,
    pub search_top_k: usize,
    pub max_index_entries: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            backend: "none".to_string(),
            sqlite_path: None,
            vector_enabled: true,
            embedding_model: "text-embedding-3-small".to_string(),
            keyword_fallback: true,
            search_top_k: 5,
            max_index_entries: 10_000,
        }
    }
}

/// [orchestrator] 段：选择策略与聚合策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// round_robin / least_loaded / specialized
    pub strategy: String,
    /// merge / vote
    pub aggregation: String,
    /// 单个任务分发到的引擎数（vote 通常 >= 3）
    pub replicas: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            strategy: "round_robin".to_string(),
            aggregation: "merge".to_string(),
            replicas: 1,
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.max_iterations, 10);
        assert_eq!(cfg.memory.backend, "none");
        assert_eq!(cfg.orchestrator.strategy, "round_robin");
        assert_eq!(cfg.orchestrator.replicas, 1);
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let cfg = load_config(None).unwrap_or_default();
        assert!(cfg.engine.tool_timeout_secs > 0);
    }
}

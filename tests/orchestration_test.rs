//! 端到端集成测试：引擎 + 工具 + 长期记忆 + 编排器

use std::collections::HashMap;
use std::sync::Arc;

use hive::config::AppConfig;
use hive::core::{AgentEngine, EngineBuilder, EngineConfig, RunOptions};
use hive::llm::{ChatOutcome, MockChatClient, ToolCallRequest};
use hive::memory::{InMemoryStore, KeywordIndex, LongTermMemory};
use hive::orchestrator::{AgentOrchestrator, AggregationPolicy, SelectionStrategy};
use hive::tools::{FunctionTool, ToolRegistry};

fn weather_registry() -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new();
    registry
        .register(FunctionTool::new(
            "get_weather",
            "Get the weather for a city",
            serde_json::json!({
                "type": "object",
                "properties": {"city": {"type": "string"}},
                "required": ["city"]
            }),
            |args| async move {
                match args.get("city").and_then(|v| v.as_str()) {
                    Some("Paris") => Ok("Sunny, 20°C".to_string()),
                    Some(other) => Err(format!("no data for {}", other)),
                    None => Err("missing city".to_string()),
                }
            },
        ))
        .unwrap();
    Arc::new(registry)
}

#[tokio::test]
async fn test_full_task_with_tool_and_memory() {
    let long_term = Arc::new(
        LongTermMemory::new(Arc::new(InMemoryStore::new()))
            .with_keyword_fallback(Arc::new(KeywordIndex::default())),
    );
    let client = Arc::new(MockChatClient::with_script(vec![
        ChatOutcome::with_tool_calls(vec![ToolCallRequest {
            id: "call_1".to_string(),
            name: "get_weather".to_string(),
            arguments: serde_json::json!({"city": "Paris"}),
        }]),
        ChatOutcome::reply("It is sunny in Paris today, 20°C."),
    ]));

    let engine = AgentEngine::new(client, weather_registry(), EngineConfig::default())
        .with_long_term(long_term.clone());

    let report = engine
        .run_task(
            "What's the weather in Paris?",
            RunOptions::new().with_conversation_id("trip-planning"),
        )
        .await
        .unwrap();

    assert_eq!(report.iterations, 2);
    assert_eq!(report.tool_calls.len(), 1);
    assert_eq!(report.tool_calls[0].result.as_deref(), Some("Sunny, 20°C"));
    assert!(report.content.contains("sunny in Paris"));

    // 持久化的记录包含 user / assistant(工具调用) / tool / assistant 四条消息
    let record = long_term.load("trip-planning").await.unwrap().unwrap();
    assert_eq!(record.messages.len(), 4);
    assert_eq!(record.metadata.get("status").unwrap(), "completed");

    // 关键词检索能命中本次会话
    let hits = long_term.search_similar("Paris weather", 3, None).await;
    assert!(!hits.is_empty());
    assert_eq!(hits[0].conversation_id, "trip-planning");
}

#[tokio::test]
async fn test_builder_wires_engine_from_config() {
    let mut config = AppConfig::default();
    config.memory.backend = "memory".to_string();
    config.engine.max_iterations = 4;

    let engine = EngineBuilder::new(config)
        .with_client(Arc::new(MockChatClient::with_script(vec![
            ChatOutcome::reply("built and ran"),
        ])))
        .build()
        .unwrap();

    let report = engine
        .run_task("smoke", RunOptions::new().with_conversation_id("smoke-1"))
        .await
        .unwrap();
    assert_eq!(report.content, "built and ran");
    assert_eq!(report.iterations, 1);

    let record = engine
        .long_term()
        .unwrap()
        .load("smoke-1")
        .await
        .unwrap()
        .unwrap();
    assert!(!record.messages.is_empty());
}

#[tokio::test]
async fn test_orchestrator_round_robin_distribution() {
    // 无脚本的 Mock 回显最后一条 user 消息，便于跨任务复用
    fn echo_engine() -> Arc<AgentEngine> {
        Arc::new(AgentEngine::new(
            Arc::new(MockChatClient::new()),
            Arc::new(ToolRegistry::new()),
            EngineConfig::default(),
        ))
    }

    let mut orch = AgentOrchestrator::new(SelectionStrategy::RoundRobin, AggregationPolicy::Merge);
    orch.register_agent("agent1", vec![], echo_engine());
    orch.register_agent("agent2", vec![], echo_engine());

    let mut assigned = Vec::new();
    for task in ["first", "second", "third"] {
        let report = orch.execute_task(task, None).await.unwrap();
        assigned.push(report.metadata.get("agents").cloned().unwrap_or_default());
        assert!(report.content.contains(task));
    }
    assert_eq!(assigned, vec!["agent1", "agent2", "agent1"]);
}

#[tokio::test]
async fn test_orchestrator_parallel_tasks() {
    let mut orch = AgentOrchestrator::new(SelectionStrategy::RoundRobin, AggregationPolicy::Merge);
    orch.register_agent(
        "solo",
        vec![],
        Arc::new(AgentEngine::new(
            Arc::new(MockChatClient::new()),
            Arc::new(ToolRegistry::new()),
            EngineConfig::default(),
        )),
    );

    let tasks: Vec<String> = (0..4).map(|i| format!("task {}", i)).collect();
    let results = orch.execute_tasks_parallel(&tasks).await;
    assert_eq!(results.len(), 4);
    for (i, result) in results.iter().enumerate() {
        let report = result.as_ref().unwrap();
        assert!(report.content.contains(&format!("task {}", i)));
    }
}

#[tokio::test]
async fn test_sqlite_memory_survives_engine_runs() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("conversations.db");

    let mut config = AppConfig::default();
    config.memory.backend = "sqlite".to_string();
    config.memory.sqlite_path = Some(db_path.clone());

    let engine = EngineBuilder::new(config.clone())
        .with_client(Arc::new(MockChatClient::with_script(vec![
            ChatOutcome::reply("remembered"),
        ])))
        .build()
        .unwrap();
    engine
        .run_task("note this down", RunOptions::new().with_conversation_id("durable"))
        .await
        .unwrap();
    drop(engine);

    // 重新打开同一数据库，记录仍在
    let engine = EngineBuilder::new(config)
        .with_client(Arc::new(MockChatClient::new()))
        .build()
        .unwrap();
    let record = engine
        .long_term()
        .unwrap()
        .load("durable")
        .await
        .unwrap()
        .unwrap();
    assert!(record
        .messages
        .iter()
        .any(|m| m.content.contains("note this down")));
}

//! Hive - 单次任务 CLI
//!
//! 入口：初始化日志、加载配置、装配引擎并执行命令行给出的任务，
//! 打印最终回复与工具调用摘要。

use anyhow::Context;
use hive::core::{EngineBuilder, RunOptions};
use hive::load_config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let task: String = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if task.trim().is_empty() {
        eprintln!("usage: hive <task description>");
        std::process::exit(2);
    }

    let config = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        hive::AppConfig::default()
    });

    let memory_enabled = config.memory.backend.to_lowercase() != "none";
    let engine = EngineBuilder::new(config)
        .build()
        .context("failed to build engine")?;

    // 启用长期记忆时为本次运行生成会话 id，便于后续续接
    let mut opts = RunOptions::new();
    if memory_enabled {
        let conversation_id = uuid::Uuid::new_v4().to_string();
        eprintln!("conversation id: {}", conversation_id);
        opts = opts.with_conversation_id(conversation_id);
    }

    match engine.run_task(&task, opts).await {
        Ok(report) => {
            println!("{}", report.content);
            if !report.tool_calls.is_empty() {
                eprintln!("-- {} tool call(s), {} iteration(s)", report.tool_calls.len(), report.iterations);
                for record in &report.tool_calls {
                    eprintln!(
                        "   {} ({} ms): {}",
                        record.tool_name,
                        record.duration_ms,
                        if record.is_ok() { "ok" } else { "error" }
                    );
                }
            }
            Ok(())
        }
        Err(failure) => {
            eprintln!("task failed: {}", failure);
            std::process::exit(1);
        }
    }
}

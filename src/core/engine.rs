//! 任务执行引擎：推理 ⇄ 工具调用主循环
//!
//! COLLECT_CONTEXT -> CALL_MODEL -> (有工具调用则 DISPATCH_TOOLS 后回到
//! CALL_MODEL，否则 DONE)；超过最大循环次数转 FAILED 而非永远循环。
//! 单引擎内严格串行；挂起点只有完成服务调用、工具执行与长期记忆读写。
//! 可选 event_tx：向前端推送 Thinking / ToolCall / Observation / MessageChunk。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, EngineEvent, TaskFailure, TaskScheduler};
use crate::llm::ChatClient;
use crate::memory::{LongTermMemory, Message, ShortTermMemory};
use crate::planner::TaskPlanner;
use crate::tools::{ToolCallRecord, ToolExecutor, ToolRegistry};

/// 流式回复时每段字符数（模拟打字效果）
const CHUNK_CHARS: usize = 6;
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 引擎配置：循环上限、超时与短期记忆上界
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 最大推理-工具循环次数（最重要的正确性保障）
    pub max_iterations: usize,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 任务级墙钟超时（秒）；None 表示不限制
    pub task_timeout_secs: Option<u64>,
    /// 短期记忆消息数上限；None 表示不设上界
    pub max_short_term_messages: Option<usize>,
    pub system_prompt: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tool_timeout_secs: 30,
            task_timeout_secs: None,
            max_short_term_messages: None,
            system_prompt: None,
        }
    }
}

/// 单次 run_task 的选项
#[derive(Default)]
pub struct RunOptions {
    /// 给定时启用长期记忆：启动时注入历史，结束时（无论成败）持久化
    pub conversation_id: Option<String>,
    /// 先规划再按 execution_order 线性执行
    pub use_planner: bool,
    pub cancel_token: CancellationToken,
    pub event_tx: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_planner(mut self, use_planner: bool) -> Self {
        self.use_planner = use_planner;
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }
}

/// 任务执行结果
#[derive(Debug)]
pub struct TaskReport {
    pub content: String,
    pub tool_calls: Vec<ToolCallRecord>,
    /// 完成的推理-工具循环次数
    pub iterations: usize,
    pub metadata: HashMap<String, String>,
}

/// 单次运行的内部状态
struct RunState {
    short_term: ShortTermMemory,
    records: Vec<ToolCallRecord>,
    iterations: usize,
    deadline: Option<Instant>,
    plan_meta: Option<(usize, bool)>,
}

fn send_event(tx: &Option<mpsc::UnboundedSender<EngineEvent>>, ev: EngineEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!(
            "{}...",
            text.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>()
        )
    } else {
        text.to_string()
    }
}

/// 任务执行引擎：一个实例同一时刻只跑一个任务；注册表与长期记忆
/// 通过 Arc 在多个引擎间共享
pub struct AgentEngine {
    client: Arc<dyn ChatClient>,
    registry: Arc<ToolRegistry>,
    executor: ToolExecutor,
    long_term: Option<Arc<LongTermMemory>>,
    planner: Option<Arc<TaskPlanner>>,
    scheduler: Option<Arc<TaskScheduler>>,
    config: EngineConfig,
}

impl AgentEngine {
    pub fn new(
        client: Arc<dyn ChatClient>,
        registry: Arc<ToolRegistry>,
        config: EngineConfig,
    ) -> Self {
        let executor = ToolExecutor::new(registry.clone(), config.tool_timeout_secs);
        Self {
            client,
            registry,
            executor,
            long_term: None,
            planner: None,
            scheduler: None,
            config,
        }
    }

    pub fn with_long_term(mut self, long_term: Arc<LongTermMemory>) -> Self {
        self.long_term = Some(long_term);
        self
    }

    pub fn with_planner(mut self, planner: Arc<TaskPlanner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<TaskScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn long_term(&self) -> Option<&Arc<LongTermMemory>> {
        self.long_term.as_ref()
    }

    /// 执行一个任务直至完成或失败
    ///
    /// 成功返回 TaskReport；失败返回 TaskFailure（含已完成的循环次数与
    /// 工具记录）。两种结局都会在启用长期记忆时持久化消息历史。
    pub async fn run_task(&self, task: &str, opts: RunOptions) -> Result<TaskReport, TaskFailure> {
        if task.trim().is_empty() {
            return Err(TaskFailure::immediate(AgentError::Validation(
                "task must not be empty".to_string(),
            )));
        }

        let (prompt0, completion0, _) = self.client.token_usage();
        let mut state = RunState {
            short_term: ShortTermMemory::new(self.config.max_short_term_messages),
            records: Vec::new(),
            iterations: 0,
            deadline: self
                .config
                .task_timeout_secs
                .map(|s| Instant::now() + Duration::from_secs(s)),
            plan_meta: None,
        };

        if let Some(prompt) = &self.config.system_prompt {
            state.short_term.push(Message::system(prompt.clone()));
        }

        // COLLECT_CONTEXT：给定会话 id 时从长期记忆注入历史；
        // 注入失败只记日志，不影响任务执行
        if let (Some(lt), Some(cid)) = (&self.long_term, opts.conversation_id.as_deref()) {
            match lt.load(cid).await {
                Ok(Some(record)) => {
                    let count = record.messages.len();
                    for msg in record.messages {
                        state.short_term.push(msg);
                    }
                    send_event(&opts.event_tx, EngineEvent::MemoryPrimed { messages: count });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(conversation_id = cid, "long-term priming failed: {}", e);
                }
            }
        }

        let result = if opts.use_planner && self.planner.is_some() {
            self.run_with_plan(task, &opts, &mut state).await
        } else {
            state.short_term.push(Message::user(task.to_string()));
            self.drive(&opts, &mut state).await
        };

        let mut metadata = HashMap::new();
        let (prompt1, completion1, _) = self.client.token_usage();
        metadata.insert(
            "prompt_tokens".to_string(),
            prompt1.saturating_sub(prompt0).to_string(),
        );
        metadata.insert(
            "completion_tokens".to_string(),
            completion1.saturating_sub(completion0).to_string(),
        );
        if let Some(cid) = &opts.conversation_id {
            metadata.insert("conversation_id".to_string(), cid.clone());
        }
        if let Some((steps, cyclic)) = state.plan_meta {
            metadata.insert("plan_steps".to_string(), steps.to_string());
            if cyclic {
                metadata.insert("plan_cyclic".to_string(), "true".to_string());
            }
        }

        match result {
            Ok(content) => {
                self.persist(&opts, &state, "completed").await;
                let chars: Vec<char> = content.chars().collect();
                for chunk in chars.chunks(CHUNK_CHARS) {
                    send_event(
                        &opts.event_tx,
                        EngineEvent::MessageChunk {
                            text: chunk.iter().collect(),
                        },
                    );
                }
                send_event(&opts.event_tx, EngineEvent::MessageDone);
                Ok(TaskReport {
                    content,
                    tool_calls: state.records,
                    iterations: state.iterations,
                    metadata,
                })
            }
            Err(error) => {
                self.persist(&opts, &state, "failed").await;
                send_event(
                    &opts.event_tx,
                    EngineEvent::Error {
                        text: error.to_string(),
                    },
                );
                Err(TaskFailure::new(error, state.iterations, state.records))
            }
        }
    }

    /// CALL_MODEL ⇄ DISPATCH_TOOLS 主循环；返回最终回复文本
    async fn drive(&self, opts: &RunOptions, state: &mut RunState) -> Result<String, AgentError> {
        loop {
            if opts.cancel_token.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            if let Some(deadline) = state.deadline {
                if Instant::now() >= deadline {
                    return Err(AgentError::TaskTimeout(
                        self.config.task_timeout_secs.unwrap_or_default(),
                    ));
                }
            }
            if state.iterations >= self.config.max_iterations {
                return Err(AgentError::IterationLimitExceeded(state.iterations));
            }
            state.iterations += 1;
            send_event(
                &opts.event_tx,
                EngineEvent::StepUpdate {
                    iteration: state.iterations,
                    max_iterations: self.config.max_iterations,
                },
            );

            send_event(&opts.event_tx, EngineEvent::Thinking);
            let schemas = self.registry.list_schemas();
            let outcome = self
                .client
                .chat(state.short_term.get_all(), &schemas)
                .await?;

            // 无工具调用 -> DONE
            if outcome.tool_calls.is_empty() {
                state
                    .short_term
                    .push(Message::assistant(outcome.content.clone()));
                return Ok(outcome.content);
            }

            // DISPATCH_TOOLS：逐个执行，失败按调用隔离（转为工具结果消息）
            state.short_term.push(Message::assistant_with_calls(
                outcome.content,
                outcome.tool_calls.clone(),
            ));
            for call in &outcome.tool_calls {
                if opts.cancel_token.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
                send_event(
                    &opts.event_tx,
                    EngineEvent::ToolCall {
                        tool: call.name.clone(),
                        args: call.arguments.clone(),
                    },
                );
                let _permit = match &self.scheduler {
                    Some(s) => Some(s.acquire_tool().await),
                    None => None,
                };
                let record = self.executor.dispatch(call).await;
                drop(_permit);
                // 取消后允许在途调用完成，但不再消费其结果
                if opts.cancel_token.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
                if record.is_ok() {
                    send_event(
                        &opts.event_tx,
                        EngineEvent::Observation {
                            tool: call.name.clone(),
                            preview: preview(&record.observation()),
                        },
                    );
                } else {
                    send_event(
                        &opts.event_tx,
                        EngineEvent::ToolFailure {
                            tool: call.name.clone(),
                            reason: record.observation(),
                        },
                    );
                }
                state
                    .short_term
                    .add_tool_result(&call.name, record.observation(), &call.id);
                state.records.push(record);
            }
        }
    }

    /// 规划模式：先分解任务，再按 execution_order 在同一会话内线性执行各步骤
    async fn run_with_plan(
        &self,
        task: &str,
        opts: &RunOptions,
        state: &mut RunState,
    ) -> Result<String, AgentError> {
        let planner = self.planner.as_ref().expect("planner configured");
        let plan = planner.plan(task, None).await?;
        state.plan_meta = Some((plan.execution_order.len(), plan.has_cycle()));
        send_event(
            &opts.event_tx,
            EngineEvent::PlanReady {
                steps: plan.execution_order.len(),
                cyclic: plan.has_cycle(),
            },
        );

        state.short_term.push(Message::user(task.to_string()));
        let total = plan.execution_order.len();
        let mut sections = Vec::with_capacity(total);
        for (i, id) in plan.execution_order.iter().enumerate() {
            let Some(step) = plan.step(id) else { continue };
            let mut prompt = format!("Step {}/{}: {}", i + 1, total, step.description);
            if let Some(expected) = &step.expected_output {
                prompt.push_str(&format!("\nExpected output: {}", expected));
            }
            state.short_term.push(Message::user(prompt));
            let content = self.drive(opts, state).await?;
            sections.push(content);
        }
        Ok(sections.join("\n\n"))
    }

    /// 任务收尾（成功或失败都调用）：启用长期记忆时持久化完整消息历史；
    /// 持久化失败只记日志，不改变任务结局
    async fn persist(&self, opts: &RunOptions, state: &RunState, status: &str) {
        let (Some(lt), Some(cid)) = (&self.long_term, opts.conversation_id.as_deref()) else {
            return;
        };
        let metadata = HashMap::from([
            ("status".to_string(), status.to_string()),
            ("iterations".to_string(), state.iterations.to_string()),
        ]);
        if let Err(e) = lt
            .save(cid, state.short_term.get_all().to_vec(), metadata)
            .await
        {
            tracing::warn!(conversation_id = cid, "long-term persistence failed: {}", e);
        }
    }
}

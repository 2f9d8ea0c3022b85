//! 多智能体编排器
//!
//! 管理一组 AgentEngine：按策略（轮转 / 最低负载 / 专长匹配）为任务选择
//! 引擎，支持同一任务分发到多个引擎并按策略聚合（merge 拼接 / vote 多数），
//! 以及多任务并发分发（任务间失败相互隔离）。引擎间不共享可变状态，
//! 只通过显式传入的注册表与存储协作。

pub mod descriptor;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;

use crate::config::OrchestratorSection;
use crate::core::{AgentEngine, AgentError, RunOptions, TaskFailure, TaskReport};
use crate::memory::tokenizer;

pub use descriptor::{AgentDescriptor, AggregationPolicy, SelectionStrategy};

/// 池内条目：描述符 + 引擎
pub struct AgentHandle {
    pub descriptor: Arc<AgentDescriptor>,
    engine: Arc<AgentEngine>,
}

/// 多智能体编排器
pub struct AgentOrchestrator {
    agents: Vec<AgentHandle>,
    strategy: SelectionStrategy,
    aggregation: AggregationPolicy,
    /// 单个任务分发到的引擎数（vote 模式通常 >= 3）
    replicas: usize,
    cursor: AtomicUsize,
}

impl AgentOrchestrator {
    pub fn new(strategy: SelectionStrategy, aggregation: AggregationPolicy) -> Self {
        Self {
            agents: Vec::new(),
            strategy,
            aggregation,
            replicas: 1,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn from_config(section: &OrchestratorSection) -> Self {
        Self::new(
            SelectionStrategy::from_config_str(&section.strategy),
            AggregationPolicy::from_config_str(&section.aggregation),
        )
        .with_replicas(section.replicas)
    }

    pub fn with_replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas.max(1);
        self
    }

    /// 注册一个智能体（按注册顺序参与轮转）
    pub fn register_agent(
        &mut self,
        id: impl Into<String>,
        specialization_tags: Vec<String>,
        engine: Arc<AgentEngine>,
    ) {
        self.agents.push(AgentHandle {
            descriptor: Arc::new(AgentDescriptor::new(id, specialization_tags)),
            engine,
        });
    }

    pub fn agents(&self) -> &[AgentHandle] {
        &self.agents
    }

    /// 为任务选择 n 个引擎下标（n 超过池大小时截到池大小）
    fn select_indices(&self, task: &str, n: usize) -> Vec<usize> {
        let len = self.agents.len();
        let n = n.clamp(1, len);
        match self.strategy {
            SelectionStrategy::RoundRobin => {
                let start = self.cursor.fetch_add(n, Ordering::Relaxed);
                (0..n).map(|i| (start + i) % len).collect()
            }
            SelectionStrategy::LeastLoaded => {
                let mut indices: Vec<usize> = (0..len).collect();
                indices.sort_by_key(|&i| (self.agents[i].descriptor.current_load(), i));
                indices.truncate(n);
                indices
            }
            SelectionStrategy::Specialized => {
                let task_tokens = tokenizer::tokenize_to_set(task);
                let mut scored: Vec<(usize, usize)> = self
                    .agents
                    .iter()
                    .enumerate()
                    .map(|(i, handle)| {
                        let tags: std::collections::HashSet<String> = handle
                            .descriptor
                            .specialization_tags
                            .iter()
                            .flat_map(|t| tokenizer::tokenize(t))
                            .collect();
                        (tokenizer::overlap_score(&tags, &task_tokens), i)
                    })
                    .filter(|(score, _)| *score > 0)
                    .collect();
                if scored.is_empty() {
                    // 无专长命中 -> 回落轮转
                    let start = self.cursor.fetch_add(n, Ordering::Relaxed);
                    return (0..n).map(|i| (start + i) % len).collect();
                }
                scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
                scored.into_iter().take(n).map(|(_, i)| i).collect()
            }
        }
    }

    /// 执行一个任务：按策略选择 replicas 个引擎并发运行，再按聚合策略合并。
    /// conversation_id 仅在单引擎分发时透传（多副本各自独立推理）。
    pub async fn execute_task(
        &self,
        task: &str,
        conversation_id: Option<String>,
    ) -> Result<TaskReport, TaskFailure> {
        if self.agents.is_empty() {
            return Err(TaskFailure::immediate(AgentError::Validation(
                "no agents registered".to_string(),
            )));
        }

        let indices = self.select_indices(task, self.replicas);
        let single = indices.len() == 1;
        let runs = indices.into_iter().map(|idx| {
            let handle = &self.agents[idx];
            let engine = handle.engine.clone();
            let descriptor = handle.descriptor.clone();
            let task = task.to_string();
            let cid = if single { conversation_id.clone() } else { None };
            descriptor.begin_task();
            async move {
                let mut opts = RunOptions::new();
                if let Some(c) = cid {
                    opts = opts.with_conversation_id(c);
                }
                let result = engine.run_task(&task, opts).await;
                descriptor.finish_task();
                (descriptor.id.clone(), result)
            }
        });
        let outcomes = join_all(runs).await;

        let mut successes: Vec<(String, TaskReport)> = Vec::new();
        let mut failures: Vec<(String, TaskFailure)> = Vec::new();
        for (agent_id, result) in outcomes {
            match result {
                Ok(report) => successes.push((agent_id, report)),
                Err(failure) => {
                    tracing::warn!(agent = %agent_id, "agent run failed: {}", failure);
                    failures.push((agent_id, failure));
                }
            }
        }

        if successes.is_empty() {
            // 全部失败：返回第一个失败载荷
            return Err(failures.remove(0).1);
        }

        match self.aggregation {
            AggregationPolicy::Merge => Ok(Self::merge(successes, failures.len())),
            AggregationPolicy::Vote => Ok(Self::vote(successes)),
        }
    }

    /// 多任务并发分发；每个任务独立选择引擎，失败互不影响
    pub async fn execute_tasks_parallel(
        &self,
        tasks: &[String],
    ) -> Vec<Result<TaskReport, TaskFailure>> {
        join_all(tasks.iter().map(|t| self.execute_task(t, None))).await
    }

    /// merge 聚合：内容拼接、工具记录取并集、循环次数累加
    fn merge(successes: Vec<(String, TaskReport)>, failed: usize) -> TaskReport {
        let agent_ids: Vec<String> = successes.iter().map(|(id, _)| id.clone()).collect();
        let mut contents = Vec::with_capacity(successes.len());
        let mut tool_calls = Vec::new();
        let mut iterations = 0;
        let mut metadata = HashMap::new();
        for (_, report) in successes {
            contents.push(report.content);
            tool_calls.extend(report.tool_calls);
            iterations += report.iterations;
            for (k, v) in report.metadata {
                metadata.entry(k).or_insert(v);
            }
        }
        metadata.insert("agents".to_string(), agent_ids.join(","));
        metadata.insert("aggregation".to_string(), "merge".to_string());
        if failed > 0 {
            metadata.insert("failed_agents".to_string(), failed.to_string());
        }
        TaskReport {
            content: contents.join("\n\n"),
            tool_calls,
            iterations,
            metadata,
        }
    }

    /// vote 聚合：选内容出现次数最多者，平局取先出现者
    fn vote(successes: Vec<(String, TaskReport)>) -> TaskReport {
        let total = successes.len();
        let (winner_idx, votes) = {
            // (content, count, first_idx)；counts 保持先出现顺序
            let mut counts: Vec<(&str, usize, usize)> = Vec::new();
            for (i, (_, report)) in successes.iter().enumerate() {
                if let Some(entry) = counts.iter_mut().find(|(c, _, _)| *c == report.content) {
                    entry.1 += 1;
                } else {
                    counts.push((report.content.as_str(), 1, i));
                }
            }
            let mut best = 0;
            for i in 1..counts.len() {
                // 仅严格更多票才换人，保证平局取先出现者
                if counts[i].1 > counts[best].1 {
                    best = i;
                }
            }
            (counts[best].2, counts[best].1)
        };

        let agent_ids: Vec<String> = successes.iter().map(|(id, _)| id.clone()).collect();
        let (winner_agent, mut report) = successes.into_iter().nth(winner_idx).unwrap();
        report
            .metadata
            .insert("aggregation".to_string(), "vote".to_string());
        report
            .metadata
            .insert("votes".to_string(), format!("{}/{}", votes, total));
        report.metadata.insert("agent_id".to_string(), winner_agent);
        report.metadata.insert("agents".to_string(), agent_ids.join(","));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EngineConfig, TaskReport};
    use crate::llm::{ChatOutcome, MockChatClient};
    use crate::tools::ToolRegistry;

    /// 每次 chat 都回复固定文本的引擎
    fn fixed_engine(reply: &str, turns: usize) -> Arc<AgentEngine> {
        let script: Vec<ChatOutcome> = (0..turns).map(|_| ChatOutcome::reply(reply)).collect();
        Arc::new(AgentEngine::new(
            Arc::new(MockChatClient::with_script(script)),
            Arc::new(ToolRegistry::new()),
            EngineConfig::default(),
        ))
    }

    fn agent_of(report: &TaskReport) -> String {
        report
            .metadata
            .get("agents")
            .or_else(|| report.metadata.get("agent_id"))
            .cloned()
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_round_robin_order() {
        // 2 个智能体、3 个任务顺序提交 -> a1, a2, a1
        let mut orch =
            AgentOrchestrator::new(SelectionStrategy::RoundRobin, AggregationPolicy::Merge);
        orch.register_agent("a1", vec![], fixed_engine("from a1", 8));
        orch.register_agent("a2", vec![], fixed_engine("from a2", 8));

        let mut assigned = Vec::new();
        for task in ["t1", "t2", "t3"] {
            let report = orch.execute_task(task, None).await.unwrap();
            assigned.push(agent_of(&report));
        }
        assert_eq!(assigned, vec!["a1", "a2", "a1"]);
    }

    #[tokio::test]
    async fn test_least_loaded_prefers_idle() {
        let mut orch =
            AgentOrchestrator::new(SelectionStrategy::LeastLoaded, AggregationPolicy::Merge);
        orch.register_agent("busy", vec![], fixed_engine("busy reply", 8));
        orch.register_agent("idle", vec![], fixed_engine("idle reply", 8));

        // 人为抬高第一个的负载
        orch.agents()[0].descriptor.begin_task();
        let report = orch.execute_task("task", None).await.unwrap();
        assert_eq!(agent_of(&report), "idle");
        orch.agents()[0].descriptor.finish_task();
    }

    #[tokio::test]
    async fn test_specialization_match_and_fallback() {
        let mut orch =
            AgentOrchestrator::new(SelectionStrategy::Specialized, AggregationPolicy::Merge);
        orch.register_agent("coder", vec!["code".into(), "rust".into()], fixed_engine("code", 8));
        orch.register_agent(
            "meteorologist",
            vec!["weather".into(), "forecast".into()],
            fixed_engine("weather", 8),
        );

        let report = orch
            .execute_task("check the weather in Paris", None)
            .await
            .unwrap();
        assert_eq!(agent_of(&report), "meteorologist");

        // 无标签命中 -> 回落轮转（从 cursor 起点开始）
        let report = orch.execute_task("paint a picture", None).await.unwrap();
        assert_eq!(agent_of(&report), "coder");
    }

    #[tokio::test]
    async fn test_vote_aggregation_majority() {
        let mut orch = AgentOrchestrator::new(
            SelectionStrategy::RoundRobin,
            AggregationPolicy::Vote,
        )
        .with_replicas(3);
        orch.register_agent("a1", vec![], fixed_engine("42", 4));
        orch.register_agent("a2", vec![], fixed_engine("41", 4));
        orch.register_agent("a3", vec![], fixed_engine("42", 4));

        let report = orch.execute_task("answer?", None).await.unwrap();
        assert_eq!(report.content, "42");
        assert_eq!(report.metadata.get("votes").unwrap(), "2/3");
    }

    #[tokio::test]
    async fn test_merge_aggregation_concatenates() {
        let mut orch = AgentOrchestrator::new(
            SelectionStrategy::RoundRobin,
            AggregationPolicy::Merge,
        )
        .with_replicas(2);
        orch.register_agent("a1", vec![], fixed_engine("part one", 4));
        orch.register_agent("a2", vec![], fixed_engine("part two", 4));

        let report = orch.execute_task("combine", None).await.unwrap();
        assert!(report.content.contains("part one"));
        assert!(report.content.contains("part two"));
        assert_eq!(report.metadata.get("agents").unwrap(), "a1,a2");
    }

    #[tokio::test]
    async fn test_parallel_tasks_isolate_failures() {
        let mut orch =
            AgentOrchestrator::new(SelectionStrategy::RoundRobin, AggregationPolicy::Merge);
        orch.register_agent("a1", vec![], fixed_engine("ok", 8));

        // 空任务触发校验失败，另一个任务不受影响
        let tasks = vec!["".to_string(), "real task".to_string()];
        let results = orch.execute_tasks_parallel(&tasks).await;
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }

    #[tokio::test]
    async fn test_no_agents_is_validation_error() {
        let orch =
            AgentOrchestrator::new(SelectionStrategy::RoundRobin, AggregationPolicy::Merge);
        let failure = orch.execute_task("task", None).await.unwrap_err();
        assert!(matches!(failure.error, AgentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_load_returns_to_zero() {
        let mut orch =
            AgentOrchestrator::new(SelectionStrategy::RoundRobin, AggregationPolicy::Merge);
        orch.register_agent("a1", vec![], fixed_engine("done", 8));
        orch.execute_task("task", None).await.unwrap();
        assert_eq!(orch.agents()[0].descriptor.current_load(), 0);
    }
}

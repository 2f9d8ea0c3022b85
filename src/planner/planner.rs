//! 任务规划器：LLM 驱动的任务分解
//!
//! 以结构化提示要求完成服务输出 JSON 步骤列表（id / description /
//! dependencies），解析后做两级清理：重复 id 保留首个、未知依赖引用丢弃
//! （均记 warning 而非整体失败），再做拓扑排序得到 execution_order。

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;

use crate::core::AgentError;
use crate::llm::{ChatClient, LlmError};
use crate::memory::Message;
use crate::planner::plan::{topo_sort, Plan, PlanStep, TopoOrder};

const DEFAULT_PLANNER_PROMPT: &str = "You are a task planner. Decompose the user's task into a short list of concrete steps.\n\
Reply with ONLY a JSON array, no prose. Each element: {\"id\": \"s1\", \"description\": \"...\", \"dependencies\": [\"s0\"]}.\n\
Use short unique ids. dependencies lists ids of steps that must finish first; use [] when none.";

/// 从 LLM 输出中提取 JSON 块（```json ... ``` 围栏或首尾括号之间）
fn extract_json_block(output: &str) -> &str {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim());
    }
    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    trimmed
}

/// 兼容 {"steps": [...]} 包装形式
#[derive(Deserialize)]
struct PlanDocument {
    steps: Vec<PlanStep>,
}

fn parse_steps(json_str: &str) -> Result<Vec<PlanStep>, AgentError> {
    if let Ok(steps) = serde_json::from_str::<Vec<PlanStep>>(json_str) {
        return Ok(steps);
    }
    serde_json::from_str::<PlanDocument>(json_str)
        .map(|doc| doc.steps)
        .map_err(|e| {
            AgentError::Collaborator(LlmError::InvalidResponse(format!(
                "plan is not valid JSON: {}: {}",
                e, json_str
            )))
        })
}

/// 任务规划器：持有完成服务客户端与规划提示词
pub struct TaskPlanner {
    client: Arc<dyn ChatClient>,
    system_prompt: String,
}

impl TaskPlanner {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self {
            client,
            system_prompt: DEFAULT_PLANNER_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// 分解任务；context 为可选的补充上下文（如已检索的历史）
    pub async fn plan(&self, task: &str, context: Option<&str>) -> Result<Plan, AgentError> {
        if task.trim().is_empty() {
            return Err(AgentError::Validation(
                "task must not be empty".to_string(),
            ));
        }

        let user = match context {
            Some(ctx) if !ctx.trim().is_empty() => {
                format!("Task: {}\n\nContext:\n{}", task, ctx)
            }
            _ => format!("Task: {}", task),
        };
        let messages = vec![Message::system(self.system_prompt.clone()), Message::user(user)];
        let outcome = self.client.chat(&messages, &[]).await?;

        let raw_steps = parse_steps(extract_json_block(&outcome.content))?;
        let steps = Self::sanitize(raw_steps);
        if steps.is_empty() {
            return Err(AgentError::Collaborator(LlmError::InvalidResponse(
                "planner returned no steps".to_string(),
            )));
        }

        let (execution_order, cyclic_step_ids) = match topo_sort(&steps) {
            TopoOrder::Complete(order) => (order, Vec::new()),
            TopoOrder::PartialWithCycle { mut ordered, cyclic } => {
                // 回退策略：环内步骤按出现顺序附在末尾，同时在 Plan 上留痕
                tracing::warn!(
                    cyclic = ?cyclic,
                    "plan contains a dependency cycle, appending cyclic steps in emission order"
                );
                ordered.extend(cyclic.iter().cloned());
                (ordered, cyclic)
            }
        };

        Ok(Plan {
            task: task.to_string(),
            steps,
            execution_order,
            cyclic_step_ids,
        })
    }

    /// 清理模型输出：去掉重复 id（保留首个）与未知依赖引用
    fn sanitize(raw: Vec<PlanStep>) -> Vec<PlanStep> {
        let mut seen = HashSet::new();
        let mut steps: Vec<PlanStep> = Vec::with_capacity(raw.len());
        for step in raw {
            if step.id.trim().is_empty() {
                tracing::warn!("dropping plan step with empty id");
                continue;
            }
            if !seen.insert(step.id.clone()) {
                tracing::warn!(id = %step.id, "dropping duplicate plan step id");
                continue;
            }
            steps.push(step);
        }

        let known: HashSet<String> = steps.iter().map(|s| s.id.clone()).collect();
        for step in &mut steps {
            step.dependencies.retain(|d| {
                let ok = known.contains(d);
                if !ok {
                    tracing::warn!(step = %step.id, dep = %d, "dropping unknown dependency reference");
                }
                ok
            });
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatOutcome, MockChatClient};

    fn planner_with_reply(reply: &str) -> TaskPlanner {
        TaskPlanner::new(Arc::new(MockChatClient::with_script(vec![
            ChatOutcome::reply(reply),
        ])))
    }

    #[tokio::test]
    async fn test_plan_parses_and_orders() {
        let planner = planner_with_reply(
            r#"```json
[
  {"id": "a", "description": "collect input", "dependencies": []},
  {"id": "b", "description": "analyze", "dependencies": ["a"]},
  {"id": "c", "description": "report", "dependencies": ["a", "b"]}
]
```"#,
        );
        let plan = planner.plan("write a report", None).await.unwrap();
        assert_eq!(plan.execution_order, vec!["a", "b", "c"]);
        assert!(!plan.has_cycle());
    }

    #[tokio::test]
    async fn test_unknown_dependency_dropped() {
        let planner = planner_with_reply(
            r#"[{"id": "a", "description": "only step", "dependencies": ["ghost"]}]"#,
        );
        let plan = planner.plan("task", None).await.unwrap();
        assert_eq!(plan.steps[0].dependencies.len(), 0);
        assert_eq!(plan.execution_order, vec!["a"]);
    }

    #[tokio::test]
    async fn test_duplicate_id_keeps_first() {
        let planner = planner_with_reply(
            r#"[
  {"id": "a", "description": "first", "dependencies": []},
  {"id": "a", "description": "second", "dependencies": []}
]"#,
        );
        let plan = planner.plan("task", None).await.unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].description, "first");
    }

    #[tokio::test]
    async fn test_cycle_surfaced_with_fallback() {
        let planner = planner_with_reply(
            r#"[
  {"id": "a", "description": "independent", "dependencies": []},
  {"id": "b", "description": "waits on c", "dependencies": ["c"]},
  {"id": "c", "description": "waits on b", "dependencies": ["b"]}
]"#,
        );
        let plan = planner.plan("task", None).await.unwrap();
        assert!(plan.has_cycle());
        assert_eq!(plan.cyclic_step_ids, vec!["b", "c"]);
        // 回退：环内步骤按出现顺序附在末尾，没有步骤被丢弃
        assert_eq!(plan.execution_order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_task_rejected() {
        let planner = planner_with_reply("[]");
        let result = planner.plan("  ", None).await;
        assert!(matches!(result, Err(AgentError::Validation(_))));
    }

    #[tokio::test]
    async fn test_wrapped_steps_document() {
        let planner = planner_with_reply(
            r#"{"steps": [{"id": "a", "description": "only", "dependencies": []}]}"#,
        );
        let plan = planner.plan("task", None).await.unwrap();
        assert_eq!(plan.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_garbage_is_collaborator_error() {
        let planner = planner_with_reply("I cannot plan this, sorry.");
        let result = planner.plan("task", None).await;
        assert!(matches!(result, Err(AgentError::Collaborator(_))));
    }
}

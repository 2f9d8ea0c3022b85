//! 计划与步骤图
//!
//! Plan 持有步骤集合与拓扑排序得到的 execution_order；排序采用 Kahn 算法，
//! 入度为 0 的步骤先出，平局按出现顺序。存在依赖环时不静默丢弃：排序返回
//! 带标记的结果，由调用方决定回退还是拒绝。

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// 单个计划步骤（由完成服务按结构化提示产出）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    /// 依赖的步骤 id；未知引用在校验阶段被丢弃
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// 可选：执行该步骤需要的能力标签
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    /// 可选：预期产出描述
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
}

/// 拓扑排序结果：完整序或带环的部分序
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopoOrder {
    Complete(Vec<String>),
    /// ordered 为已排出的部分，cyclic 为构成环的剩余步骤（按出现顺序）
    PartialWithCycle {
        ordered: Vec<String>,
        cyclic: Vec<String>,
    },
}

/// Kahn 拓扑排序；每轮取出现顺序最早的零入度步骤，保证平局稳定。
/// 只统计指向集合内步骤的依赖（未知引用应在调用前清理）。
pub fn topo_sort(steps: &[PlanStep]) -> TopoOrder {
    let index: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let n = steps.len();
    let mut in_degree = vec![0usize; n];
    // 邻接表：被依赖步骤 -> 依赖它的步骤
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, step) in steps.iter().enumerate() {
        for dep in &step.dependencies {
            if let Some(&d) = index.get(dep.as_str()) {
                if d != i {
                    in_degree[i] += 1;
                    dependents[d].push(i);
                }
            }
        }
    }

    let mut visited = vec![false; n];
    let mut ordered = Vec::with_capacity(n);
    loop {
        let next = (0..n).find(|&i| !visited[i] && in_degree[i] == 0);
        let Some(i) = next else { break };
        visited[i] = true;
        ordered.push(steps[i].id.clone());
        for &d in &dependents[i] {
            in_degree[d] = in_degree[d].saturating_sub(1);
        }
    }

    if ordered.len() == n {
        TopoOrder::Complete(ordered)
    } else {
        let cyclic = (0..n)
            .filter(|&i| !visited[i])
            .map(|i| steps[i].id.clone())
            .collect();
        TopoOrder::PartialWithCycle { ordered, cyclic }
    }
}

/// 一个任务的完整计划
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub task: String,
    pub steps: Vec<PlanStep>,
    /// 拓扑序（存在环时，环内步骤按出现顺序附在末尾）
    pub execution_order: Vec<String>,
    /// 构成依赖环的步骤 id；非空表示排序经过了回退，调用方可据此拒绝
    #[serde(default)]
    pub cyclic_step_ids: Vec<String>,
}

impl Plan {
    pub fn step(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn has_cycle(&self) -> bool {
        !self.cyclic_step_ids.is_empty()
    }

    /// 返回依赖全部完成且自身未完成的步骤（增量执行：每完成一步重新询问）
    pub fn get_ready_steps(&self, completed: &HashSet<String>) -> Vec<&PlanStep> {
        self.steps
            .iter()
            .filter(|s| {
                !completed.contains(&s.id)
                    && s.dependencies
                        .iter()
                        .all(|d| completed.contains(d) || self.step(d).is_none())
            })
            .collect()
    }
}

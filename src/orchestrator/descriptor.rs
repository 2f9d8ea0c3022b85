//! 智能体描述符与策略枚举
//!
//! AgentDescriptor 携带 id、专长标签与当前负载（分配时加一、完成时减一）；
//! 选择策略与聚合策略从配置字符串解析，未知值回落默认并记 warning。

use std::sync::atomic::{AtomicUsize, Ordering};

/// 池内一个智能体的描述：id、专长标签、当前负载
#[derive(Debug)]
pub struct AgentDescriptor {
    pub id: String,
    pub specialization_tags: Vec<String>,
    load: AtomicUsize,
}

impl AgentDescriptor {
    pub fn new(id: impl Into<String>, specialization_tags: Vec<String>) -> Self {
        Self {
            id: id.into(),
            specialization_tags,
            load: AtomicUsize::new(0),
        }
    }

    pub fn current_load(&self) -> usize {
        self.load.load(Ordering::Relaxed)
    }

    /// 任务分配时调用
    pub fn begin_task(&self) {
        self.load.fetch_add(1, Ordering::Relaxed);
    }

    /// 任务完成（或失败）时调用，与 begin_task 成对出现
    pub fn finish_task(&self) {
        self.load.fetch_sub(1, Ordering::Relaxed);
    }
}

/// 智能体选择策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// 按注册顺序轮转
    RoundRobin,
    /// 选当前负载最低者
    LeastLoaded,
    /// 专长标签与任务文本匹配，无命中时回落轮转
    Specialized,
}

impl SelectionStrategy {
    pub fn from_config_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "round_robin" => Self::RoundRobin,
            "least_loaded" => Self::LeastLoaded,
            "specialized" => Self::Specialized,
            other => {
                tracing::warn!(strategy = other, "unknown selection strategy, using round_robin");
                Self::RoundRobin
            }
        }
    }
}

/// 结果聚合策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationPolicy {
    /// 拼接全部结果，工具记录取并集（默认：任务视为相互独立）
    Merge,
    /// 选内容出现次数最多者，平局取先出现者
    Vote,
}

impl AggregationPolicy {
    pub fn from_config_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "merge" => Self::Merge,
            "vote" => Self::Vote,
            other => {
                tracing::warn!(aggregation = other, "unknown aggregation policy, using merge");
                Self::Merge
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_accounting() {
        let desc = AgentDescriptor::new("a1", vec![]);
        assert_eq!(desc.current_load(), 0);
        desc.begin_task();
        desc.begin_task();
        assert_eq!(desc.current_load(), 2);
        desc.finish_task();
        assert_eq!(desc.current_load(), 1);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            SelectionStrategy::from_config_str("least_loaded"),
            SelectionStrategy::LeastLoaded
        );
        assert_eq!(
            SelectionStrategy::from_config_str("bogus"),
            SelectionStrategy::RoundRobin
        );
        assert_eq!(
            AggregationPolicy::from_config_str("vote"),
            AggregationPolicy::Vote
        );
    }
}

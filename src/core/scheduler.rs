//! 任务调度：工具并发限制
//!
//! 工具执行使用 Semaphore 限制并发；同一引擎内的循环本身严格串行，
//! 许可用于约束跨引擎共享的工具资源。

use std::sync::Arc;

use tokio::sync::Semaphore;

/// 任务调度器：发放工具执行许可
pub struct TaskScheduler {
    tool_semaphore: Arc<Semaphore>,
}

impl TaskScheduler {
    pub fn new(max_concurrent_tools: usize) -> Self {
        Self {
            tool_semaphore: Arc::new(Semaphore::new(max_concurrent_tools.max(1))),
        }
    }

    /// 获取工具执行许可；许可随 guard drop 归还
    pub async fn acquire_tool(&self) -> tokio::sync::OwnedSemaphorePermit {
        self.tool_semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed")
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permits_bounded() {
        let scheduler = TaskScheduler::new(2);
        let p1 = scheduler.acquire_tool().await;
        let _p2 = scheduler.acquire_tool().await;
        // 第三个许可需等待，释放一个后立刻可得
        drop(p1);
        let _p3 = scheduler.acquire_tool().await;
    }
}

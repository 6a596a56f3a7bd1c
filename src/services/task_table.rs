//! 任务状态表 - 业务能力层
//!
//! 任务 ID → 状态记录。容量有上限：
//! - 只淘汰终态记录，进行中的任务永远不会被淘汰
//! - 终态记录第一次被查询后开始计时，超过 TTL 即过期
//! - 超出容量时优先淘汰最早完成的终态记录

use crate::models::{TaskState, TaskStatusRecord};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct TaskEntry {
    record: TaskStatusRecord,
    finished_at: Option<Instant>,
    observed_at: Option<Instant>,
}

/// 任务状态表
#[derive(Debug)]
pub struct TaskTable {
    entries: RwLock<HashMap<String, TaskEntry>>,
    capacity: usize,
    ttl: Duration,
}

impl TaskTable {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// 生成新的任务 ID 并写入 `started` 记录
    pub fn create(&self, message: impl Into<String>) -> String {
        let task_id = Uuid::new_v4().to_string();
        let entry = TaskEntry {
            record: TaskStatusRecord::new(TaskState::Started, message),
            finished_at: None,
            observed_at: None,
        };

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(task_id.clone(), entry);
        evict(&mut entries, self.capacity, self.ttl);

        task_id
    }

    pub fn complete(&self, task_id: &str, message: impl Into<String>) -> bool {
        self.finish(task_id, TaskState::Completed, message.into())
    }

    pub fn fail(&self, task_id: &str, message: impl Into<String>) -> bool {
        self.finish(task_id, TaskState::Failed, message.into())
    }

    /// 写入终态，每个任务只写一次
    fn finish(&self, task_id: &str, state: TaskState, message: String) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(task_id) {
            Some(entry) if !entry.record.status.is_terminal() => {
                entry.record = TaskStatusRecord::new(state, message);
                entry.finished_at = Some(Instant::now());
                true
            }
            Some(_) => {
                debug!("任务 {} 已是终态，忽略 {:?}", task_id, state);
                false
            }
            None => false,
        }
    }

    /// 查询任务状态，不存在时返回 `not_found`
    ///
    /// 终态记录在第一次被查询时开始 TTL 计时。
    pub fn get(&self, task_id: &str) -> TaskStatusRecord {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(task_id) {
            Some(entry) => {
                if entry.record.status.is_terminal() && entry.observed_at.is_none() {
                    entry.observed_at = Some(Instant::now());
                }
                entry.record.clone()
            }
            None => TaskStatusRecord::not_found(),
        }
    }

    /// 立即清理过期记录
    pub fn purge_expired(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        evict(&mut entries, self.capacity, self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn evict(entries: &mut HashMap<String, TaskEntry>, capacity: usize, ttl: Duration) {
    let now = Instant::now();
    let before = entries.len();

    entries.retain(|_, entry| match entry.observed_at {
        Some(observed) => now.duration_since(observed) < ttl,
        None => true,
    });

    while entries.len() > capacity {
        // 已被查询过的优先，其次按完成时间
        let oldest = entries
            .iter()
            .filter(|(_, entry)| entry.record.status.is_terminal())
            .min_by_key(|(_, entry)| (entry.observed_at.is_none(), entry.finished_at))
            .map(|(id, _)| id.clone());

        match oldest {
            Some(id) => {
                entries.remove(&id);
            }
            None => break,
        }
    }

    let evicted = before - entries.len();
    if evicted > 0 {
        debug!("任务状态表淘汰 {} 条记录，剩余 {}", evicted, entries.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_task_is_not_found() {
        let table = TaskTable::new(10, Duration::from_secs(60));
        assert_eq!(table.get("nope").status, TaskState::NotFound);
    }

    #[test]
    fn test_task_lifecycle_and_single_terminal_write() {
        let table = TaskTable::new(10, Duration::from_secs(60));
        let id = table.create("开始抽取...");
        assert_eq!(table.get(&id).status, TaskState::Started);

        assert!(table.complete(&id, "抽取完成"));
        assert!(!table.fail(&id, "迟到的失败"));

        let record = table.get(&id);
        assert_eq!(record.status, TaskState::Completed);
        assert_eq!(record.message, "抽取完成");
    }

    #[test]
    fn test_ids_are_unique() {
        let table = TaskTable::new(100, Duration::from_secs(60));
        let a = table.create("a");
        let b = table.create("b");
        assert_ne!(a, b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observed_terminal_records_expire_after_ttl() {
        let table = TaskTable::new(10, Duration::from_secs(60));
        let done = table.create("x");
        let unobserved = table.create("y");
        let running = table.create("z");
        table.complete(&done, "ok");
        table.fail(&unobserved, "err");

        // 第一次查询开始计时
        assert_eq!(table.get(&done).status, TaskState::Completed);

        tokio::time::advance(Duration::from_secs(61)).await;
        table.purge_expired();

        assert_eq!(table.get(&done).status, TaskState::NotFound);
        assert_eq!(table.get(&unobserved).status, TaskState::Failed);
        assert_eq!(table.get(&running).status, TaskState::Started);
    }

    #[test]
    fn test_capacity_evicts_terminal_records_only() {
        let table = TaskTable::new(2, Duration::from_secs(3600));
        let a = table.create("a");
        let b = table.create("b");
        table.complete(&a, "ok");

        let c = table.create("c");
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&a).status, TaskState::NotFound);
        assert_eq!(table.get(&b).status, TaskState::Started);
        assert_eq!(table.get(&c).status, TaskState::Started);

        // 全是进行中的任务时允许暂时超出容量
        let d = table.create("d");
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(&d).status, TaskState::Started);
    }
}

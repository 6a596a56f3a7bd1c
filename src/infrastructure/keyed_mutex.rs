//! 按 key 划分的异步互斥锁
//!
//! 不同 key 之间互不阻塞，同一 key 同一时刻只有一个持有者。
//! 没有持有者也没有等待者的 key 会从表中移除。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;

type LockTable = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// 按 key 划分的互斥锁
#[derive(Debug, Clone, Default)]
pub struct KeyedMutex {
    locks: LockTable,
}

/// 某个 key 的持有凭证，drop 时释放
#[derive(Debug)]
pub struct KeyedGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockTable,
}

impl KeyedGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut table = lock_table(&self.locks);
        let idle = table
            .get(&self.key)
            .map(|entry| Arc::strong_count(entry) == 1)
            .unwrap_or(false);
        if idle {
            table.remove(&self.key);
        }
    }
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取某个 key 的锁，已被持有时挂起等待
    pub async fn lock(&self, key: &str) -> KeyedGuard {
        let entry = {
            let mut table = lock_table(&self.locks);
            table.entry(key.to_string()).or_default().clone()
        };

        let guard = entry.lock_owned().await;

        KeyedGuard {
            key: key.to_string(),
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    /// 某个 key 当前是否被持有
    pub fn is_locked(&self, key: &str) -> bool {
        lock_table(&self.locks)
            .get(key)
            .map(|entry| entry.try_lock().is_err())
            .unwrap_or(false)
    }

    /// 表中仍有持有者或等待者的 key 数量
    pub fn active_keys(&self) -> usize {
        lock_table(&self.locks).len()
    }
}

fn lock_table(
    locks: &LockTable,
) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
    locks.lock().unwrap_or_else(PoisonError::into_inner)
}

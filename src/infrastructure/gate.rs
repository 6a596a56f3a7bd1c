//! 远程调用闸门 - 基础设施层
//!
//! 限制同时在途的远程调用数量。闸门在所有任务之间共享，
//! 每个任务运行在自己的 runtime 上，所以计数器必须是原子的。

use crate::error::{AppError, AppResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// 并发闸门
///
/// 最多同时放行 `capacity` 个调用，其余调用方挂起等待。
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    capacity: usize,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// 闸门许可
///
/// 调用完成或失败时随 drop 释放。
#[derive(Debug)]
pub struct GatePermit {
    in_flight: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        // 先减计数，semaphore 许可在字段析构时才归还
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGate {
    /// 创建闸门，容量至少为 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 申请一个调用名额，名额不足时挂起
    pub async fn admit(&self) -> AppResult<GatePermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::internal("远程调用闸门已关闭"))?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        debug!("闸门放行，当前在途调用: {}/{}", now, self.capacity);

        Ok(GatePermit {
            in_flight: self.in_flight.clone(),
            _permit: permit,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前在途调用数
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// 启动以来观察到的最大在途调用数
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

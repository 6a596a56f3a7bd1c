//! 任务互斥守卫
//!
//! - 抽取：每篇论文一把锁，外加一个大小为 `max_concurrent_extractions` 的工作池
//! - 构建：全局一把锁
//!
//! 两类守卫相互独立，构建和抽取可以同时进行。

use crate::error::{AppError, AppResult};
use crate::infrastructure::keyed_mutex::{KeyedGuard, KeyedMutex};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

/// 抽取守卫：论文锁 + 工作池名额
#[derive(Debug)]
pub struct ExtractionGuard {
    _slot: OwnedSemaphorePermit,
    lock: KeyedGuard,
}

impl ExtractionGuard {
    pub fn paper_id(&self) -> &str {
        self.lock.key()
    }
}

/// 构建守卫
#[derive(Debug)]
pub struct BuildGuard {
    _guard: OwnedMutexGuard<()>,
}

/// 任务守卫集合
#[derive(Debug, Clone)]
pub struct JobGuards {
    extraction_locks: KeyedMutex,
    extraction_slots: Arc<Semaphore>,
    build_lock: Arc<Mutex<()>>,
    max_concurrent_extractions: usize,
}

impl JobGuards {
    pub fn new(max_concurrent_extractions: usize) -> Self {
        let max_concurrent_extractions = max_concurrent_extractions.max(1);
        Self {
            extraction_locks: KeyedMutex::new(),
            extraction_slots: Arc::new(Semaphore::new(max_concurrent_extractions)),
            build_lock: Arc::new(Mutex::new(())),
            max_concurrent_extractions,
        }
    }

    /// 获取某篇论文的抽取守卫
    ///
    /// 先拿论文锁再占工作池名额，避免排队等同一篇论文时白占名额。
    pub async fn acquire_extraction(&self, paper_id: &str) -> AppResult<ExtractionGuard> {
        let lock = self.extraction_locks.lock(paper_id).await;
        let slot = self
            .extraction_slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::internal("抽取工作池已关闭"))?;

        Ok(ExtractionGuard { _slot: slot, lock })
    }

    /// 获取构建守卫
    pub async fn acquire_build(&self) -> BuildGuard {
        BuildGuard {
            _guard: self.build_lock.clone().lock_owned().await,
        }
    }

    pub fn is_extracting(&self, paper_id: &str) -> bool {
        self.extraction_locks.is_locked(paper_id)
    }

    pub fn is_building(&self) -> bool {
        self.build_lock.try_lock().is_err()
    }

    pub fn max_concurrent_extractions(&self) -> usize {
        self.max_concurrent_extractions
    }
}

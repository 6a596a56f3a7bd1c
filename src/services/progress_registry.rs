//! 进度登记表 - 业务能力层
//!
//! 只负责"记录和读取进度"，不关心任务如何执行。
//!
//! 写入规则：
//! - 每次抽取运行都带一个运行标识（任务 ID），新运行覆盖旧记录
//! - 来自旧运行的更新、终态之后的更新、使进度倒退的更新都会被拒绝
//!
//! 读取只做快照拷贝，读写锁的临界区很短。

use crate::models::{BuildProgress, BuildStatus, ExtractionProgress, ExtractionStatus};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// 一次进度更新
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionUpdate {
    pub step: String,
    /// `None` 表示保持当前进度
    pub fraction: Option<f64>,
    pub status: ExtractionStatus,
    pub error: Option<String>,
}

impl ExtractionUpdate {
    /// 推进到新的步骤
    pub fn step(step: impl Into<String>, fraction: f64) -> Self {
        Self {
            step: step.into(),
            fraction: Some(fraction),
            status: ExtractionStatus::Processing,
            error: None,
        }
    }

    /// 完成
    pub fn completed(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            fraction: Some(1.0),
            status: ExtractionStatus::Completed,
            error: None,
        }
    }

    /// 失败，进度停留在当前值
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            step: "失败".to_string(),
            fraction: None,
            status: ExtractionStatus::Error,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone)]
struct ExtractionRecord {
    run_id: String,
    progress: ExtractionProgress,
}

#[derive(Debug, Default)]
struct BuildRecord {
    run_id: Option<String>,
    progress: BuildProgress,
}

/// 进度登记表
#[derive(Debug, Default)]
pub struct ProgressRegistry {
    extractions: RwLock<HashMap<String, ExtractionRecord>>,
    build: RwLock<BuildRecord>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== 抽取进度 ==========

    /// 开始一次新的抽取运行，覆盖该论文之前的记录
    pub fn begin_extraction(&self, paper_id: &str, title: &str, run_id: &str) {
        let record = ExtractionRecord {
            run_id: run_id.to_string(),
            progress: ExtractionProgress {
                paper_id: paper_id.to_string(),
                title: title.to_string(),
                current_step: "准备中...".to_string(),
                progress: 0.0,
                status: ExtractionStatus::Processing,
                error_message: None,
            },
        };
        write(&self.extractions).insert(paper_id.to_string(), record);
    }

    /// 更新某次运行的进度
    ///
    /// # 返回
    /// 更新被接受时返回 `true`
    pub fn update_extraction(&self, paper_id: &str, run_id: &str, update: ExtractionUpdate) -> bool {
        let mut extractions = write(&self.extractions);

        let Some(record) = extractions.get_mut(paper_id) else {
            warn!("[论文 {}] 忽略进度更新：没有进行中的运行", paper_id);
            return false;
        };

        if record.run_id != run_id {
            warn!(
                "[论文 {}] 忽略来自旧运行 {} 的进度更新",
                paper_id, run_id
            );
            return false;
        }

        let current = &mut record.progress;
        if current.status.is_terminal() {
            warn!(
                "[论文 {}] 忽略终态 {:?} 之后的进度更新",
                paper_id, current.status
            );
            return false;
        }

        let fraction = match update.fraction {
            Some(f) => {
                let f = f.clamp(0.0, 1.0);
                if f < current.progress {
                    warn!(
                        "[论文 {}] 忽略倒退的进度 {:.2} -> {:.2}",
                        paper_id, current.progress, f
                    );
                    return false;
                }
                f
            }
            None => current.progress,
        };

        current.current_step = update.step;
        current.progress = fraction;
        current.status = update.status;
        current.error_message = update.error;
        true
    }

    /// 读取某篇论文的进度，未知论文返回 `not_extracted`
    pub fn extraction(&self, paper_id: &str) -> ExtractionProgress {
        read(&self.extractions)
            .get(paper_id)
            .map(|record| record.progress.clone())
            .unwrap_or_else(|| ExtractionProgress::not_extracted(paper_id))
    }

    /// 所有论文的进度
    pub fn all_extractions(&self) -> HashMap<String, ExtractionProgress> {
        read(&self.extractions)
            .iter()
            .map(|(id, record)| (id.clone(), record.progress.clone()))
            .collect()
    }

    /// 若该运行仍在进行中则标记为失败
    ///
    /// 用于任务被取消或崩溃、流程自身来不及记录错误的情况；旧运行或已结束的运行不受影响。
    pub fn fail_extraction_run(&self, paper_id: &str, run_id: &str, message: &str) -> bool {
        let mut extractions = write(&self.extractions);
        match extractions.get_mut(paper_id) {
            Some(record)
                if record.run_id == run_id && !record.progress.status.is_terminal() =>
            {
                record.progress.current_step = "失败".to_string();
                record.progress.status = ExtractionStatus::Error;
                record.progress.error_message = Some(message.to_string());
                true
            }
            _ => false,
        }
    }

    /// 抽取完成的论文数量
    pub fn completed_extractions(&self) -> usize {
        read(&self.extractions)
            .values()
            .filter(|record| record.progress.status == ExtractionStatus::Completed)
            .count()
    }

    // ========== 构建进度 ==========

    pub fn build(&self) -> BuildProgress {
        read(&self.build).progress.clone()
    }

    /// 开始一次新的构建运行
    pub fn begin_build(&self, run_id: &str, progress: BuildProgress) {
        *write(&self.build) = BuildRecord {
            run_id: Some(run_id.to_string()),
            progress,
        };
    }

    /// 覆盖构建进度（调用方须持有构建守卫）
    pub fn set_build(&self, progress: BuildProgress) {
        write(&self.build).progress = progress;
    }

    /// 若该构建运行仍在进行中则标记为失败，进度归零
    pub fn fail_build_run(&self, run_id: &str, message: &str) -> bool {
        let mut build = write(&self.build);
        if build.run_id.as_deref() != Some(run_id) || build.progress.status != BuildStatus::Processing
        {
            return false;
        }
        build.progress = BuildProgress {
            status: BuildStatus::Error,
            progress: 0.0,
            message: message.to_string(),
        };
        true
    }

    /// 清空所有进度
    pub fn clear(&self) {
        write(&self.extractions).clear();
        *write(&self.build) = BuildRecord::default();
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_paper_defaults_to_not_extracted() {
        let registry = ProgressRegistry::new();
        let progress = registry.extraction("P404");
        assert_eq!(progress.status, ExtractionStatus::NotExtracted);
        assert_eq!(progress.progress, 0.0);
        assert_eq!(progress.paper_id, "P404");
    }

    #[test]
    fn test_run_lifecycle() {
        let registry = ProgressRegistry::new();
        registry.begin_extraction("P1", "Attention", "run-1");
        assert_eq!(registry.extraction("P1").status, ExtractionStatus::Processing);

        assert!(registry.update_extraction("P1", "run-1", ExtractionUpdate::step("文本切分中...", 0.2)));
        assert!(registry.update_extraction("P1", "run-1", ExtractionUpdate::step("实体抽取中...", 0.6)));
        assert!(registry.update_extraction("P1", "run-1", ExtractionUpdate::completed("完成")));

        let progress = registry.extraction("P1");
        assert_eq!(progress.status, ExtractionStatus::Completed);
        assert_eq!(progress.progress, 1.0);
        assert_eq!(registry.completed_extractions(), 1);
    }

    #[test]
    fn test_no_update_after_terminal_status() {
        let registry = ProgressRegistry::new();
        registry.begin_extraction("P1", "t", "run-1");
        assert!(registry.update_extraction("P1", "run-1", ExtractionUpdate::failed("论文内容为空")));
        assert!(!registry.update_extraction("P1", "run-1", ExtractionUpdate::step("x", 0.9)));
        assert!(!registry.update_extraction("P1", "run-1", ExtractionUpdate::completed("完成")));

        let progress = registry.extraction("P1");
        assert_eq!(progress.status, ExtractionStatus::Error);
        assert_eq!(progress.error_message.as_deref(), Some("论文内容为空"));
    }

    #[test]
    fn test_progress_never_decreases() {
        let registry = ProgressRegistry::new();
        registry.begin_extraction("P1", "t", "run-1");
        assert!(registry.update_extraction("P1", "run-1", ExtractionUpdate::step("b", 0.6)));
        assert!(!registry.update_extraction("P1", "run-1", ExtractionUpdate::step("a", 0.2)));
        assert_eq!(registry.extraction("P1").progress, 0.6);

        // 失败保持当前进度
        assert!(registry.update_extraction("P1", "run-1", ExtractionUpdate::failed("boom")));
        assert_eq!(registry.extraction("P1").progress, 0.6);
    }

    #[test]
    fn test_new_run_resets_and_rejects_stale_updates() {
        let registry = ProgressRegistry::new();
        registry.begin_extraction("P1", "t", "run-1");
        registry.update_extraction("P1", "run-1", ExtractionUpdate::completed("完成"));

        registry.begin_extraction("P1", "t", "run-2");
        let progress = registry.extraction("P1");
        assert_eq!(progress.status, ExtractionStatus::Processing);
        assert_eq!(progress.progress, 0.0);

        assert!(!registry.update_extraction("P1", "run-1", ExtractionUpdate::step("x", 0.5)));
        assert!(registry.update_extraction("P1", "run-2", ExtractionUpdate::step("x", 0.5)));
    }

    #[test]
    fn test_build_progress_and_clear() {
        let registry = ProgressRegistry::new();
        assert_eq!(registry.build().status, BuildStatus::Idle);

        registry.set_build(BuildProgress {
            status: BuildStatus::Processing,
            progress: 0.3,
            message: "执行社区检测...".to_string(),
        });
        assert_eq!(registry.build().progress, 0.3);

        registry.begin_extraction("P1", "t", "run-1");
        registry.clear();
        assert!(!registry.fail_build_run("run-1", "x"));
        assert_eq!(registry.build(), BuildProgress::default());
        assert!(registry.all_extractions().is_empty());
    }

    #[test]
    fn test_fail_run_only_touches_matching_live_run() {
        let registry = ProgressRegistry::new();
        registry.begin_extraction("P1", "t", "run-1");
        assert!(!registry.fail_extraction_run("P1", "run-0", "任务已取消"));
        assert!(registry.fail_extraction_run("P1", "run-1", "任务已取消"));
        assert!(!registry.fail_extraction_run("P1", "run-1", "again"));
        assert_eq!(
            registry.extraction("P1").error_message.as_deref(),
            Some("任务已取消")
        );

        registry.begin_build(
            "build-1",
            BuildProgress {
                status: BuildStatus::Processing,
                progress: 0.6,
                message: "生成社区摘要...".to_string(),
            },
        );
        // 排队中的构建不影响正在运行的构建
        assert!(!registry.fail_build_run("build-2", "构建失败: 任务已取消"));
        assert!(registry.fail_build_run("build-1", "构建失败: 任务已取消"));
        let build = registry.build();
        assert_eq!(build.status, BuildStatus::Error);
        assert_eq!(build.progress, 0.0);
    }
}

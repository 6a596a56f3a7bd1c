//! 任务协调器 - 编排层
//!
//! ## 职责
//!
//! 本模块是请求路由层唯一需要接触的入口：
//!
//! 1. **启动前检查**：参数、API Key、构建前置条件，失败时同步返回，不创建任务
//! 2. **任务启动**：生成任务ID、写入任务状态表、交给启动器在独立线程上运行
//! 3. **守卫获取**：任务在自己的 runtime 里先拿守卫，再执行流程
//! 4. **结果记录**：业务错误和 panic 都在任务边界被捕获，写入任务状态表
//! 5. **轮询查询**：进度、任务状态、系统状态
//!
//! ## 层次关系
//!
//! ```text
//! Orchestrator (启动 / 取消 / 查询)
//!     ↓
//! workflow (ExtractionFlow / BuildFlow / QueryFlow)
//!     ↓
//! services (ProgressRegistry / TaskTable) + engine (GraphEngine)
//!     ↓
//! infrastructure (JobLauncher / JobGuards / ConcurrencyGate)
//! ```

use crate::config::Config;
use crate::engine::{GraphEngine, GraphStats};
use crate::error::{AppError, AppResult};
use crate::infrastructure::launcher::panic_message;
use crate::infrastructure::{JobGuards, JobHandle, JobLauncher, JobOutcome};
use crate::models::{
    BuildProgress, ExtractionProgress, PaperDocument, QueryMode, TaskStatusRecord,
};
use crate::services::{ProgressRegistry, TaskTable};
use crate::workflow::{BuildFlow, ExtractionFlow, JobCtx, JobKind, QueryFlow};
use chrono::{DateTime, Local};
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};

const MISSING_API_KEY: &str = "请先配置OpenAI API Key";
const NO_EXTRACTED_PAPERS: &str = "没有已抽取的论文，请先抽取论文";
const CANCELLED: &str = "任务已取消";

/// 系统状态快照
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub tracked_papers: usize,
    pub completed_extractions: usize,
    /// 正持有论文锁的论文ID
    pub extracting_papers: Vec<String>,
    pub build: BuildProgress,
    pub graph: GraphStats,
    pub running_jobs: usize,
    pub max_concurrent_extractions: usize,
    pub timestamp: DateTime<Local>,
}

/// 正在运行的任务
#[derive(Debug)]
struct RunningJob {
    kind: JobKind,
    paper_id: Option<String>,
    handle: JobHandle,
}

/// 任务协调器
///
/// 在请求处理线程之间共享（`Arc<Orchestrator>`），所有方法都只需要 `&self`。
pub struct Orchestrator {
    config: Config,
    engine: Arc<dyn GraphEngine>,
    registry: Arc<ProgressRegistry>,
    tasks: Arc<TaskTable>,
    guards: JobGuards,
    launcher: JobLauncher,
    jobs: Mutex<HashMap<String, RunningJob>>,
}

impl Orchestrator {
    pub fn new(config: Config, engine: Arc<dyn GraphEngine>) -> Self {
        let guards = JobGuards::new(config.system.max_concurrent_extractions);
        let tasks = TaskTable::new(config.system.task_table_capacity, config.system.task_ttl());

        Self {
            config,
            engine,
            registry: Arc::new(ProgressRegistry::new()),
            tasks: Arc::new(tasks),
            guards,
            launcher: JobLauncher::new(),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ========== 抽取 ==========

    /// 启动论文抽取任务
    ///
    /// # 参数
    /// - `paper_id`: 论文ID（进度按此键记录）
    /// - `document`: 论文元数据
    ///
    /// # 返回
    /// 立即返回任务ID，抽取在后台进行
    pub fn start_extraction(&self, paper_id: &str, document: &PaperDocument) -> AppResult<String> {
        let paper_id = paper_id.trim();
        if paper_id.is_empty() {
            return Err(AppError::validation("论文ID不能为空"));
        }
        if paper_id.chars().any(char::is_control) {
            return Err(AppError::validation("论文ID包含非法字符"));
        }
        self.require_api_key()?;

        let deep_mode = self.config.system.deep_mode;
        if document.is_blank(deep_mode) {
            return Err(AppError::validation("论文内容为空"));
        }
        let content = document.prepare_content(deep_mode);

        let task_id = self.tasks.create("开始抽取...");
        let ctx = JobCtx::extraction(
            task_id.clone(),
            paper_id.to_string(),
            document.display_title().to_string(),
        );

        let flow = ExtractionFlow::new(
            self.engine.clone(),
            self.registry.clone(),
            self.config.system.extraction_settle(),
        );
        let guards = self.guards.clone();
        let registry = self.registry.clone();
        let tasks = self.tasks.clone();
        let job_ctx = ctx.clone();

        let unit = async move {
            let ctx = job_ctx;
            let paper_id = ctx.paper_id.clone().unwrap_or_default();

            let result = catch_panic(async {
                let _guard = guards.acquire_extraction(&paper_id).await?;
                flow.run(&ctx, &content).await
            })
            .await;

            match result {
                Ok(()) => {
                    tasks.complete(&ctx.task_id, "抽取完成");
                }
                Err(e) => {
                    let message = e.to_string();
                    registry.fail_extraction_run(&paper_id, &ctx.task_id, &message);
                    tasks.fail(&ctx.task_id, format!("抽取失败: {}", message));
                }
            }
        };

        self.launch(ctx, unit)
    }

    pub fn get_extraction_progress(&self, paper_id: &str) -> ExtractionProgress {
        self.registry.extraction(paper_id)
    }

    pub fn all_extraction_progress(&self) -> HashMap<String, ExtractionProgress> {
        self.registry.all_extractions()
    }

    // ========== 构建 ==========

    /// 启动知识图谱构建任务
    ///
    /// 没有任何论文抽取完成时直接返回 `Precondition`，不获取守卫，不发起远程调用。
    pub fn start_build(&self) -> AppResult<String> {
        self.require_api_key()?;

        if self.registry.completed_extractions() == 0 {
            return Err(AppError::precondition(NO_EXTRACTED_PAPERS));
        }

        let task_id = self.tasks.create("开始构建知识图谱...");
        let ctx = JobCtx::build(task_id);

        let flow = BuildFlow::new(
            self.engine.clone(),
            self.registry.clone(),
            self.config.graph.cluster_algorithm.clone(),
            self.config.system.build_settle(),
        );
        let guards = self.guards.clone();
        let registry = self.registry.clone();
        let tasks = self.tasks.clone();
        let job_ctx = ctx.clone();

        let unit = async move {
            let ctx = job_ctx;

            let result = catch_panic(async {
                let _guard = guards.acquire_build().await;
                flow.run(&ctx).await
            })
            .await;

            match result {
                Ok(()) => {
                    tasks.complete(&ctx.task_id, "知识图谱构建完成");
                }
                Err(e) => {
                    let message = format!("构建失败: {}", e);
                    registry.fail_build_run(&ctx.task_id, &message);
                    tasks.fail(&ctx.task_id, message);
                }
            }
        };

        self.launch(ctx, unit)
    }

    pub fn get_build_progress(&self) -> BuildProgress {
        self.registry.build()
    }

    // ========== 问答 ==========

    /// 知识图谱问答（不加守卫，直接在调用方的上下文里执行）
    pub async fn query(&self, question: &str, mode: QueryMode) -> AppResult<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::validation("问题不能为空"));
        }
        self.require_api_key()?;

        QueryFlow::new(self.engine.clone()).run(question, mode).await
    }

    // ========== 任务 ==========

    pub fn get_task_status(&self, task_id: &str) -> TaskStatusRecord {
        self.tasks.get(task_id)
    }

    /// 取消正在运行的任务
    ///
    /// # 返回
    /// 任务存在且尚未结束时返回 `true`
    pub fn cancel_task(&self, task_id: &str) -> bool {
        let mut jobs = self.lock_jobs();
        let Some(job) = jobs.get(task_id) else {
            return false;
        };
        if job.handle.is_finished() {
            jobs.remove(task_id);
            return false;
        }

        job.handle.cancel();

        match (job.kind, job.paper_id.as_deref()) {
            (JobKind::Extraction, Some(paper_id)) => {
                self.registry
                    .fail_extraction_run(paper_id, task_id, CANCELLED);
            }
            _ => {
                self.registry
                    .fail_build_run(task_id, &format!("构建失败: {}", CANCELLED));
            }
        }
        self.tasks.fail(task_id, CANCELLED);

        warn!("🛑 任务 {} 已取消", job.handle.name());
        true
    }

    /// 等待任务结束（主要供测试和演示程序使用）
    ///
    /// # 返回
    /// 任务不存在或已被等待过时返回 `None`
    pub async fn wait_for_task(&self, task_id: &str) -> Option<JobOutcome> {
        let job = self.lock_jobs().remove(task_id)?;
        Some(job.handle.wait().await)
    }

    /// 正在运行的任务数
    pub fn running_jobs(&self) -> usize {
        self.lock_jobs()
            .values()
            .filter(|job| !job.handle.is_finished())
            .count()
    }

    // ========== 系统 ==========

    pub fn system_status(&self) -> SystemStatus {
        let extractions = self.registry.all_extractions();
        let mut extracting_papers: Vec<String> = extractions
            .keys()
            .filter(|paper_id| self.guards.is_extracting(paper_id))
            .cloned()
            .collect();
        extracting_papers.sort();

        SystemStatus {
            tracked_papers: extractions.len(),
            completed_extractions: self.registry.completed_extractions(),
            extracting_papers,
            build: self.registry.build(),
            graph: self.engine.stats(),
            running_jobs: self.running_jobs(),
            max_concurrent_extractions: self.guards.max_concurrent_extractions(),
            timestamp: Local::now(),
        }
    }

    /// 清空所有进度和图谱数据
    ///
    /// 有任务运行时拒绝执行。
    pub async fn clear_all_data(&self) -> AppResult<()> {
        let running = self.running_jobs();
        if running > 0 || self.guards.is_building() {
            return Err(AppError::precondition(format!(
                "有 {} 个任务正在运行，请等待完成后再清空数据",
                running
            )));
        }

        self.engine.clear().await?;
        self.registry.clear();
        info!("🗑️ 所有数据已清空");
        Ok(())
    }

    // ========== 内部 ==========

    fn require_api_key(&self) -> AppResult<()> {
        if self.config.openai.has_api_key() {
            Ok(())
        } else {
            Err(AppError::configuration(MISSING_API_KEY))
        }
    }

    fn launch<F>(&self, ctx: JobCtx, unit: F) -> AppResult<String>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = match self.launcher.launch(ctx.job_name(), unit) {
            Ok(handle) => handle,
            Err(e) => {
                error!("{} 任务启动失败: {}", ctx, e);
                self.tasks.fail(&ctx.task_id, format!("任务启动失败: {}", e));
                return Err(e);
            }
        };

        info!("{} 🚀 任务已启动", ctx);

        let mut jobs = self.lock_jobs();
        if jobs.len() >= self.config.system.task_table_capacity {
            jobs.retain(|_, job| !job.handle.is_finished());
        }
        jobs.insert(
            ctx.task_id.clone(),
            RunningJob {
                kind: ctx.kind,
                paper_id: ctx.paper_id.clone(),
                handle,
            },
        );

        Ok(ctx.task_id)
    }

    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<String, RunningJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 在任务边界捕获 panic，转换为 `Internal` 错误
async fn catch_panic<F>(work: F) -> AppResult<()>
where
    F: Future<Output = AppResult<()>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(AppError::internal(format!(
            "任务崩溃: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catch_panic_converts_to_internal() {
        let result = catch_panic(async {
            if true {
                panic!("坏掉了");
            }
            Ok::<(), AppError>(())
        })
        .await;
        match result {
            Err(AppError::Internal(message)) => assert!(message.contains("坏掉了")),
            other => panic!("unexpected: {:?}", other),
        }

        assert!(catch_panic(async { Ok::<(), AppError>(()) }).await.is_ok());
    }
}

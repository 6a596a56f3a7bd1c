//! 知识图谱构建流程 - 流程层
//!
//! 流程顺序：
//! 1. 初始化（0.0）
//! 2. 执行社区检测（0.3）
//! 3. 生成社区摘要（0.6）
//! 4. 完成构建（0.9）：等待引擎完成信号 + 可选的稳定等待
//! 5. 完成（1.0）
//!
//! 失败时进度归零，消息为"构建失败: ..."。调用方必须已经持有构建守卫。

use crate::engine::GraphEngine;
use crate::error::AppResult;
use crate::models::{BuildProgress, BuildStatus};
use crate::services::ProgressRegistry;
use crate::workflow::job_ctx::JobCtx;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 构建阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Initializing,
    Clustering,
    Summarizing,
    Finalizing,
    Completed,
}

impl BuildStage {
    pub fn fraction(self) -> f64 {
        match self {
            BuildStage::Initializing => 0.0,
            BuildStage::Clustering => 0.3,
            BuildStage::Summarizing => 0.6,
            BuildStage::Finalizing => 0.9,
            BuildStage::Completed => 1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BuildStage::Initializing => "初始化...",
            BuildStage::Clustering => "执行社区检测...",
            BuildStage::Summarizing => "生成社区摘要...",
            BuildStage::Finalizing => "完成构建...",
            BuildStage::Completed => "知识图谱构建完成",
        }
    }
}

/// 知识图谱构建流程
pub struct BuildFlow {
    engine: Arc<dyn GraphEngine>,
    registry: Arc<ProgressRegistry>,
    algorithm: String,
    settle: Duration,
}

impl BuildFlow {
    pub fn new(
        engine: Arc<dyn GraphEngine>,
        registry: Arc<ProgressRegistry>,
        algorithm: String,
        settle: Duration,
    ) -> Self {
        Self {
            engine,
            registry,
            algorithm,
            settle,
        }
    }

    pub async fn run(&self, ctx: &JobCtx) -> AppResult<()> {
        info!("{} 🕸️ 开始构建知识图谱（算法: {}）", ctx, self.algorithm);
        self.registry
            .begin_build(&ctx.task_id, progress_for(BuildStage::Initializing));

        match self.execute(ctx).await {
            Ok(()) => {
                self.advance(ctx, BuildStage::Completed);
                info!("{} ✅ 知识图谱构建完成", ctx);
                Ok(())
            }
            Err(e) => {
                error!("{} ❌ 构建失败: {}", ctx, e);
                self.registry.set_build(BuildProgress {
                    status: BuildStatus::Error,
                    progress: 0.0,
                    message: format!("构建失败: {}", e),
                });
                Err(e)
            }
        }
    }

    async fn execute(&self, ctx: &JobCtx) -> AppResult<()> {
        self.advance(ctx, BuildStage::Clustering);
        self.engine.cluster(&self.algorithm).await?;

        self.advance(ctx, BuildStage::Summarizing);
        self.engine.generate_community_reports().await?;

        self.advance(ctx, BuildStage::Finalizing);
        self.engine.flush().await?;
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        Ok(())
    }

    fn advance(&self, ctx: &JobCtx, stage: BuildStage) {
        self.registry.set_build(progress_for(stage));
        info!("{} {} ({:.0}%)", ctx, stage.label(), stage.fraction() * 100.0);
    }
}

fn progress_for(stage: BuildStage) -> BuildProgress {
    let status = match stage {
        BuildStage::Completed => BuildStatus::Completed,
        _ => BuildStatus::Processing,
    };
    BuildProgress {
        status,
        progress: stage.fraction(),
        message: stage.label().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::recording::RecordingEngine;
    use tokio::time::Instant;

    #[test]
    fn test_only_final_stage_is_completed() {
        assert_eq!(progress_for(BuildStage::Finalizing).status, BuildStatus::Processing);
        let done = progress_for(BuildStage::Completed);
        assert_eq!(done.status, BuildStatus::Completed);
        assert_eq!(done.progress, 1.0);
        assert_eq!(done.message, "知识图谱构建完成");
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_completes_after_settle_delay() {
        let settle = Duration::from_secs(3);
        let engine = Arc::new(RecordingEngine::default());
        let registry = Arc::new(ProgressRegistry::new());
        let flow = BuildFlow::new(
            engine.clone(),
            registry.clone(),
            "document".to_string(),
            settle,
        );

        let start = Instant::now();
        let run = tokio::spawn(async move { flow.run(&JobCtx::build("build-1".to_string())).await });

        for _ in 0..100 {
            if registry.build().progress >= 0.9 {
                break;
            }
            tokio::task::yield_now().await;
        }

        tokio::time::advance(Duration::from_secs(2)).await;
        let progress = registry.build();
        assert_eq!(progress.status, BuildStatus::Processing);
        assert_eq!(progress.message, "完成构建...");
        assert_eq!(RecordingEngine::count(&engine.cluster_calls), 1);
        assert_eq!(RecordingEngine::count(&engine.report_calls), 1);

        run.await.unwrap().unwrap();
        assert!(start.elapsed() >= settle);
        assert_eq!(registry.build().status, BuildStatus::Completed);
    }
}

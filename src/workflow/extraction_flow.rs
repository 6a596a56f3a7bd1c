//! 论文抽取流程 - 流程层
//!
//! 核心职责：定义"一篇论文"的抽取步骤
//!
//! 流程顺序：
//! 1. 准备中（0.0）：检查文档内容
//! 2. 文本切分中（0.2）：交给图谱引擎导入
//! 3. 实体抽取中（0.6）：等待引擎完成信号 + 可选的稳定等待
//! 4. 完成（1.0）
//!
//! 任何一步失败都直接进入 `error`，错误信息写入进度登记表。
//! 调用方必须已经持有这篇论文的抽取守卫。

use crate::engine::GraphEngine;
use crate::error::{AppError, AppResult};
use crate::services::{ExtractionUpdate, ProgressRegistry};
use crate::workflow::job_ctx::JobCtx;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 抽取阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStage {
    Preparing,
    Inserting,
    Extracting,
    Done,
}

impl ExtractionStage {
    pub fn fraction(self) -> f64 {
        match self {
            ExtractionStage::Preparing => 0.0,
            ExtractionStage::Inserting => 0.2,
            ExtractionStage::Extracting => 0.6,
            ExtractionStage::Done => 1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ExtractionStage::Preparing => "准备中...",
            ExtractionStage::Inserting => "文本切分中...",
            ExtractionStage::Extracting => "实体抽取中...",
            ExtractionStage::Done => "完成",
        }
    }
}

/// 论文抽取流程
///
/// - 只负责推进步骤和记录进度
/// - 不持有守卫，不关心运行在哪个线程
pub struct ExtractionFlow {
    engine: Arc<dyn GraphEngine>,
    registry: Arc<ProgressRegistry>,
    settle: Duration,
}

impl ExtractionFlow {
    pub fn new(
        engine: Arc<dyn GraphEngine>,
        registry: Arc<ProgressRegistry>,
        settle: Duration,
    ) -> Self {
        Self {
            engine,
            registry,
            settle,
        }
    }

    /// 执行一次抽取
    ///
    /// # 参数
    /// - `ctx`: 任务上下文（任务ID即运行标识）
    /// - `content`: 已整理好的文档内容
    pub async fn run(&self, ctx: &JobCtx, content: &str) -> AppResult<()> {
        let paper_id = ctx
            .paper_id
            .as_deref()
            .ok_or_else(|| AppError::internal("抽取任务缺少论文ID"))?;

        self.registry
            .begin_extraction(paper_id, &ctx.title, &ctx.task_id);
        info!("{} 📄 开始抽取: {}", ctx, ctx.title);

        match self.execute(ctx, paper_id, content).await {
            Ok(()) => {
                self.advance(ctx, paper_id, ExtractionStage::Done);
                info!("{} ✅ 抽取完成", ctx);
                Ok(())
            }
            Err(e) => {
                error!("{} ❌ 抽取失败: {}", ctx, e);
                self.registry.update_extraction(
                    paper_id,
                    &ctx.task_id,
                    ExtractionUpdate::failed(e.to_string()),
                );
                Err(e)
            }
        }
    }

    async fn execute(&self, ctx: &JobCtx, paper_id: &str, content: &str) -> AppResult<()> {
        if content.trim().is_empty() {
            return Err(AppError::validation("论文内容为空"));
        }

        self.advance(ctx, paper_id, ExtractionStage::Inserting);
        self.engine.ingest(content).await?;

        self.advance(ctx, paper_id, ExtractionStage::Extracting);
        self.engine.flush().await?;
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        Ok(())
    }

    fn advance(&self, ctx: &JobCtx, paper_id: &str, stage: ExtractionStage) {
        let update = match stage {
            ExtractionStage::Done => ExtractionUpdate::completed(stage.label()),
            _ => ExtractionUpdate::step(stage.label(), stage.fraction()),
        };
        if self
            .registry
            .update_extraction(paper_id, &ctx.task_id, update)
        {
            info!("{} {} ({:.0}%)", ctx, stage.label(), stage.fraction() * 100.0);
        }
    }
}

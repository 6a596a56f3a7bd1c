//! 图谱引擎接口
//!
//! 编排层只通过 [`GraphEngine`] 访问实际的抽取、聚类和摘要算法。
//! 引擎实例在所有任务之间共享，每个任务运行在各自的 runtime 上，
//! 所以实现不能在 `.await` 期间持有同步锁。

pub mod llm_engine;
#[cfg(test)]
pub(crate) mod recording;

pub use llm_engine::LlmGraphEngine;

use crate::error::AppResult;
use crate::models::QueryMode;
use async_trait::async_trait;
use serde::Serialize;

/// 图谱规模统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub documents: usize,
    pub chunks: usize,
    pub entities: usize,
    pub relationships: usize,
    pub communities: usize,
}

/// 知识图谱引擎
#[async_trait]
pub trait GraphEngine: Send + Sync {
    /// 导入一篇文档的文本（切分、实体抽取）
    async fn ingest(&self, text: &str) -> AppResult<()>;

    /// 社区检测
    ///
    /// # 参数
    /// - `algorithm`: 聚类算法名
    async fn cluster(&self, algorithm: &str) -> AppResult<()>;

    /// 为每个社区生成摘要报告
    async fn generate_community_reports(&self) -> AppResult<()>;

    /// 回答问题
    async fn query(&self, question: &str, mode: QueryMode) -> AppResult<String>;

    /// 已生成的社区报告键
    async fn community_report_keys(&self) -> AppResult<Vec<String>>;

    /// 当前图谱规模，不支持统计的引擎返回全零
    fn stats(&self) -> GraphStats {
        GraphStats::default()
    }

    /// 等待引擎内部的后台写入全部完成
    async fn flush(&self) -> AppResult<()> {
        Ok(())
    }

    /// 清空所有数据
    async fn clear(&self) -> AppResult<()>;
}

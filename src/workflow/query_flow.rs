//! 问答流程 - 流程层
//!
//! 不加守卫，在请求所在的上下文里直接执行。
//! global 模式需要已有社区报告，否则直接返回引导文字，不发起任何远程调用。
//! 检查社区报告本身失败时也以文字回答，不返回错误。

use crate::engine::GraphEngine;
use crate::error::AppResult;
use crate::models::QueryMode;
use std::sync::Arc;
use tracing::{info, warn};

/// 尚未构建知识图谱时 global 查询的回答
pub const GLOBAL_QUERY_GUIDANCE: &str =
    "Global查询需要先构建知识图谱。请点击'构建知识图谱'按钮完成社区检测和摘要生成。";

/// 问答流程
pub struct QueryFlow {
    engine: Arc<dyn GraphEngine>,
}

impl QueryFlow {
    pub fn new(engine: Arc<dyn GraphEngine>) -> Self {
        Self { engine }
    }

    pub async fn run(&self, question: &str, mode: QueryMode) -> AppResult<String> {
        if mode == QueryMode::Global {
            let keys = match self.engine.community_report_keys().await {
                Ok(keys) => keys,
                Err(e) => {
                    warn!("⚠️ 检查社区报告失败: {}", e);
                    return Ok(format!("检查社区报告失败: {}", e));
                }
            };
            if keys.is_empty() {
                info!("💡 尚无社区报告，返回构建引导");
                return Ok(GLOBAL_QUERY_GUIDANCE.to_string());
            }
            info!("🌐 Global 查询，使用 {} 份社区报告", keys.len());
        } else {
            info!("🔎 Local 查询");
        }

        self.engine.query(question, mode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::recording::{RecordingEngine, RECORDED_ANSWER};

    #[tokio::test]
    async fn test_global_query_needs_reports() {
        let engine = Arc::new(RecordingEngine::default());
        let answer = QueryFlow::new(engine.clone())
            .run("主要研究方向", QueryMode::Global)
            .await
            .unwrap();
        assert_eq!(answer, GLOBAL_QUERY_GUIDANCE);

        let engine = Arc::new(RecordingEngine::default().with_report_keys(&["community-0"]));
        let answer = QueryFlow::new(engine.clone())
            .run("主要研究方向", QueryMode::Global)
            .await
            .unwrap();
        assert_eq!(answer, RECORDED_ANSWER);
        assert_eq!(RecordingEngine::count(&engine.query_calls), 1);
    }

    #[tokio::test]
    async fn test_report_check_failure_is_answered_as_text() {
        let engine = Arc::new(RecordingEngine::default().failing_report_keys("存储不可用"));

        let answer = QueryFlow::new(engine.clone())
            .run("主要研究方向", QueryMode::Global)
            .await
            .unwrap();
        assert!(answer.starts_with("检查社区报告失败: "));
        assert!(answer.contains("存储不可用"));
        assert_eq!(RecordingEngine::count(&engine.query_calls), 0);
    }
}

//! 记录调用次数的内存引擎，供流程层单元测试使用

use crate::engine::GraphEngine;
use crate::error::{AppError, AppResult};
use crate::models::QueryMode;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) const RECORDED_ANSWER: &str = "recorded answer";

#[derive(Debug, Default)]
pub(crate) struct RecordingEngine {
    pub ingest_calls: AtomicUsize,
    pub cluster_calls: AtomicUsize,
    pub report_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    report_keys: Vec<String>,
    report_keys_error: Option<String>,
}

impl RecordingEngine {
    pub fn with_report_keys(mut self, keys: &[&str]) -> Self {
        self.report_keys = keys.iter().map(|key| key.to_string()).collect();
        self
    }

    pub fn failing_report_keys(mut self, message: &str) -> Self {
        self.report_keys_error = Some(message.to_string());
        self
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphEngine for RecordingEngine {
    async fn ingest(&self, _text: &str) -> AppResult<()> {
        self.ingest_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cluster(&self, _algorithm: &str) -> AppResult<()> {
        self.cluster_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn generate_community_reports(&self) -> AppResult<()> {
        self.report_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query(&self, _question: &str, _mode: QueryMode) -> AppResult<String> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        Ok(RECORDED_ANSWER.to_string())
    }

    async fn community_report_keys(&self) -> AppResult<Vec<String>> {
        match &self.report_keys_error {
            Some(message) => Err(AppError::internal(message.clone())),
            None => Ok(self.report_keys.clone()),
        }
    }

    async fn clear(&self) -> AppResult<()> {
        Ok(())
    }
}

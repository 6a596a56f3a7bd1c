//! 集成测试共用的模拟图谱引擎和辅助函数

#![allow(dead_code)]

use async_trait::async_trait;
use paper_graph_jobs::{
    AppError, AppResult, Config, GraphEngine, GraphStats, PaperDocument, QueryMode,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const MOCK_ANSWER: &str = "mock answer";

/// 记录调用次数和并发峰值的模拟引擎
#[derive(Default)]
pub struct MockEngine {
    pub ingest_calls: AtomicUsize,
    pub cluster_calls: AtomicUsize,
    pub report_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    pub clear_calls: AtomicUsize,

    active_ingests: AtomicUsize,
    pub peak_ingests: AtomicUsize,
    active_clusters: AtomicUsize,
    pub peak_clusters: AtomicUsize,

    ingest_delay: Duration,
    cluster_delay: Duration,
    ingest_error: Option<String>,
    panic_on_cluster: bool,
    report_keys_error: Option<String>,
    report_keys: Mutex<Vec<String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ingest_delay(mut self, delay: Duration) -> Self {
        self.ingest_delay = delay;
        self
    }

    pub fn with_cluster_delay(mut self, delay: Duration) -> Self {
        self.cluster_delay = delay;
        self
    }

    pub fn failing_ingest(mut self, message: &str) -> Self {
        self.ingest_error = Some(message.to_string());
        self
    }

    pub fn panicking_cluster(mut self) -> Self {
        self.panic_on_cluster = true;
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

fn enter(active: &AtomicUsize, peak: &AtomicUsize) {
    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
    peak.fetch_max(now, Ordering::SeqCst);
}

#[async_trait]
impl GraphEngine for MockEngine {
    async fn ingest(&self, _text: &str) -> AppResult<()> {
        self.ingest_calls.fetch_add(1, Ordering::SeqCst);
        enter(&self.active_ingests, &self.peak_ingests);
        tokio::time::sleep(self.ingest_delay).await;
        self.active_ingests.fetch_sub(1, Ordering::SeqCst);

        match &self.ingest_error {
            Some(message) => Err(AppError::internal(message.clone())),
            None => Ok(()),
        }
    }

    async fn cluster(&self, _algorithm: &str) -> AppResult<()> {
        self.cluster_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_cluster {
            panic!("聚类引擎崩溃");
        }
        enter(&self.active_clusters, &self.peak_clusters);
        tokio::time::sleep(self.cluster_delay).await;
        self.active_clusters.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn generate_community_reports(&self) -> AppResult<()> {
        self.report_calls.fetch_add(1, Ordering::SeqCst);
        let mut keys = self.report_keys.lock().unwrap();
        *keys = vec!["community-0".to_string(), "community-1".to_string()];
        Ok(())
    }

    async fn query(&self, _question: &str, _mode: QueryMode) -> AppResult<String> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        Ok(MOCK_ANSWER.to_string())
    }

    async fn community_report_keys(&self) -> AppResult<Vec<String>> {
        if let Some(message) = &self.report_keys_error {
            return Err(AppError::internal(message.clone()));
        }
        Ok(self.report_keys.lock().unwrap().clone())
    }

    fn stats(&self) -> GraphStats {
        GraphStats {
            documents: Self::count(&self.ingest_calls),
            communities: self.report_keys.lock().unwrap().len(),
            ..Default::default()
        }
    }

    async fn clear(&self) -> AppResult<()> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        self.report_keys.lock().unwrap().clear();
        Ok(())
    }
}

/// 带 API Key 的测试配置
pub fn test_config(max_concurrent_extractions: usize) -> Config {
    let mut config = Config::default();
    config.openai.api_key = "sk-test-key".to_string();
    config.system.max_concurrent_extractions = max_concurrent_extractions;
    config
}

pub fn paper(id: &str, title: &str) -> PaperDocument {
    PaperDocument {
        id: id.to_string(),
        title: title.to_string(),
        authors: vec!["Ashish Vaswani".to_string()],
        summary: "We propose a new simple network architecture, the Transformer.".to_string(),
        ..Default::default()
    }
}

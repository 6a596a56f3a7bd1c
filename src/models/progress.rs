//! 进度记录
//!
//! 抽取进度按论文维护，构建进度全局唯一。

use serde::{Deserialize, Serialize};

/// 抽取状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// 从未抽取（未知论文的默认值）
    NotExtracted,
    Processing,
    Completed,
    Error,
}

impl ExtractionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExtractionStatus::Completed | ExtractionStatus::Error)
    }
}

/// 单篇论文的抽取进度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionProgress {
    pub paper_id: String,
    pub title: String,
    pub current_step: String,
    /// 0.0 - 1.0
    pub progress: f64,
    pub status: ExtractionStatus,
    pub error_message: Option<String>,
}

impl ExtractionProgress {
    /// 未知论文的默认进度
    pub fn not_extracted(paper_id: impl Into<String>) -> Self {
        Self {
            paper_id: paper_id.into(),
            title: String::new(),
            current_step: "未开始".to_string(),
            progress: 0.0,
            status: ExtractionStatus::NotExtracted,
            error_message: None,
        }
    }
}

/// 构建状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Idle,
    Processing,
    Completed,
    Error,
}

/// 知识图谱构建进度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildProgress {
    pub status: BuildStatus,
    pub progress: f64,
    pub message: String,
}

impl Default for BuildProgress {
    fn default() -> Self {
        Self {
            status: BuildStatus::Idle,
            progress: 0.0,
            message: String::new(),
        }
    }
}

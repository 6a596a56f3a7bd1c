use crate::error::AppError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Started,
    Completed,
    Failed,
    NotFound,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// 任务状态记录（供客户端轮询）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusRecord {
    pub status: TaskState,
    pub message: String,
    pub updated_at: Option<DateTime<Local>>,
}

impl TaskStatusRecord {
    pub fn new(status: TaskState, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            updated_at: Some(Local::now()),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: TaskState::NotFound,
            message: "任务不存在".to_string(),
            updated_at: None,
        }
    }
}

/// 查询模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    #[default]
    Local,
    Global,
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryMode::Local => write!(f, "local"),
            QueryMode::Global => write!(f, "global"),
        }
    }
}

impl FromStr for QueryMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(QueryMode::Local),
            "global" => Ok(QueryMode::Global),
            other => Err(AppError::validation(format!(
                "未知的查询模式: {}（可选 local / global）",
                other
            ))),
        }
    }
}

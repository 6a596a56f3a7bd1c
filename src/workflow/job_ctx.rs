//! 任务上下文
//!
//! 封装"我正在执行哪个任务、处理哪篇论文"这一信息，主要用于日志前缀

use std::fmt::Display;

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Extraction,
    Build,
}

/// 任务上下文
#[derive(Debug, Clone)]
pub struct JobCtx {
    /// 任务ID（同时作为抽取运行标识）
    pub task_id: String,

    pub kind: JobKind,

    /// 论文ID（仅抽取任务）
    pub paper_id: Option<String>,

    /// 论文标题（仅用于日志显示）
    pub title: String,
}

impl JobCtx {
    pub fn extraction(task_id: String, paper_id: String, title: String) -> Self {
        Self {
            task_id,
            kind: JobKind::Extraction,
            paper_id: Some(paper_id),
            title,
        }
    }

    pub fn build(task_id: String) -> Self {
        Self {
            task_id,
            kind: JobKind::Build,
            paper_id: None,
            title: String::new(),
        }
    }

    /// 日志用的短任务ID
    pub fn short_task_id(&self) -> &str {
        self.task_id.get(..8).unwrap_or(&self.task_id)
    }

    /// 线程名和日志用的任务名
    pub fn job_name(&self) -> String {
        match &self.paper_id {
            Some(paper_id) => format!("extract-{}", paper_id),
            None => "build".to_string(),
        }
    }
}

impl Display for JobCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.paper_id {
            Some(paper_id) => write!(f, "[任务 {} 论文 {}]", self.short_task_id(), paper_id),
            None => write!(f, "[任务 {} 构建]", self.short_task_id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefix() {
        let ctx = JobCtx::extraction(
            "0123456789abcdef".to_string(),
            "1706.03762".to_string(),
            "Attention".to_string(),
        );
        assert_eq!(ctx.to_string(), "[任务 01234567 论文 1706.03762]");
        assert_eq!(ctx.job_name(), "extract-1706.03762");

        let ctx = JobCtx::build("abc".to_string());
        assert_eq!(ctx.to_string(), "[任务 abc 构建]");
        assert_eq!(ctx.kind, JobKind::Build);
    }
}

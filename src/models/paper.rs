//! 论文文档
//!
//! 论文元数据由外部持久化层提供，这里只负责把它整理成交给图谱引擎的文本。

use serde::{Deserialize, Serialize};

/// 待抽取的论文
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperDocument {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    /// 摘要
    pub summary: String,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    /// 全文（仅深度模式使用）
    pub full_content: Option<String>,
}

impl PaperDocument {
    /// 显示用标题，缺失时为 `Unknown`
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Unknown"
        } else {
            &self.title
        }
    }

    /// 是否没有任何可抽取的内容
    pub fn is_blank(&self, deep_mode: bool) -> bool {
        self.prepare_content(deep_mode).trim().is_empty()
    }

    /// 构建用于抽取的文档内容
    ///
    /// 空字段不输出；深度模式下追加全文。
    pub fn prepare_content(&self, deep_mode: bool) -> String {
        let mut parts = Vec::new();

        push_field(&mut parts, "Title", &self.title);
        push_field(&mut parts, "Authors", &self.authors.join(", "));
        push_field(&mut parts, "Abstract", &self.summary);
        push_field(&mut parts, "Categories", &self.categories.join(", "));
        push_field(&mut parts, "Keywords", &self.keywords.join(", "));

        if deep_mode {
            if let Some(full) = &self.full_content {
                push_field(&mut parts, "Full Content", full);
            }
        }

        parts.join("\n\n")
    }
}

fn push_field(parts: &mut Vec<String>, label: &str, value: &str) {
    if !value.trim().is_empty() {
        parts.push(format!("{}: {}", label, value.trim()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PaperDocument {
        PaperDocument {
            id: "1706.03762".to_string(),
            title: "Attention Is All You Need".to_string(),
            authors: vec!["Ashish Vaswani".to_string(), "Noam Shazeer".to_string()],
            summary: "The dominant sequence transduction models...".to_string(),
            categories: vec!["cs.CL".to_string()],
            keywords: vec![],
            full_content: Some("1 Introduction ...".to_string()),
        }
    }

    #[test]
    fn test_prepare_content_skips_empty_fields() {
        let content = sample().prepare_content(false);
        assert!(content.starts_with("Title: Attention Is All You Need"));
        assert!(content.contains("Authors: Ashish Vaswani, Noam Shazeer"));
        assert!(!content.contains("Keywords"));
        assert!(!content.contains("Full Content"));
    }

    #[test]
    fn test_deep_mode_appends_full_content() {
        let content = sample().prepare_content(true);
        assert!(content.ends_with("Full Content: 1 Introduction ..."));
    }

    #[test]
    fn test_blank_document() {
        let doc = PaperDocument {
            id: "x".to_string(),
            title: "  ".to_string(),
            ..Default::default()
        };
        assert!(doc.is_blank(false));
        assert_eq!(doc.display_title(), "Unknown");
        assert!(!sample().is_blank(false));
    }
}

use crate::error::AppResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 程序配置
///
/// 配置值通过构造函数显式传入各个组件，不修改进程环境变量。
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub system: SystemConfig,
    pub graph: GraphConfig,
}

/// OpenAI 兼容服务配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    /// 抽取与社区摘要使用的模型
    pub extract_model: String,
    /// 问答使用的模型
    pub qa_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// 单次远程调用超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            extract_model: "gpt-4o-mini".to_string(),
            qa_model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            temperature: 0.1,
            max_tokens: 4000,
            request_timeout_secs: 60,
        }
    }
}

impl OpenAiConfig {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// 掩码后的 API Key，保留前 4 位和后 4 位
    pub fn masked_api_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() > 8 {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}{}{}", head, "*".repeat(chars.len() - 8), tail)
        } else {
            "*".repeat(chars.len())
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 系统运行配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// 深度模式：抽取时包含论文全文
    pub deep_mode: bool,
    /// 同时进行的论文抽取数量
    pub max_concurrent_extractions: usize,
    /// 同时在途的远程调用数量
    pub max_concurrent_requests: usize,
    /// 单次 embedding 请求的最大条数
    pub embedding_batch_size: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// 抽取完成信号之后的额外等待（毫秒）
    pub extraction_settle_ms: u64,
    /// 构建完成信号之后的额外等待（毫秒）
    pub build_settle_ms: u64,
    /// 任务状态表最大条数
    pub task_table_capacity: usize,
    /// 终态任务被查询后保留的时间（秒）
    pub task_ttl_secs: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            deep_mode: false,
            max_concurrent_extractions: 3,
            max_concurrent_requests: 3,
            embedding_batch_size: 100,
            chunk_size: 1200,
            chunk_overlap: 100,
            extraction_settle_ms: 0,
            build_settle_ms: 0,
            task_table_capacity: 1024,
            task_ttl_secs: 600,
            verbose_logging: false,
        }
    }
}

impl SystemConfig {
    pub fn extraction_settle(&self) -> Duration {
        Duration::from_millis(self.extraction_settle_ms)
    }

    pub fn build_settle(&self) -> Duration {
        Duration::from_millis(self.build_settle_ms)
    }

    pub fn task_ttl(&self) -> Duration {
        Duration::from_secs(self.task_ttl_secs)
    }
}

/// 图谱构建配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// 社区划分算法：`similarity` 或 `document`
    pub cluster_algorithm: String,
    pub entity_summary_max_tokens: u32,
    pub community_report_max_tokens: u32,
    /// local 查询召回的文本块数量
    pub local_top_k: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            cluster_algorithm: "similarity".to_string(),
            entity_summary_max_tokens: 500,
            community_report_max_tokens: 15000,
            local_top_k: 5,
        }
    }
}

impl Config {
    /// 从 TOML 文件加载，缺失字段使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 在默认配置上应用环境变量
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 在当前配置上应用环境变量
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            self.openai.api_key = v;
        }
        if let Ok(v) = std::env::var("OPENAI_API_BASE") {
            self.openai.api_base = v;
        }
        if let Ok(v) = std::env::var("OPENAI_EXTRACT_MODEL") {
            self.openai.extract_model = v;
        }
        if let Ok(v) = std::env::var("OPENAI_QA_MODEL") {
            self.openai.qa_model = v;
        }
        if let Ok(v) = std::env::var("OPENAI_EMBEDDING_MODEL") {
            self.openai.embedding_model = v;
        }
        self.system.max_concurrent_extractions = std::env::var("MAX_CONCURRENT_EXTRACTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.system.max_concurrent_extractions);
        self.system.max_concurrent_requests = std::env::var("MAX_CONCURRENT_REQUESTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.system.max_concurrent_requests);
        self.system.deep_mode = std::env::var("DEEP_MODE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.system.deep_mode);
        self.system.verbose_logging = std::env::var("VERBOSE_LOGGING")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.system.verbose_logging);
        self
    }
}

//! 错误类型
//!
//! 按照"任务是否已经启动"划分：
//! - 启动前错误（`Validation` / `Configuration` / `Precondition`）同步返回给调用方，任务不会被创建
//! - 任务内错误（`RemoteCall` / `Internal`）在任务边界被捕获，只能通过轮询进度和任务状态观察到

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入参数不合法
    #[error("参数错误: {0}")]
    Validation(String),

    /// 缺少必要配置（如 API Key）
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 前置阶段未完成
    #[error("前置条件不满足: {0}")]
    Precondition(String),

    /// 远程 LLM / Embedding 服务调用失败
    #[error("远程调用失败: {0}")]
    RemoteCall(#[from] RemoteCallError),

    /// 其他意外错误
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 远程调用错误
///
/// 上游返回的状态码和响应体原样保留，不做任何重试。
#[derive(Debug, Error)]
pub enum RemoteCallError {
    /// 上游返回非 2xx 状态码
    #[error("{endpoint} 返回错误状态 {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// 请求超时
    #[error("{endpoint} 请求超时")]
    Timeout { endpoint: String },

    /// 网络层失败
    #[error("{endpoint} 请求异常: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// 响应结构不符合约定
    #[error("{endpoint} 响应格式异常: {detail}")]
    Malformed { endpoint: String, detail: String },
}

impl RemoteCallError {
    /// 上游状态码（仅 `Status` 变体有）
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteCallError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 将 reqwest 错误归类为超时或网络异常
    pub fn from_reqwest(endpoint: impl Into<String>, err: reqwest::Error) -> Self {
        let endpoint = endpoint.into();
        if err.is_timeout() {
            RemoteCallError::Timeout { endpoint }
        } else {
            RemoteCallError::Transport {
                endpoint,
                source: err,
            }
        }
    }
}

// ========== 从常见错误类型转换 ==========

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("IO 错误: {}", err))
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Configuration(format!("TOML 解析失败: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON 处理失败: {}", err))
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        AppError::Configuration(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        AppError::Precondition(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal(message.into())
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_keeps_upstream_body() {
        let err = RemoteCallError::Status {
            endpoint: "/chat/completions".to_string(),
            status: 429,
            body: "{\"error\":\"rate limited\"}".to_string(),
        };
        assert_eq!(err.status(), Some(429));
        assert!(err.to_string().contains("rate limited"));
        assert!(err.to_string().contains("429"));
    }
}

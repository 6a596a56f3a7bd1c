//! LLM API 客户端
//!
//! 封装与 OpenAI 兼容服务的两类调用，每次 HTTP 请求都先经过并发闸门：
//! - 单次补全：一个 prompt → 一段文本
//! - 批量 embedding：有序文本列表 → 等长的向量列表，超过批大小时按顺序分批
//!
//! 任何非 2xx 响应或超时都返回 `RemoteCallError`，这里不做重试。

use crate::config::{OpenAiConfig, SystemConfig};
use crate::error::{AppError, AppResult, RemoteCallError};
use crate::infrastructure::ConcurrencyGate;
use crate::utils::logging::truncate_text;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

const CHAT_ENDPOINT: &str = "/chat/completions";
const EMBEDDING_ENDPOINT: &str = "/embeddings";

/// embedding 向量
pub type Embedding = Vec<f32>;

/// 单次补全请求
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub system_prompt: Option<&'a str>,
    /// 不指定时使用配置中的 `max_tokens`
    pub max_tokens: Option<u32>,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(model: &'a str, prompt: &'a str) -> Self {
        Self {
            model,
            prompt,
            system_prompt: None,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system_prompt: &'a str) -> Self {
        self.system_prompt = Some(system_prompt);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// 连接测试结果
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub model: String,
    pub response_time_secs: f64,
    pub response_preview: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Embedding,
}

/// LLM 客户端
///
/// 所有任务共享同一个客户端和闸门。
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    gate: ConcurrencyGate,
    config: OpenAiConfig,
    embedding_batch_size: usize,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(config: &OpenAiConfig, system: &SystemConfig) -> AppResult<Self> {
        Self::with_gate(
            config,
            ConcurrencyGate::new(system.max_concurrent_requests),
            system.embedding_batch_size,
        )
    }

    /// 使用外部提供的闸门创建客户端
    pub fn with_gate(
        config: &OpenAiConfig,
        gate: ConcurrencyGate,
        embedding_batch_size: usize,
    ) -> AppResult<Self> {
        // 每个任务的 runtime 用完即销毁，连接池里的连接会随之失效
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| AppError::configuration(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            http,
            gate,
            config: config.clone(),
            embedding_batch_size: embedding_batch_size.max(1),
        })
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    /// 发送单次补全请求
    ///
    /// # 返回
    /// 返回 `choices[0].message.content`（去除首尾空白）
    pub async fn complete(&self, request: CompletionRequest<'_>) -> AppResult<String> {
        debug!(
            "调用 LLM API，模型: {}，prompt: {}",
            request.model,
            truncate_text(request.prompt, 60)
        );

        let body = self.build_chat_body(&request)?;

        let _permit = self.gate.admit().await?;
        let response: ChatCompletionResponse = self.post_json(CHAT_ENDPOINT, &body).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RemoteCallError::Malformed {
                endpoint: CHAT_ENDPOINT.to_string(),
                detail: "choices[0].message.content 为空".to_string(),
            })?;

        debug!("LLM API 调用成功");
        Ok(content.trim().to_string())
    }

    /// 使用抽取模型的简单补全
    pub async fn simple_complete(&self, prompt: &str) -> AppResult<String> {
        self.complete(CompletionRequest::new(&self.config.extract_model, prompt))
            .await
    }

    /// 批量计算 embedding
    ///
    /// 超过批大小的输入按顺序分批，每批单独申请闸门名额，结果按输入顺序拼接。
    pub async fn embed(&self, texts: &[String]) -> AppResult<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches = texts.len().div_ceil(self.embedding_batch_size);
        debug!(
            "计算 {} 条文本的 embedding，分 {} 批，模型: {}",
            texts.len(),
            batches,
            self.config.embedding_model
        );

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.embedding_batch_size) {
            let vectors = self.embed_batch(batch).await?;
            all.extend(vectors);
        }

        Ok(all)
    }

    async fn embed_batch(&self, batch: &[String]) -> AppResult<Vec<Embedding>> {
        let body = EmbeddingRequest {
            input: batch,
            model: &self.config.embedding_model,
        };

        let _permit = self.gate.admit().await?;
        let response: EmbeddingResponse = self.post_json(EMBEDDING_ENDPOINT, &body).await?;

        if response.data.len() != batch.len() {
            return Err(RemoteCallError::Malformed {
                endpoint: EMBEDDING_ENDPOINT.to_string(),
                detail: format!(
                    "请求 {} 条，返回 {} 条",
                    batch.len(),
                    response.data.len()
                ),
            }
            .into());
        }

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    /// 测试 API 连接
    pub async fn test_connection(&self) -> AppResult<ConnectionReport> {
        if !self.config.has_api_key() {
            return Err(AppError::configuration("API Key 未配置"));
        }

        let model = self.config.qa_model.clone();
        let started = Instant::now();
        let reply = self
            .complete(CompletionRequest::new(&model, "Hello").with_max_tokens(10))
            .await?;
        let elapsed = started.elapsed().as_secs_f64();

        info!("✓ 连接测试成功，模型: {}，耗时 {:.2}s", model, elapsed);

        Ok(ConnectionReport {
            model,
            response_time_secs: (elapsed * 100.0).round() / 100.0,
            response_preview: truncate_text(&reply, 50),
        })
    }

    /// 构建 chat/completions 请求体
    fn build_chat_body(&self, request: &CompletionRequest<'_>) -> AppResult<serde_json::Value> {
        let mut messages = Vec::new();

        if let Some(system_prompt) = request.system_prompt {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()
                .map_err(|e| AppError::internal(format!("构建系统消息失败: {}", e)))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt)
            .build()
            .map_err(|e| AppError::internal(format!("构建用户消息失败: {}", e)))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(request.model)
            .messages(messages)
            .temperature(self.config.temperature)
            .max_tokens(request.max_tokens.unwrap_or(self.config.max_tokens))
            .build()
            .map_err(|e| AppError::internal(format!("构建补全请求失败: {}", e)))?;

        Ok(serde_json::to_value(&chat_request)?)
    }

    /// 发送 POST 请求并解析 JSON
    async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> AppResult<T>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), endpoint);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| RemoteCallError::from_reqwest(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("{} 返回错误状态 {}: {}", endpoint, status, truncate_text(&body, 200));
            return Err(RemoteCallError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed = response
            .json::<T>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoteCallError::Timeout {
                        endpoint: endpoint.to_string(),
                    }
                } else {
                    RemoteCallError::Malformed {
                        endpoint: endpoint.to_string(),
                        detail: e.to_string(),
                    }
                }
            })?;

        Ok(parsed)
    }
}

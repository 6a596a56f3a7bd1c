//! 基于 LLM 客户端的参考图谱引擎
//!
//! 处理流程：
//! 1. ingest：按字符窗口切分文本 → 批量 embedding → 逐块抽取实体摘要
//! 2. cluster：按文档或按 embedding 相似度把文本块分成社区
//! 3. generate_community_reports：每个社区生成一份报告
//! 4. query：local 用问题 embedding 检索最相近的文本块，global 汇总社区报告
//!
//! 所有远程调用都走 `LlmClient`，因此共享同一个并发闸门。

use crate::clients::llm_client::{CompletionRequest, Embedding, LlmClient};
use crate::config::{GraphConfig, SystemConfig};
use crate::engine::{GraphEngine, GraphStats};
use crate::error::{AppError, AppResult};
use crate::models::QueryMode;
use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// 相似度聚类阈值
const SIMILARITY_THRESHOLD: f32 = 0.8;

const ENTITY_SYSTEM_PROMPT: &str = "你是一个学术知识图谱构建助手。\
请从给定的论文片段中抽取关键实体（方法、模型、数据集、任务、指标、作者）及它们之间的关系，\
每行输出一条：实体 | 类型 | 关系描述。";

const REPORT_SYSTEM_PROMPT: &str = "你是一个学术知识图谱分析助手。\
请根据一个社区内的实体与关系，写一份简洁的社区报告：主题、核心实体、关键发现。";

const QA_SYSTEM_PROMPT: &str = "你是一个学术问答助手。只根据提供的资料回答问题，资料不足时直接说明。";

/// 引擎中没有任何内容时 local 查询的回答
pub const EMPTY_GRAPH_ANSWER: &str = "知识图谱中暂无内容，请先抽取论文。";

#[derive(Debug, Clone)]
struct Chunk {
    document: usize,
    text: String,
    embedding: Embedding,
    entities: String,
}

#[derive(Debug, Default)]
struct EngineState {
    documents: usize,
    chunks: Vec<Chunk>,
    communities: Vec<Vec<usize>>,
    reports: BTreeMap<String, String>,
}

/// 参考图谱引擎
#[derive(Debug)]
pub struct LlmGraphEngine {
    client: LlmClient,
    chunk_size: usize,
    chunk_overlap: usize,
    graph: GraphConfig,
    state: RwLock<EngineState>,
}

impl LlmGraphEngine {
    pub fn new(client: LlmClient, system: &SystemConfig, graph: &GraphConfig) -> Self {
        Self {
            client,
            chunk_size: system.chunk_size.max(1),
            chunk_overlap: system.chunk_overlap,
            graph: graph.clone(),
            state: RwLock::new(EngineState::default()),
        }
    }

    /// 已导入的文本块数量
    pub fn chunk_count(&self) -> usize {
        self.read_state().chunks.len()
    }

    /// 当前社区数量
    pub fn community_count(&self) -> usize {
        self.read_state().communities.len()
    }

    async fn summarize_entities(&self, text: &str) -> AppResult<String> {
        let model = &self.client.config().extract_model;
        self.client
            .complete(
                CompletionRequest::new(model, text)
                    .with_system(ENTITY_SYSTEM_PROMPT)
                    .with_max_tokens(self.graph.entity_summary_max_tokens),
            )
            .await
    }

    async fn write_report(&self, index: usize, material: &str) -> AppResult<(String, String)> {
        let model = &self.client.config().qa_model;
        let report = self
            .client
            .complete(
                CompletionRequest::new(model, material)
                    .with_system(REPORT_SYSTEM_PROMPT)
                    .with_max_tokens(self.graph.community_report_max_tokens),
            )
            .await?;
        Ok((format!("community-{}", index), report))
    }

    async fn answer(&self, question: &str, context: &str) -> AppResult<String> {
        let prompt = format!("资料：\n{}\n\n问题：{}", context, question);
        let model = &self.client.config().qa_model;
        self.client
            .complete(CompletionRequest::new(model, &prompt).with_system(QA_SYSTEM_PROMPT))
            .await
    }

    async fn local_query(&self, question: &str) -> AppResult<String> {
        if self.chunk_count() == 0 {
            return Ok(EMPTY_GRAPH_ANSWER.to_string());
        }

        let vectors = self.client.embed(&[question.to_string()]).await?;
        let query_vector = vectors.into_iter().next().ok_or_else(|| {
            AppError::internal("问题的 embedding 为空")
        })?;

        let context = {
            let state = self.read_state();
            let mut scored: Vec<(f32, &Chunk)> = state
                .chunks
                .iter()
                .map(|chunk| (cosine_similarity(&query_vector, &chunk.embedding), chunk))
                .collect();
            scored.sort_by(|a, b| b.0.total_cmp(&a.0));
            scored
                .into_iter()
                .take(self.graph.local_top_k.max(1))
                .map(|(_, chunk)| format!("{}\n实体：{}", chunk.text, chunk.entities))
                .collect::<Vec<_>>()
                .join("\n---\n")
        };

        self.answer(question, &context).await
    }

    async fn global_query(&self, question: &str) -> AppResult<String> {
        let context = {
            let state = self.read_state();
            state
                .reports
                .iter()
                .map(|(key, report)| format!("[{}]\n{}", key, report))
                .collect::<Vec<_>>()
                .join("\n\n")
        };
        self.answer(question, &context).await
    }

    fn read_state(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GraphEngine for LlmGraphEngine {
    async fn ingest(&self, text: &str) -> AppResult<()> {
        let pieces = chunk_text(text, self.chunk_size, self.chunk_overlap);
        if pieces.is_empty() {
            return Err(AppError::validation("文档内容为空"));
        }
        debug!("文档切分为 {} 个文本块", pieces.len());

        let embeddings = self.client.embed(&pieces).await?;
        let entities = try_join_all(pieces.iter().map(|piece| self.summarize_entities(piece))).await?;

        let mut state = self.write_state();
        let document = state.documents;
        state.documents += 1;
        state.chunks.extend(
            pieces
                .into_iter()
                .zip(embeddings)
                .zip(entities)
                .map(|((text, embedding), entities)| Chunk {
                    document,
                    text,
                    embedding,
                    entities,
                }),
        );

        info!("✓ 文档 #{} 导入完成，累计 {} 个文本块", document, state.chunks.len());
        Ok(())
    }

    async fn cluster(&self, algorithm: &str) -> AppResult<()> {
        let mut state = self.write_state();
        if state.chunks.is_empty() {
            return Err(AppError::precondition("没有可聚类的内容"));
        }

        let communities = match algorithm {
            "document" => cluster_by_document(&state.chunks),
            "similarity" => {
                let embeddings: Vec<&Embedding> = state.chunks.iter().map(|c| &c.embedding).collect();
                cluster_by_similarity(&embeddings, SIMILARITY_THRESHOLD)
            }
            other => {
                return Err(AppError::validation(format!(
                    "未知的聚类算法: {}（可选 document / similarity）",
                    other
                )))
            }
        };

        info!("✓ 社区检测完成（{}），共 {} 个社区", algorithm, communities.len());
        state.communities = communities;
        Ok(())
    }

    async fn generate_community_reports(&self) -> AppResult<()> {
        let materials: Vec<String> = {
            let state = self.read_state();
            if state.communities.is_empty() {
                return Err(AppError::precondition("请先执行社区检测"));
            }
            state
                .communities
                .iter()
                .map(|members| {
                    members
                        .iter()
                        .filter_map(|&i| state.chunks.get(i))
                        .map(|chunk| chunk.entities.as_str())
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .collect()
        };

        let reports = try_join_all(
            materials
                .iter()
                .enumerate()
                .map(|(index, material)| self.write_report(index, material)),
        )
        .await?;

        let mut state = self.write_state();
        state.reports = reports.into_iter().collect();
        info!("✓ 生成 {} 份社区报告", state.reports.len());
        Ok(())
    }

    async fn query(&self, question: &str, mode: QueryMode) -> AppResult<String> {
        match mode {
            QueryMode::Local => self.local_query(question).await,
            QueryMode::Global => self.global_query(question).await,
        }
    }

    async fn community_report_keys(&self) -> AppResult<Vec<String>> {
        Ok(self.read_state().reports.keys().cloned().collect())
    }

    fn stats(&self) -> GraphStats {
        let state = self.read_state();

        let mut entities = BTreeSet::new();
        let mut relationships = 0;
        for line in state.chunks.iter().flat_map(|chunk| chunk.entities.lines()) {
            let Some((name, relation)) = parse_entity_line(line) else {
                continue;
            };
            entities.insert(name.to_lowercase());
            if relation.is_some() {
                relationships += 1;
            }
        }

        GraphStats {
            documents: state.documents,
            chunks: state.chunks.len(),
            entities: entities.len(),
            relationships,
            communities: state.communities.len(),
        }
    }

    async fn clear(&self) -> AppResult<()> {
        *self.write_state() = EngineState::default();
        info!("🗑️ 图谱引擎数据已清空");
        Ok(())
    }
}

/// 按字符窗口切分文本，相邻窗口重叠 `overlap` 个字符
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.trim().chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let size = chunk_size.max(1);
    let step = size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// 余弦相似度，维度不一致或零向量时为 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let a_norm = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let b_norm = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    dot / (a_norm * b_norm)
}

/// 解析一行实体摘要 `实体 | 类型 | 关系描述`
///
/// # 返回
/// 实体名和非空的关系描述；实体名为空时返回 `None`
fn parse_entity_line(line: &str) -> Option<(&str, Option<&str>)> {
    let mut columns = line.split('|').map(str::trim);
    let name = columns.next().filter(|name| !name.is_empty())?;
    let relation = columns.nth(1).filter(|relation| !relation.is_empty());
    Some((name, relation))
}

fn cluster_by_document(chunks: &[Chunk]) -> Vec<Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, chunk) in chunks.iter().enumerate() {
        groups.entry(chunk.document).or_default().push(index);
    }
    groups.into_values().collect()
}

/// 贪心聚类：与某个社区首个成员足够相似就加入，否则新建社区
fn cluster_by_similarity(embeddings: &[&Embedding], threshold: f32) -> Vec<Vec<usize>> {
    let mut communities: Vec<Vec<usize>> = Vec::new();
    for (index, embedding) in embeddings.iter().enumerate() {
        let home = communities
            .iter()
            .position(|members| cosine_similarity(embeddings[members[0]], embedding) >= threshold);
        match home {
            Some(position) => communities[position].push(index),
            None => communities.push(vec![index]),
        }
    }
    communities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenAiConfig;

    fn engine() -> LlmGraphEngine {
        let client = LlmClient::new(&OpenAiConfig::default(), &SystemConfig::default()).unwrap();
        LlmGraphEngine::new(client, &SystemConfig::default(), &GraphConfig::default())
    }

    #[test]
    fn test_chunk_text_with_overlap() {
        let chunks = chunk_text("abcdefghij", 4, 1);
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_chunk_text_short_and_empty() {
        assert_eq!(chunk_text("注意力机制", 1200, 100), vec!["注意力机制"]);
        assert!(chunk_text("   ", 1200, 100).is_empty());
        // overlap 不小于 size 时仍然前进
        assert_eq!(chunk_text("abc", 2, 5), vec!["ab", "bc"]);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_similarity_clustering_groups_close_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.95, 0.05];
        let c = vec![0.0, 1.0];
        let embeddings = vec![&a, &c, &b];
        let communities = cluster_by_similarity(&embeddings, 0.8);
        assert_eq!(communities, vec![vec![0, 2], vec![1]]);
    }

    #[tokio::test]
    async fn test_cluster_requires_content() {
        let engine = engine();
        let result = engine.cluster("similarity").await;
        assert!(matches!(result, Err(AppError::Precondition(_))));
    }

    #[tokio::test]
    async fn test_unknown_algorithm_is_rejected() {
        let engine = engine();
        engine.write_state().chunks.push(Chunk {
            document: 0,
            text: "t".to_string(),
            embedding: vec![1.0],
            entities: String::new(),
        });
        let result = engine.cluster("leiden").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_local_query_on_empty_graph_makes_no_call() {
        let engine = engine();
        let answer = engine.query("什么是 Transformer?", QueryMode::Local).await.unwrap();
        assert_eq!(answer, EMPTY_GRAPH_ANSWER);
        assert_eq!(engine.client.gate().peak_in_flight(), 0);
        assert!(engine.community_report_keys().await.unwrap().is_empty());
    }

    #[test]
    fn test_parse_entity_line() {
        assert_eq!(
            parse_entity_line("Transformer | 模型 | 基于注意力"),
            Some(("Transformer", Some("基于注意力")))
        );
        assert_eq!(parse_entity_line("BERT | 模型"), Some(("BERT", None)));
        assert_eq!(parse_entity_line("  | 模型 | x"), None);
        assert_eq!(parse_entity_line(""), None);
    }

    #[tokio::test]
    async fn test_stats_count_entities_relationships_and_communities() {
        let engine = engine();
        assert_eq!(engine.stats(), GraphStats::default());

        {
            let mut state = engine.write_state();
            state.documents = 2;
            for (document, entities) in [
                (0, "Transformer | 模型 | 基于注意力\nWMT | 数据集"),
                (1, "transformer | 模型 | BERT 的骨干\nBERT | 模型 | 预训练\n"),
            ] {
                state.chunks.push(Chunk {
                    document,
                    text: "t".to_string(),
                    embedding: vec![1.0],
                    entities: entities.to_string(),
                });
            }
        }
        engine.cluster("document").await.unwrap();

        let stats = engine.stats();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.entities, 3);
        assert_eq!(stats.relationships, 3);
        assert_eq!(stats.communities, 2);

        engine.clear().await.unwrap();
        assert_eq!(engine.stats(), GraphStats::default());
    }
}

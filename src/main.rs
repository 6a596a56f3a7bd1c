use anyhow::{Context, Result};
use paper_graph_jobs::utils::logging;
use paper_graph_jobs::{
    BuildStatus, Config, ExtractionStatus, LlmClient, LlmGraphEngine, Orchestrator, PaperDocument,
    QueryMode,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const CONFIG_FILE: &str = "config.toml";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = load_config()?;

    // 初始化日志
    logging::init(config.system.verbose_logging);
    logging::log_startup(&config);

    let client = LlmClient::new(&config.openai, &config.system).context("创建 LLM 客户端失败")?;

    info!("🔌 测试 API 连接...");
    let report = client
        .test_connection()
        .await
        .context("API 连接测试失败，请检查 OPENAI_API_KEY / OPENAI_API_BASE")?;
    info!(
        "✓ 模型 {} 响应 {:.2}s: {}",
        report.model, report.response_time_secs, report.response_preview
    );

    let engine = Arc::new(LlmGraphEngine::new(client, &config.system, &config.graph));
    let orchestrator = Orchestrator::new(config, engine);

    // ========== 抽取 ==========
    let papers = demo_papers();
    let mut task_ids = Vec::new();
    for paper in &papers {
        let task_id = orchestrator.start_extraction(&paper.id, paper)?;
        info!("📤 已提交抽取任务 {} ({})", task_id, paper.title);
        task_ids.push(task_id);
    }

    for paper in &papers {
        wait_for_extraction(&orchestrator, &paper.id).await;
    }
    for task_id in &task_ids {
        let status = orchestrator.get_task_status(task_id);
        info!("任务 {}: {:?} - {}", task_id, status.status, status.message);
    }

    // ========== 构建 ==========
    let build_task = orchestrator.start_build()?;
    info!("📤 已提交构建任务 {}", build_task);
    wait_for_build(&orchestrator).await;

    // ========== 问答 ==========
    let question = "Transformer 和 BERT 之间有什么关系？";
    for mode in [QueryMode::Local, QueryMode::Global] {
        match orchestrator.query(question, mode).await {
            Ok(answer) => info!("💬 [{}] {}", mode, answer),
            Err(e) => warn!("⚠️ [{}] 查询失败: {}", mode, e),
        }
    }

    let status = orchestrator.system_status();
    info!("📊 系统状态: {}", serde_json::to_string_pretty(&status)?);

    Ok(())
}

/// 读取配置文件（若存在），再应用环境变量覆盖
fn load_config() -> Result<Config> {
    let config = if Path::new(CONFIG_FILE).exists() {
        Config::from_toml_file(CONFIG_FILE)
            .context("读取 config.toml 失败")?
            .with_env_overrides()
    } else {
        Config::from_env()
    };
    Ok(config)
}

async fn wait_for_extraction(orchestrator: &Orchestrator, paper_id: &str) {
    let mut last_step = String::new();
    loop {
        let progress = orchestrator.get_extraction_progress(paper_id);
        if progress.current_step != last_step {
            info!(
                "[论文 {}] {} ({:.0}%)",
                paper_id,
                progress.current_step,
                progress.progress * 100.0
            );
            last_step = progress.current_step.clone();
        }

        match progress.status {
            ExtractionStatus::Completed => return,
            ExtractionStatus::Error => {
                warn!(
                    "[论文 {}] 抽取失败: {}",
                    paper_id,
                    progress.error_message.unwrap_or_default()
                );
                return;
            }
            _ => tokio::time::sleep(POLL_INTERVAL).await,
        }
    }
}

async fn wait_for_build(orchestrator: &Orchestrator) {
    let mut last_message = String::new();
    loop {
        let progress = orchestrator.get_build_progress();
        if progress.message != last_message {
            info!("[构建] {} ({:.0}%)", progress.message, progress.progress * 100.0);
            last_message = progress.message.clone();
        }

        match progress.status {
            BuildStatus::Completed | BuildStatus::Error => return,
            _ => tokio::time::sleep(POLL_INTERVAL).await,
        }
    }
}

fn demo_papers() -> Vec<PaperDocument> {
    vec![
        PaperDocument {
            id: "1706.03762".to_string(),
            title: "Attention Is All You Need".to_string(),
            authors: vec![
                "Ashish Vaswani".to_string(),
                "Noam Shazeer".to_string(),
                "Niki Parmar".to_string(),
            ],
            summary: "The dominant sequence transduction models are based on complex recurrent \
                      or convolutional neural networks. We propose a new simple network \
                      architecture, the Transformer, based solely on attention mechanisms."
                .to_string(),
            categories: vec!["cs.CL".to_string(), "cs.LG".to_string()],
            keywords: vec!["transformer".to_string(), "attention".to_string()],
            full_content: None,
        },
        PaperDocument {
            id: "1810.04805".to_string(),
            title: "BERT: Pre-training of Deep Bidirectional Transformers for Language \
                    Understanding"
                .to_string(),
            authors: vec!["Jacob Devlin".to_string(), "Ming-Wei Chang".to_string()],
            summary: "We introduce a new language representation model called BERT, designed \
                      to pre-train deep bidirectional representations from unlabeled text."
                .to_string(),
            categories: vec!["cs.CL".to_string()],
            keywords: vec!["pre-training".to_string(), "bert".to_string()],
            full_content: None,
        },
    ]
}

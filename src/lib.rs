//! # Paper Graph Jobs
//!
//! 论文知识图谱抽取与构建的异步任务编排核心
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `ConcurrencyGate` - 远程调用并发闸门，跨 runtime 共享
//! - `JobGuards` - 按论文划分的抽取锁 + 抽取工作池 + 全局构建锁
//! - `JobLauncher` - 每个任务一个线程、一个单线程 runtime
//!
//! ### ② 业务能力层（Services / Engine / Clients）
//! - `services/` - `ProgressRegistry` 进度登记、`TaskTable` 任务状态
//! - `engine/` - `GraphEngine` 图谱引擎接口及参考实现 `LlmGraphEngine`
//! - `clients/` - `LlmClient` 补全与批量 embedding
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一篇论文抽取""一次构建""一次问答"的步骤
//! - `JobCtx` - 上下文封装（task_id + paper_id）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/coordinator` - 启动前检查、任务启动、取消与轮询
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod engine;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::LlmClient;
pub use config::Config;
pub use engine::{GraphEngine, GraphStats, LlmGraphEngine};
pub use error::{AppError, AppResult, RemoteCallError};
pub use infrastructure::{ConcurrencyGate, JobOutcome};
pub use models::{
    BuildProgress, BuildStatus, ExtractionProgress, ExtractionStatus, PaperDocument, QueryMode,
    TaskState, TaskStatusRecord,
};
pub use orchestrator::{Orchestrator, SystemStatus};
pub use workflow::GLOBAL_QUERY_GUIDANCE;

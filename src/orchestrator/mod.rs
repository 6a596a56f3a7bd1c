//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层是整个系统的"指挥中心"，对外提供启动、取消和轮询接口。
//!
//! ## 模块划分
//!
//! ### `coordinator` - 任务协调器
//! - 启动前检查（参数、API Key、构建前置条件）
//! - 为每个任务生成任务ID并交给启动器
//! - 在任务边界捕获错误和 panic，写入任务状态表
//! - 持有所有任务句柄，支持取消和等待
//!
//! ## 设计原则
//!
//! 1. **立即返回**：启动接口只做检查和登记，真正的工作在后台线程上进行
//! 2. **向下依赖**：编排层 → workflow → services / engine → infrastructure
//! 3. **无业务逻辑**：步骤顺序和进度推进都在 workflow 里

pub mod coordinator;

pub use coordinator::{Orchestrator, SystemStatus};

//! 业务能力层（Services Layer）
//!
//! 只保存状态，不驱动流程：
//! - `progress_registry`：抽取 / 构建进度
//! - `task_table`：任务 ID → 状态记录

pub mod progress_registry;
pub mod task_table;

pub use progress_registry::{ExtractionUpdate, ProgressRegistry};
pub use task_table::TaskTable;

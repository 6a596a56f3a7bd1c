//! 流程层（Workflow Layer）
//!
//! 每个流程只定义"一件事"的步骤顺序和进度推进，
//! 守卫、线程和任务状态都由编排层负责。

pub mod build_flow;
pub mod extraction_flow;
pub mod job_ctx;
pub mod query_flow;

pub use build_flow::{BuildFlow, BuildStage};
pub use extraction_flow::{ExtractionFlow, ExtractionStage};
pub use job_ctx::{JobCtx, JobKind};
pub use query_flow::{QueryFlow, GLOBAL_QUERY_GUIDANCE};

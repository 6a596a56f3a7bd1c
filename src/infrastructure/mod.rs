//! 基础设施层（Infrastructure）
//!
//! 持有稀缺资源，只暴露能力，不认识论文或图谱：
//! - `gate` - 远程调用并发闸门
//! - `keyed_mutex` / `guards` - 按资源划分的互斥守卫
//! - `launcher` - 独立执行上下文中的后台任务

pub mod gate;
pub mod guards;
pub mod keyed_mutex;
pub mod launcher;

pub use gate::{ConcurrencyGate, GatePermit};
pub use guards::{BuildGuard, ExtractionGuard, JobGuards};
pub use keyed_mutex::{KeyedGuard, KeyedMutex};
pub use launcher::{JobHandle, JobLauncher, JobOutcome};

pub mod paper;
pub mod progress;
pub mod task;

pub use paper::PaperDocument;
pub use progress::{BuildProgress, BuildStatus, ExtractionProgress, ExtractionStatus};
pub use task::{QueryMode, TaskState, TaskStatusRecord};

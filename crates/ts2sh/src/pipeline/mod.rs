pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod result;
pub mod runner;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::{PipelineError, INTERRUPTED_MESSAGE};
pub use progress::{Delivery, NoopProgress, ProgressEvent, ProgressReporter, StoreProgress};
pub use result::{JobOutcome, JobResult};
pub use runner::Pipeline;

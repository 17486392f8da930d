pub mod error;
pub mod modelscope;
pub mod orchestrator;

pub use error::GenerationError;
pub use modelscope::{ModelScopeClient, TaskApi};
pub use orchestrator::{GenerationJob, ImageGenerator, JobStatus, PollSchedule};

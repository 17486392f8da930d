use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::generation::error::GenerationError;
use crate::generation::modelscope::{TaskApi, TaskStatusResponse};
use crate::utils::timing::log_service_timing;

pub const DEFAULT_POLL_ATTEMPTS: u32 = 20;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    /// Carries the first output image; `None` means the service reported
    /// success without producing anything.
    Succeeded(Option<String>),
    Failed,
    Unknown(String),
    TimedOut,
}

impl JobStatus {
    fn from_response(response: &TaskStatusResponse) -> Self {
        match response.task_status.as_str() {
            "PENDING" => JobStatus::Pending,
            "RUNNING" => JobStatus::Running,
            "SUCCEED" => JobStatus::Succeeded(
                response
                    .output_images
                    .as_ref()
                    .and_then(|images| images.first())
                    .cloned(),
            ),
            "FAILED" => JobStatus::Failed,
            other => JobStatus::Unknown(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub prompt: String,
    pub task_id: String,
    pub status: JobStatus,
    pub polls: u32,
}

impl GenerationJob {
    fn new(prompt: &str, task_id: String) -> Self {
        GenerationJob {
            prompt: prompt.to_string(),
            task_id,
            status: JobStatus::Pending,
            polls: 0,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match &self.status {
            JobStatus::Succeeded(url) => url.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        PollSchedule {
            attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl From<&Config> for PollSchedule {
    fn from(config: &Config) -> Self {
        PollSchedule {
            attempts: config.poll_attempts,
            interval: config.poll_interval,
        }
    }
}

#[derive(Clone)]
pub struct ImageGenerator {
    api: Arc<dyn TaskApi>,
    schedule: PollSchedule,
}

impl ImageGenerator {
    pub fn new(api: Arc<dyn TaskApi>, schedule: PollSchedule) -> Self {
        ImageGenerator { api, schedule }
    }

    /// Submits `prompt` and polls until the job reaches a terminal status.
    ///
    /// Only transport and HTTP failures are errors. A job that failed, came
    /// back empty, reported an unrecognized status or ran out of polls is
    /// returned with `image_url() == None`.
    pub async fn generate(&self, prompt: &str) -> Result<GenerationJob, GenerationError> {
        let model = self.api.model().to_string();
        let task_id = log_service_timing(
            "modelscope",
            &model,
            "submit",
            Some(json!({ "prompt_chars": prompt.chars().count() })),
            || self.api.submit(prompt),
        )
        .await?;
        info!(task_id = %task_id, model = %model, "Image generation task submitted");

        let mut job = GenerationJob::new(prompt, task_id);
        for _ in 0..self.schedule.attempts {
            tokio::time::sleep(self.schedule.interval).await;

            let response = self.api.task_status(&job.task_id).await?;
            job.polls += 1;
            job.status = JobStatus::from_response(&response);

            if job.status.is_terminal() {
                log_terminal_status(&job, &response);
                return Ok(job);
            }
        }

        error!(
            task_id = %job.task_id,
            polls = job.polls,
            "Image generation timed out waiting for the task"
        );
        job.status = JobStatus::TimedOut;
        Ok(job)
    }
}

fn log_terminal_status(job: &GenerationJob, response: &TaskStatusResponse) {
    let payload = serde_json::to_string(response).unwrap_or_default();
    match &job.status {
        JobStatus::Succeeded(Some(url)) => {
            info!(task_id = %job.task_id, polls = job.polls, url = %url, "Image generation succeeded");
        }
        JobStatus::Succeeded(None) => {
            warn!(
                task_id = %job.task_id,
                "Image generation succeeded but no image URL was returned: {payload}"
            );
        }
        JobStatus::Failed => {
            error!(task_id = %job.task_id, "Image generation failed: {payload}");
        }
        JobStatus::Unknown(status) => {
            warn!(task_id = %job.task_id, "Unknown task status {status:?}: {payload}");
        }
        JobStatus::Pending | JobStatus::Running | JobStatus::TimedOut => {}
    }
}

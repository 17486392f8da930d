use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the inference service. Job-level outcomes (failed,
/// empty output, unknown status, timeout) are not errors; see `JobStatus`.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} request failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("invalid {operation} response: {detail}")]
    InvalidResponse {
        operation: &'static str,
        detail: String,
    },
}

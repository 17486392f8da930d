use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::generation::error::GenerationError;

const ASYNC_MODE_HEADER: &str = "X-ModelScope-Async-Mode";
const TASK_TYPE_HEADER: &str = "X-ModelScope-Task-Type";
const IMAGE_GENERATION_TASK_TYPE: &str = "image_generation";
const GENERATIONS_PATH: &str = "v1/images/generations";
const TASKS_PATH: &str = "v1/tasks";
const ERROR_BODY_LIMIT: usize = 800;

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    task_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TaskStatusResponse {
    pub task_status: String,
    #[serde(default)]
    pub output_images: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The two calls the poller needs from an asynchronous task service.
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// Submits a job and returns the service-issued task id.
    async fn submit(&self, prompt: &str) -> Result<String, GenerationError>;

    async fn task_status(&self, task_id: &str) -> Result<TaskStatusResponse, GenerationError>;

    fn model(&self) -> &str;
}

pub struct ModelScopeClient {
    client: Client,
    base_url: Url,
    model: String,
}

impl ModelScopeClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.model_scope_api_key))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.http_timeout)
            .build()?;

        Ok(ModelScopeClient {
            client,
            base_url: config.model_scope_base_url.clone(),
            model: config.model_scope_image_model.clone(),
        })
    }

    fn endpoint(&self, operation: &'static str, path: &str) -> Result<Url, GenerationError> {
        self.base_url
            .join(path)
            .map_err(|err| GenerationError::InvalidResponse {
                operation,
                detail: format!("cannot build URL for {path}: {err}"),
            })
    }
}

/// Appends `task_id` as one percent-encoded path segment so ids cannot
/// reshape the request URL.
fn task_status_url(base_url: &Url, task_id: &str) -> Result<Url, GenerationError> {
    const OPERATION: &str = "task status";
    let task_id = task_id.trim();
    if task_id.is_empty() || task_id == "." || task_id == ".." {
        return Err(GenerationError::InvalidResponse {
            operation: OPERATION,
            detail: format!("unusable task_id {task_id:?}"),
        });
    }

    let invalid_base = || GenerationError::InvalidResponse {
        operation: OPERATION,
        detail: format!("cannot build task URL from {base_url}"),
    };
    let mut url = base_url.join(TASKS_PATH).map_err(|_| invalid_base())?;
    url.path_segments_mut()
        .map_err(|_| invalid_base())?
        .pop_if_empty()
        .push(task_id);
    Ok(url)
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

async fn ensure_success(
    operation: &'static str,
    response: Response,
) -> Result<Response, GenerationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GenerationError::Status {
        operation,
        status,
        body: truncate_for_log(&body, ERROR_BODY_LIMIT),
    })
}

#[async_trait]
impl TaskApi for ModelScopeClient {
    async fn submit(&self, prompt: &str) -> Result<String, GenerationError> {
        const OPERATION: &str = "image generation";
        let url = self.endpoint(OPERATION, GENERATIONS_PATH)?;
        debug!("Submitting image generation to {url}");

        let response = self
            .client
            .post(url)
            .header(ASYNC_MODE_HEADER, "true")
            .json(&GenerationRequest {
                model: &self.model,
                prompt,
            })
            .send()
            .await
            .map_err(|source| GenerationError::Transport {
                operation: OPERATION,
                source,
            })?;
        let response = ensure_success(OPERATION, response).await?;

        let payload: GenerationResponse =
            response
                .json()
                .await
                .map_err(|err| GenerationError::InvalidResponse {
                    operation: OPERATION,
                    detail: err.to_string(),
                })?;

        match payload.task_id {
            Some(task_id) if !task_id.trim().is_empty() => Ok(task_id),
            _ => Err(GenerationError::InvalidResponse {
                operation: OPERATION,
                detail: "missing task_id".to_string(),
            }),
        }
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatusResponse, GenerationError> {
        const OPERATION: &str = "task status";
        let url = task_status_url(&self.base_url, task_id)?;

        let response = self
            .client
            .get(url)
            .header(TASK_TYPE_HEADER, IMAGE_GENERATION_TASK_TYPE)
            .send()
            .await
            .map_err(|source| GenerationError::Transport {
                operation: OPERATION,
                source,
            })?;
        let response = ensure_success(OPERATION, response).await?;

        response
            .json()
            .await
            .map_err(|err| GenerationError::InvalidResponse {
                operation: OPERATION,
                detail: err.to_string(),
            })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_keeps_non_ascii_prompt() {
        let body = serde_json::to_string(&GenerationRequest {
            model: "m",
            prompt: "кот в шляпе",
        })
        .unwrap();
        assert_eq!(body, r#"{"model":"m","prompt":"кот в шляпе"}"#);
    }

    #[test]
    fn status_response_tolerates_missing_images() {
        let parsed: TaskStatusResponse =
            serde_json::from_value(json!({"task_status": "RUNNING", "request_id": "r1"})).unwrap();
        assert_eq!(parsed.task_status, "RUNNING");
        assert!(parsed.output_images.is_none());
        assert_eq!(parsed.extra.get("request_id"), Some(&json!("r1")));
    }

    #[test]
    fn status_response_reads_images() {
        let parsed: TaskStatusResponse = serde_json::from_value(json!({
            "task_status": "SUCCEED",
            "output_images": ["http://x/img.png"]
        }))
        .unwrap();
        assert_eq!(
            parsed.output_images.as_deref(),
            Some(&["http://x/img.png".to_string()][..])
        );
    }

    #[test]
    fn task_id_is_a_single_encoded_segment() {
        let base = Url::parse("https://example.test/api/").unwrap();

        let url = task_status_url(&base, "T1").unwrap();
        assert_eq!(url.as_str(), "https://example.test/api/v1/tasks/T1");

        let url = task_status_url(&base, "a/../b?x=1#frag").unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.test/api/v1/tasks/a%2F..%2Fb%3Fx=1%23frag"
        );
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn dot_and_empty_task_ids_are_rejected() {
        let base = Url::parse("https://example.test/").unwrap();
        for task_id in ["", "  ", ".", ".."] {
            assert!(matches!(
                task_status_url(&base, task_id),
                Err(GenerationError::InvalidResponse { .. })
            ));
        }
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(ERROR_BODY_LIMIT + 10);
        let truncated = truncate_for_log(&body, ERROR_BODY_LIMIT);
        assert!(truncated.ends_with("... (truncated)"));
        assert_eq!(truncated.chars().count(), ERROR_BODY_LIMIT + "... (truncated)".len());
    }
}

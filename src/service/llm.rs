//! Inference client for the local language-model runtime
//!
//! Sends a prompt plus the JSON schema of the expected output to an Ollama
//! server and parses the structured result. Parse failures are returned as
//! values carrying the raw model text; retries are the caller's business.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::model::{Category, InferenceConfig};

/// What an inference call is for; used for logging and routing in tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InferenceTask {
    Triage,
    Extract(Category),
    Evaluate(Category),
}

impl fmt::Display for InferenceTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceTask::Triage => f.write_str("triage"),
            InferenceTask::Extract(c) => write!(f, "extract_{}", c),
            InferenceTask::Evaluate(c) => write!(f, "evaluate_{}", c),
        }
    }
}

/// A single structured completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub task: InferenceTask,
    pub model: String,
    pub system: String,
    pub user: String,
    /// JSON schema the response must conform to
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum InferenceError {
    #[error("Inference runtime unavailable: {0}")]
    Unavailable(String),

    #[error("Model '{0}' is not available on the inference runtime")]
    UnknownModel(String),

    #[error("Model output did not match the expected schema: {reason}")]
    Parse { reason: String, raw: String },
}

/// The language-model runtime as seen by the workflow
#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    /// Names of the models the runtime can serve
    async fn list_models(&self) -> Result<Vec<String>, InferenceError>;

    /// Run one completion and return the raw response text
    async fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError>;
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// Ollama HTTP runtime (`/api/tags`, `/api/chat`)
pub struct OllamaRuntime {
    client: Client,
    base_url: Url,
    temperature: f32,
    num_ctx: u32,
}

impl OllamaRuntime {
    pub fn new(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let host = config.host.trim();
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };

        let base_url = Url::parse(&host)
            .map_err(|e| InferenceError::Unavailable(format!("Invalid OLLAMA_HOST '{}': {}", host, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| InferenceError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;

        tracing::info!(host = %base_url, "Ollama runtime configured");

        Ok(Self {
            client,
            base_url,
            temperature: config.temperature,
            num_ctx: config.num_ctx,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, InferenceError> {
        self.base_url
            .join(path)
            .map_err(|e| InferenceError::Unavailable(format!("Invalid endpoint {}: {}", path, e)))
    }
}

#[async_trait]
impl InferenceRuntime for OllamaRuntime {
    async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let url = self.endpoint("/api/tags")?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| InferenceError::Unavailable(format!("Failed to reach {}: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Unavailable(format!(
                "Unexpected status {} from {}: {}",
                status, url, body
            )));
        }

        let tags: TagsResponse = response.json().await.map_err(|e| {
            InferenceError::Unavailable(format!("Failed to deserialize model list: {}", e))
        })?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError> {
        let url = self.endpoint("/api/chat")?;

        let body = serde_json::json!({
            "model": request.model,
            "stream": false,
            "format": request.schema,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "options": {
                "temperature": self.temperature,
                "num_ctx": self.num_ctx,
            }
        });

        let response = self
            .client
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::Unavailable(format!("Failed to reach {}: {}", url, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(InferenceError::UnknownModel(request.model.clone()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(InferenceError::Unavailable(format!(
                "Unexpected status {} from {}: {}",
                status, url, text
            )));
        }

        // The envelope is the runtime's; a malformed one means the runtime misbehaved
        let chat: ChatResponse = response.json().await.map_err(|e| {
            InferenceError::Unavailable(format!("Failed to deserialize chat response: {}", e))
        })?;

        Ok(chat.message.content)
    }
}

/// Shared inference client
///
/// Stateless apart from the runtime handle; cloned freely into every session.
#[derive(Clone)]
pub struct InferenceClient {
    runtime: Arc<dyn InferenceRuntime>,
}

impl InferenceClient {
    pub fn new(runtime: Arc<dyn InferenceRuntime>) -> Self {
        Self { runtime }
    }

    pub async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        self.runtime.list_models().await
    }

    /// Fail with `UnknownModel` unless the runtime advertises `model`
    pub async fn ensure_model(&self, model: &str) -> Result<(), InferenceError> {
        let models = self.list_models().await?;
        if models.iter().any(|m| model_matches(m, model)) {
            Ok(())
        } else {
            tracing::warn!(model = %model, available = ?models, "Requested model is not advertised");
            Err(InferenceError::UnknownModel(model.to_string()))
        }
    }

    /// Run a completion and parse it into `T`
    pub async fn invoke<T>(
        &self,
        task: InferenceTask,
        model: &str,
        system: &str,
        user: String,
    ) -> Result<T, InferenceError>
    where
        T: JsonSchema + DeserializeOwned,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T))
            .map_err(|e| InferenceError::Unavailable(format!("Failed to encode schema: {}", e)))?;

        let request = CompletionRequest {
            task,
            model: model.to_string(),
            system: system.to_string(),
            user,
            schema,
        };

        tracing::debug!(
            task = %task,
            model = %model,
            prompt_length = request.system.len() + request.user.len(),
            "Initiating inference call"
        );

        let start_time = std::time::Instant::now();

        let raw = match self.runtime.complete(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(
                    task = %task,
                    model = %model,
                    elapsed_ms = start_time.elapsed().as_millis(),
                    error = %e,
                    "Inference call failed"
                );
                return Err(e);
            }
        };

        let parsed = parse_structured::<T>(&raw);

        match &parsed {
            Ok(_) => tracing::info!(
                task = %task,
                model = %model,
                elapsed_ms = start_time.elapsed().as_millis(),
                response_length = raw.len(),
                "Inference call completed"
            ),
            Err(e) => tracing::warn!(
                task = %task,
                model = %model,
                elapsed_ms = start_time.elapsed().as_millis(),
                error = %e,
                raw_preview = raw.chars().take(200).collect::<String>(),
                "Inference output did not parse"
            ),
        }

        parsed
    }
}

/// Ollama reports `name:tag`; an untagged request means `:latest`
fn model_matches(advertised: &str, requested: &str) -> bool {
    advertised == requested
        || (!requested.contains(':') && advertised == format!("{}:latest", requested))
}

/// Parse model output into `T`, tolerating a surrounding markdown code fence
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, InferenceError> {
    let body = strip_code_fence(raw);
    serde_json::from_str(body).map_err(|e| InferenceError::Parse {
        reason: e.to_string(),
        raw: raw.to_string(),
    })
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

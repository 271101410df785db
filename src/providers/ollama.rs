//! Ollama client for single-prompt completions.
//!
//! Talks to a local or remote Ollama server via `POST /api/generate` with
//! streaming disabled. See: <https://github.com/ollama/ollama/blob/main/docs/api.md>
//!
//! Model ids may carry a provider prefix (`ollama/mistral`). The prefix is
//! stripped on the wire, but the full id remains this client's
//! [`model()`](ModelClient::model) and therefore the cache namespace.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::traits::{ModelClient, ResponseText};
use crate::config::ModelSettings;
use crate::{HuginnError, Result};

/// Default base URL of a local Ollama server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

const MODEL_PREFIX: &str = "ollama/";

/// A model response, or a response rebuilt from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Model name reported by the server. `None` for cached responses.
    pub model: Option<String>,
    /// Tokens generated, when the server reports it.
    pub eval_count: Option<u32>,
    /// Whether this came from the prompt cache rather than the model.
    pub cached: bool,
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl ResponseText for Completion {
    fn to_text(&self) -> String {
        self.text.clone()
    }

    fn from_cached(text: String) -> Self {
        Self {
            text,
            model: None,
            eval_count: None,
            cached: true,
        }
    }
}

/// Client for the Ollama generate API.
#[derive(Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
    temperature: f64,
    timeout: Duration,
}

impl OllamaClient {
    /// Create a client for `model` on the default local server.
    pub fn new(model: impl Into<String>, temperature: f64) -> Self {
        Self {
            http: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            temperature,
            timeout: Duration::from_secs(120),
        }
    }

    /// Create a client from the `[model]` config section.
    pub fn from_settings(settings: &ModelSettings) -> Self {
        Self::new(settings.model.clone(), settings.temperature)
            .base_url(settings.base_url.clone())
            .timeout(Duration::from_secs(settings.timeout_secs))
    }

    /// Point at a different server (also used for testing with wiremock).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share an existing HTTP client (connection pool).
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    /// Model name as Ollama knows it.
    fn wire_model(&self) -> &str {
        self.model.strip_prefix(MODEL_PREFIX).unwrap_or(&self.model)
    }

    /// Map a non-success response to an error.
    async fn status_error(&self, response: reqwest::Response) -> HuginnError {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);

        match status {
            401 | 403 => HuginnError::AuthenticationFailed,
            404 => HuginnError::ModelNotFound(self.model.clone()),
            429 => HuginnError::RateLimited { retry_after },
            _ => HuginnError::Api { status, message },
        }
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    type Output = Completion;

    fn model(&self) -> &str {
        &self.model
    }

    fn temperature(&self) -> f64 {
        self.temperature
    }

    async fn call(&self, prompt: &str) -> Result<Completion> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(&GenerateRequest {
                model: self.wire_model(),
                prompt,
                stream: false,
                options: GenerateParameters {
                    temperature: self.temperature,
                },
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.status_error(response).await);
        }

        let body: GenerateResponseBody = response.json().await?;
        let text = body
            .response
            .filter(|t| !t.trim().is_empty())
            .ok_or(HuginnError::EmptyResponse)?;

        Ok(Completion {
            text,
            model: body.model,
            eval_count: body.eval_count,
            cached: false,
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateParameters,
}

#[derive(Serialize)]
struct GenerateParameters {
    temperature: f64,
}

#[derive(Deserialize)]
struct GenerateResponseBody {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

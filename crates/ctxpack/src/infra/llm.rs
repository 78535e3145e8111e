//! Completion requests against hosted language-model providers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::errors::OptimizeError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Body of a legacy `/v1/completions` style request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

/// Transport for completion requests; returns the first choice's text.
pub trait CompletionClient {
    fn complete(
        &self,
        endpoint: &str,
        api_key: &str,
        request: &CompletionRequest,
    ) -> Result<String, OptimizeError>;
}

/// Blocking HTTP client. No retries.
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    client: reqwest::blocking::Client,
}

impl HttpCompletionClient {
    pub fn new() -> Result<Self, OptimizeError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| OptimizeError::Transport {
                endpoint: String::from("<client>"),
                message: err.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl CompletionClient for HttpCompletionClient {
    fn complete(
        &self,
        endpoint: &str,
        api_key: &str,
        request: &CompletionRequest,
    ) -> Result<String, OptimizeError> {
        let transport = |message: String| OptimizeError::Transport {
            endpoint: endpoint.to_owned(),
            message,
        };

        tracing::debug!(endpoint, model = %request.model, "sending completion request");
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .map_err(|err| transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(transport(format!("status {status}: {}", body.trim())));
        }

        let parsed: CompletionResponse = response
            .json()
            .map_err(|err| OptimizeError::InvalidResponse(err.to_string()))?;
        parse_first_choice(parsed)
    }
}

fn parse_first_choice(response: CompletionResponse) -> Result<String, OptimizeError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.text.trim().to_owned())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| OptimizeError::InvalidResponse("response contained no completion text".into()))
}

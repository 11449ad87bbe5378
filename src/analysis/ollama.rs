use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{AnalysisService, ServiceError};
use crate::config::{AnalysisConfig, GenerationOptions};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerationOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<String>,
}

/// Downloading a model takes far longer than a generate call.
const PULL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    model: Option<String>,
}

/// Local Ollama-compatible endpoint reached over HTTP
pub struct OllamaService {
    client: Client,
    base_url: String,
    model: String,
    options: GenerationOptions,
}

impl OllamaService {
    pub fn new(config: &AnalysisConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ServiceError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            options: config.generation,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Names of the models installed on the service.
    pub fn list_models(&self) -> Result<Vec<String>, ServiceError> {
        let url = format!("{}/api/tags", self.base_url);
        debug!("Fetching installed models from: {}", url);
        let response = self.client.get(&url).send().map_err(map_transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body = response.text().map_err(map_transport)?;
        parse_model_names(&body)
    }

    /// True when the configured model is installed; failures to ask count as unavailable.
    pub fn check_model_availability(&self) -> bool {
        match self.list_models() {
            Ok(models) if models.iter().any(|name| name == &self.model) => {
                info!(model = %self.model, "analysis model available");
                true
            }
            Ok(models) => {
                warn!(model = %self.model, available = ?models, "analysis model not installed");
                false
            }
            Err(err) => {
                warn!(error = %err, "could not query installed models");
                false
            }
        }
    }

    /// Ask the service to download the configured model and wait for it to finish.
    pub fn pull_model(&self) -> Result<(), ServiceError> {
        let url = format!("{}/api/pull", self.base_url);
        info!(model = %self.model, "pulling analysis model");
        let request = PullRequest {
            model: &self.model,
            stream: false,
        };
        let response = self
            .client
            .post(&url)
            .timeout(PULL_TIMEOUT)
            .json(&request)
            .send()
            .map_err(map_transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body = response.text().map_err(map_transport)?;
        parse_pull_body(&body)
    }

    /// Check for the model, pulling it once when missing; true when it is usable afterwards.
    pub fn ensure_model_loaded(&self) -> bool {
        if self.check_model_availability() {
            return true;
        }
        if let Err(err) = self.pull_model() {
            warn!(model = %self.model, error = %err, "failed to pull analysis model");
            return false;
        }
        self.check_model_availability()
    }
}

impl AnalysisService for OllamaService {
    fn analyze(&self, prompt: &str) -> Result<String, ServiceError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
            options: self.options,
        };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .map_err(map_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body = response.text().map_err(map_transport)?;
        parse_generate_body(&body)
    }
}

fn map_transport(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout
    } else {
        ServiceError::Transport(err.to_string())
    }
}

fn parse_generate_body(body: &str) -> Result<String, ServiceError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| ServiceError::Envelope(e.to_string()))?;
    Ok(parsed.response)
}

fn parse_pull_body(body: &str) -> Result<(), ServiceError> {
    let parsed: PullResponse =
        serde_json::from_str(body).map_err(|e| ServiceError::Envelope(e.to_string()))?;
    if let Some(error) = parsed.error {
        return Err(ServiceError::Envelope(error));
    }
    if parsed.status != "success" {
        return Err(ServiceError::Envelope(format!(
            "pull finished with status '{}'",
            parsed.status
        )));
    }
    Ok(())
}

fn parse_model_names(body: &str) -> Result<Vec<String>, ServiceError> {
    let parsed: TagsResponse =
        serde_json::from_str(body).map_err(|e| ServiceError::Envelope(e.to_string()))?;
    Ok(parsed
        .models
        .into_iter()
        .map(|entry| entry.model.unwrap_or(entry.name))
        .collect())
}

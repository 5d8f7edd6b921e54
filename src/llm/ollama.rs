use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::prompt::{build_prompt, clean_response};
use super::InsightRequester;
use crate::models::Task;

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Insight backed by an Ollama-compatible `/api/generate` endpoint.
pub struct OllamaInsight {
    client: Client,
    base_url: String,
    model_name: String,
}

impl OllamaInsight {
    pub fn new(base_url: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model_name: model_name.into(),
        }
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl InsightRequester for OllamaInsight {
    async fn request_insight(&self, history: &[Task]) -> Result<String> {
        let request = OllamaRequest {
            model: self.model_name.clone(),
            prompt: build_prompt(history),
            stream: false,
        };

        log::debug!("Requesting insight from {} ({})", self.base_url, self.model_name);
        let response = self
            .client
            .post(self.generate_url())
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?
            .error_for_status()
            .context("Ollama rejected the request")?;

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        let insight = clean_response(&ollama_response.response);
        anyhow::ensure!(!insight.is_empty(), "Ollama returned an empty insight");
        Ok(insight)
    }
}

// src/text_gen.rs

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::InferenceConfig;
use crate::errors::GenerationError;

/// A hosted model that completes a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    max_new_tokens: u32,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct Generated {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    Batch(Vec<Generated>),
    Single(Generated),
    Error { error: String },
}

/// Hugging Face inference API text-generation backend.
pub struct HfTextGenerator {
    client: Client,
    url: String,
    api_token: Option<String>,
    max_new_tokens: u32,
}

impl HfTextGenerator {
    pub fn from_config(cfg: &InferenceConfig) -> Self {
        let api_token = std::env::var("HUGGINGFACE_API_TOKEN").ok();
        if api_token.is_none() {
            warn!("HUGGINGFACE_API_TOKEN not set, calling inference API anonymously");
        }
        let url = format!("{}/{}", cfg.base_url.trim_end_matches('/'), cfg.model);
        info!(url = %url, model = %cfg.model, "Using hosted text-generation backend");
        Self {
            client: Client::new(),
            url,
            api_token,
            max_new_tokens: cfg.max_new_tokens,
        }
    }
}

#[async_trait]
impl TextGenerator for HfTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = GenerationRequest {
            inputs: prompt,
            parameters: GenerationParameters {
                max_new_tokens: self.max_new_tokens,
                return_full_text: false,
            },
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(token) = &self.api_token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Backend(format!("inference API error {status}: {body}")));
        }

        match response.json::<GenerationResponse>().await? {
            GenerationResponse::Batch(mut batch) if !batch.is_empty() => Ok(batch.swap_remove(0).generated_text),
            GenerationResponse::Batch(_) => Err(GenerationError::Backend("empty generation batch".to_string())),
            GenerationResponse::Single(one) => Ok(one.generated_text),
            GenerationResponse::Error { error } => Err(GenerationError::Backend(error)),
        }
    }
}

// src/ai_client.rs

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::errors::ExtractError;
use crate::line_item::LineItemDraft;

/// Turns freeform shipping cost text into partial line items.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, raw_text: &str) -> Result<Vec<LineItemDraft>, ExtractError>;
}

#[derive(Debug, Serialize)]
struct ParseRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Vec<LineItemDraft>>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the `/api/parse-ai` endpoint. No timeout is set here; any
/// timeout comes from the transport.
#[derive(Clone)]
pub struct ExtractionClient {
    client: Client,
    endpoint: String,
}

impl ExtractionClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Liveness check: a GET is acknowledged without running extraction.
    pub async fn ping(&self) -> Result<String, ExtractError> {
        let response = self.client.get(&self.endpoint).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ExtractError::Rejected {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl Extractor for ExtractionClient {
    async fn extract(&self, raw_text: &str) -> Result<Vec<LineItemDraft>, ExtractError> {
        let input = raw_text.trim();
        if input.is_empty() {
            return Err(ExtractError::EmptyInput);
        }

        debug!(url = %self.endpoint, chars = input.len(), "Sending text for extraction");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ParseRequest { input })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: ParseResponse = serde_json::from_str(&body)
            .map_err(|e| ExtractError::Malformed(format!("{e}; body: {body}")))?;

        if !status.is_success() || !parsed.success {
            return Err(ExtractError::Rejected {
                status: status.as_u16(),
                message: parsed
                    .error
                    .unwrap_or_else(|| "Unknown error from AI service".to_string()),
            });
        }

        let items = parsed
            .data
            .ok_or_else(|| ExtractError::Malformed("response has no data array".to_string()))?;
        info!(items = items.len(), "Extraction succeeded");
        Ok(items)
    }
}

const MIN_PING_PERIOD: Duration = Duration::from_secs(1);

/// Ping the endpoint forever so the hosted function stays warm. Periods
/// below one second are raised to one second.
pub async fn keep_warm(client: &ExtractionClient, every: Duration) {
    let mut ticker = tokio::time::interval(every.max(MIN_PING_PERIOD));
    loop {
        ticker.tick().await;
        match client.ping().await {
            Ok(reply) => info!(url = %client.endpoint(), reply = %reply.trim(), "Keep-warm ping"),
            Err(e) => warn!(url = %client.endpoint(), error = %e, "Keep-warm ping failed"),
        }
    }
}

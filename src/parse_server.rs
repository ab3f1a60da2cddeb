// src/parse_server.rs

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{Instrument, error, info};

use crate::config::ServerConfig;
use crate::errors::GenerationError;
use crate::text_gen::TextGenerator;

pub const PARSE_ROUTE: &str = "/api/parse-ai";

const PONG: &str = "Pong! Keep-warm ping successful.";

/// Instruction wrapped around the user's text.
const SYSTEM_PROMPT: &str = r#"You are an expert data extraction assistant for a logistics company. Your task is to parse shipping cost text and convert it into a structured JSON array. Each object must have "item", "cost", "measurement", and "amount". Default "amount" to "1" if not specified. Default "measurement" to "/ITEM" if not found. Provide ONLY a valid JSON object as output with a single key "data" containing the array of items."#;

#[derive(Debug, Deserialize)]
struct ParseInput {
    #[serde(default)]
    input: String,
}

/// Body returned by the endpoint.
#[derive(Debug, Serialize)]
pub struct ParseReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedPayload {
    #[serde(default)]
    data: Option<serde_json::Value>,
}

pub fn build_prompt(input: &str) -> String {
    format!("[INST] <<SYS>>\n{SYSTEM_PROMPT}\n<</SYS>>\nTEXT TO PARSE:\n{input} [/INST]")
}

/// Extract the outermost JSON object from generated text that may carry
/// chatter before or after it.
pub fn extract_json_object(s: &str) -> Result<&str, GenerationError> {
    let start = s.find('{').ok_or(GenerationError::NoJsonObject)?;
    let end = s.rfind('}').ok_or(GenerationError::NoJsonObject)?;
    if end <= start {
        return Err(GenerationError::NoJsonObject);
    }
    Ok(&s[start..=end])
}

pub fn router(generator: Arc<dyn TextGenerator>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(PARSE_ROUTE, get(keep_warm).post(parse_ai))
        .with_state(generator)
}

pub async fn health_check() -> &'static str {
    "OK"
}

/// GET is a keep-warm ping, not an extraction.
async fn keep_warm() -> &'static str {
    PONG
}

async fn parse_ai(State(generator): State<Arc<dyn TextGenerator>>, body: Bytes) -> Response {
    match run_extraction(generator.as_ref(), &body).await {
        Ok(data) => {
            let reply = ParseReply {
                success: true,
                data,
                error: None,
            };
            (StatusCode::OK, Json(reply)).into_response()
        }
        Err(e) => {
            error!(error = %e, "AI extraction failed");
            let reply = ParseReply {
                success: false,
                data: None,
                error: Some(e.to_string()),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(reply)).into_response()
        }
    }
}

async fn run_extraction(
    generator: &dyn TextGenerator,
    body: &[u8],
) -> Result<Option<serde_json::Value>, GenerationError> {
    let ParseInput { input } = serde_json::from_slice(body)?;
    let span = tracing::info_span!("parse_ai", chars = input.len());

    let generated = generator
        .generate(&build_prompt(&input))
        .instrument(span.clone())
        .await?;
    let _guard = span.enter();
    let json_str = extract_json_object(&generated)?;
    let payload: GeneratedPayload = serde_json::from_str(json_str)?;
    info!(
        items = payload.data.as_ref().and_then(|d| d.as_array()).map(Vec::len),
        "Model output parsed"
    );
    Ok(payload.data)
}

pub async fn serve(cfg: &ServerConfig, generator: Arc<dyn TextGenerator>) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(generator);
    let addr = format!("{}:{}", cfg.host, cfg.port);
    info!("Server listening on {}", addr);
    info!("  GET  {PARSE_ROUTE}  - keep-warm ping");
    info!("  POST {PARSE_ROUTE}  - extract line items");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

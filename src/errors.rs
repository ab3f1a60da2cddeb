use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("No row with id {0}")]
    UnknownRow(u64),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Nothing to extract")]
    EmptyInput,
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Extraction service returned {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("Malformed extraction payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Text generation failed: {0}")]
    Backend(String),
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("AI did not return a valid JSON object.")]
    NoJsonObject,
    #[error("Invalid JSON in model output: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Please select an image file!")]
    NotAnImage,
    #[error("Please wait, OCR engine is still initializing.")]
    NotReady,
    #[error("Could not initialize OCR engine. {0}")]
    EngineFailed(String),
    #[error("OCR processing failed: {0}")]
    Recognition(String),
    #[error("No OCR result to send! Process an image first.")]
    EmptyResult,
    #[error("Cannot find main application window!")]
    OpenerGone,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No data to export!")]
    NoData,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

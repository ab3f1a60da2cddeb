// src/ocr.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Instrument, error, info, warn};

use crate::config::OcrConfig;
use crate::errors::OcrError;
use crate::notice::Notice;

/// Message posted from the OCR context back to the window that opened it.
/// Serializes as `{"type":"OCR_RESULT","text":...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    #[serde(rename = "OCR_RESULT")]
    OcrResult { text: String },
}

/// A recognition backend. `initialize` runs once when the context opens.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn initialize(&self) -> Result<(), OcrError>;

    async fn recognize(&self, image: &[u8], progress: &(dyn Fn(u8) + Sync)) -> Result<String, OcrError>;
}

/// A user-supplied image.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageInput {
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, OcrError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self {
            mime: guess_mime(path).to_string(),
            bytes,
        })
    }
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineStatus {
    Initializing,
    Ready,
    /// Terminal for this context.
    Failed(String),
}

/// The secondary OCR context: owns the engine, the preview and the result
/// field, and holds the one-shot channel back to its opener.
pub struct OcrWindow {
    engine: Arc<dyn OcrEngine>,
    status: watch::Receiver<EngineStatus>,
    notices: mpsc::UnboundedSender<Notice>,
    opener: Option<oneshot::Sender<BridgeMessage>>,
    preview: Option<ImageInput>,
    result: String,
    close_delay: Duration,
    closed: bool,
}

impl OcrWindow {
    /// Open the context and start engine initialization in the background.
    /// Progress and status lines arrive on the returned receiver.
    pub fn open(
        engine: Arc<dyn OcrEngine>,
        opener: oneshot::Sender<BridgeMessage>,
        close_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (notices, notice_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(EngineStatus::Initializing);

        let init_engine = engine.clone();
        let init_notices = notices.clone();
        tokio::spawn(async move {
            let _ = init_notices.send(Notice::info("Initializing OCR engine... (this may take a moment)"));
            match init_engine.initialize().await {
                Ok(()) => {
                    info!("OCR engine ready");
                    let _ = status_tx.send(EngineStatus::Ready);
                    let _ = init_notices.send(Notice::success("OCR engine ready! You can now upload an image."));
                }
                Err(e) => {
                    error!(error = %e, "Error initializing OCR engine");
                    let _ = init_notices.send(Notice::error(format!("Fatal Error: {e}")));
                    let reason = match e {
                        OcrError::EngineFailed(reason) => reason,
                        other => other.to_string(),
                    };
                    let _ = status_tx.send(EngineStatus::Failed(reason));
                }
            }
        });

        let window = Self {
            engine,
            status,
            notices,
            opener: Some(opener),
            preview: None,
            result: String::new(),
            close_delay,
            closed: false,
        };
        (window, notice_rx)
    }

    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    /// Wait for initialization to settle one way or the other.
    pub async fn wait_until_ready(&mut self) -> Result<(), OcrError> {
        let settled = self
            .status
            .wait_for(|s| *s != EngineStatus::Initializing)
            .await
            .map(|s| s.clone())
            .unwrap_or_else(|_| EngineStatus::Failed("initialization task ended".to_string()));
        match settled {
            EngineStatus::Failed(msg) => Err(OcrError::EngineFailed(msg)),
            _ => Ok(()),
        }
    }

    /// Run recognition on one image. Refused while the engine is still
    /// initializing; a failed recognition leaves the context usable.
    pub async fn recognize(&mut self, image: ImageInput) -> Result<&str, OcrError> {
        if !image.mime.starts_with("image/") {
            return Err(OcrError::NotAnImage);
        }
        match self.status() {
            EngineStatus::Initializing => return Err(OcrError::NotReady),
            EngineStatus::Failed(msg) => return Err(OcrError::EngineFailed(msg)),
            EngineStatus::Ready => {}
        }

        self.result.clear();
        let span = tracing::info_span!("ocr", mime = %image.mime, bytes = image.bytes.len());

        let notices = self.notices.clone();
        let progress = move |pct: u8| {
            let _ = notices.send(Notice::info(format!("Processing OCR... {pct}%")));
        };
        let outcome = self
            .engine
            .recognize(&image.bytes, &progress)
            .instrument(span)
            .await;
        self.preview = Some(image);

        match outcome {
            Ok(text) => {
                info!(chars = text.len(), "OCR processing completed");
                self.result = text;
                let _ = self.notices.send(Notice::success("OCR processing completed!"));
                Ok(&self.result)
            }
            Err(e @ OcrError::Recognition(_)) => {
                warn!(error = %e, "OCR error");
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "OCR error");
                Err(OcrError::Recognition(e.to_string()))
            }
        }
    }

    pub fn result(&self) -> &str {
        &self.result
    }

    /// Manual edit of the result field.
    pub fn set_result(&mut self, text: impl Into<String>) {
        self.result = text.into();
    }

    pub fn preview(&self) -> Option<&ImageInput> {
        self.preview.as_ref()
    }

    pub fn clear(&mut self) {
        self.preview = None;
        self.result.clear();
        let _ = self.notices.send(Notice::success("All cleared!"));
    }

    /// Post the result to the opener, then close after the configured delay.
    pub async fn send_result(&mut self) -> Result<(), OcrError> {
        let text = self.result.trim();
        if text.is_empty() {
            return Err(OcrError::EmptyResult);
        }
        let opener = self.opener.take().ok_or(OcrError::OpenerGone)?;
        opener
            .send(BridgeMessage::OcrResult {
                text: text.to_string(),
            })
            .map_err(|_| OcrError::OpenerGone)?;

        let _ = self
            .notices
            .send(Notice::success("Text sent successfully! This window will close shortly."));
        tokio::time::sleep(self.close_delay).await;
        self.closed = true;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Tesseract command-line engine, fed through stdin/stdout.
pub struct TesseractEngine {
    binary: String,
    language: String,
}

impl TesseractEngine {
    pub fn from_config(cfg: &OcrConfig) -> Self {
        Self {
            binary: cfg.tesseract_bin.clone(),
            language: cfg.language.clone(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn initialize(&self) -> Result<(), OcrError> {
        let output = Command::new(&self.binary)
            .arg("--list-langs")
            .output()
            .await
            .map_err(|e| OcrError::EngineFailed(format!("{}: {e}", self.binary)))?;
        if !output.status.success() {
            return Err(OcrError::EngineFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        // Recent versions list languages on stdout, older ones on stderr.
        let listing = [output.stdout.as_slice(), output.stderr.as_slice()].concat();
        let listing = String::from_utf8_lossy(&listing);
        if !listing.lines().any(|l| l.trim() == self.language) {
            return Err(OcrError::EngineFailed(format!(
                "language model '{}' is not installed",
                self.language
            )));
        }
        info!(binary = %self.binary, language = %self.language, "Tesseract available");
        Ok(())
    }

    async fn recognize(&self, image: &[u8], progress: &(dyn Fn(u8) + Sync)) -> Result<String, OcrError> {
        progress(0);
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", &self.language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OcrError::Recognition(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            let bytes = image.to_vec();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&bytes).await {
                    warn!(error = %e, "Failed to feed image to tesseract");
                }
            });
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| OcrError::Recognition(e.to_string()))?;
        if !output.status.success() {
            return Err(OcrError::Recognition(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        progress(100);
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// src/session.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Instrument, error, info, warn};

use crate::ai_client::Extractor;
use crate::errors::{ExportError, TableError};
use crate::export;
use crate::line_item::{LineItem, LineItemDraft};
use crate::notice::Notice;
use crate::ocr::{BridgeMessage, OcrEngine, OcrWindow};
use crate::table::{Confirm, Field, RowId, ShipmentTable};

const AI_FAILURE: &str = "AI parsing failed. This is likely due to a timeout. Please try again in a moment.";

/// State of the control that triggers extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub enabled: bool,
    pub label: &'static str,
}

impl ControlState {
    pub const IDLE: ControlState = ControlState {
        enabled: true,
        label: "Parse with AI",
    };
    pub const BUSY: ControlState = ControlState {
        enabled: false,
        label: "Processing...",
    };
}

/// Holds the control in its busy state; dropping it restores the idle state,
/// whether the request finished, failed or was abandoned.
struct BusyControl<'a>(&'a watch::Sender<ControlState>);

impl<'a> BusyControl<'a> {
    fn engage(control: &'a watch::Sender<ControlState>) -> Self {
        control.send_replace(ControlState::BUSY);
        Self(control)
    }
}

impl Drop for BusyControl<'_> {
    fn drop(&mut self) {
        self.0.send_replace(ControlState::IDLE);
    }
}

/// The primary surface: raw-input staging field, the table, the extraction
/// control and the inbox for OCR results.
pub struct Session {
    table: ShipmentTable,
    raw_input: String,
    extractor: Arc<dyn Extractor>,
    parse_control: watch::Sender<ControlState>,
    ocr_inbox: Option<oneshot::Receiver<BridgeMessage>>,
}

impl Session {
    pub fn new(table: ShipmentTable, extractor: Arc<dyn Extractor>) -> Self {
        let (parse_control, _) = watch::channel(ControlState::IDLE);
        Self {
            table,
            raw_input: String::new(),
            extractor,
            parse_control,
            ocr_inbox: None,
        }
    }

    /// Restore persisted rows; grand totals are rebuilt from them.
    pub fn load(&mut self) -> usize {
        self.table.restore()
    }

    pub fn table(&self) -> &ShipmentTable {
        &self.table
    }

    pub fn raw_input(&self) -> &str {
        &self.raw_input
    }

    pub fn set_raw_input(&mut self, text: impl Into<String>) {
        self.raw_input = text.into();
    }

    pub fn clear_input(&mut self) -> Notice {
        self.raw_input.clear();
        Notice::success("Input cleared!")
    }

    pub fn parse_control(&self) -> watch::Receiver<ControlState> {
        self.parse_control.subscribe()
    }

    pub fn add_row(&mut self, draft: LineItemDraft) -> RowId {
        self.table.add_row(draft)
    }

    pub fn edit(&mut self, id: RowId, field: Field, value: &str) -> Result<LineItem, TableError> {
        self.table.set_field(id, field, value).cloned()
    }

    pub fn delete_row(&mut self, id: RowId, confirm: &dyn Confirm) -> Result<bool, TableError> {
        self.table.delete_row(id, confirm)
    }

    /// Drop every row, the staged input and the stored copy, once confirmed.
    pub fn clear_all(&mut self, confirm: &dyn Confirm) -> Option<Notice> {
        if !self.table.clear_all(confirm) {
            return None;
        }
        self.raw_input.clear();
        Some(Notice::success("All data cleared!"))
    }

    /// Send the staged text for extraction and replace the table with the
    /// result. On failure the table is left untouched.
    pub async fn parse_with_ai(&mut self) -> Notice {
        let input = self.raw_input.trim().to_string();
        if input.is_empty() {
            return Notice::error("Please paste data from email first!");
        }

        let _busy = BusyControl::engage(&self.parse_control);
        let span = tracing::info_span!("parse_with_ai", chars = input.len());
        let outcome = self.extractor.extract(&input).instrument(span).await;

        let items = match outcome {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "AI Parsing Error");
                return Notice::error(AI_FAILURE);
            }
        };

        self.table.clear_table();
        if items.is_empty() {
            self.table.persist();
            warn!("Extraction returned no items");
            return Notice::error("AI did not find any items to parse.");
        }

        let count = items.len();
        for item in items {
            self.table.add_row(item);
        }
        self.table.recompute_grand_totals();
        self.table.persist();
        info!(items = count, "Table replaced with extracted items");
        Notice::success(format!("Successfully parsed {count} items with AI!"))
    }

    pub fn export(&self, dir: impl AsRef<Path>, prefix: &str) -> (Notice, Option<PathBuf>) {
        match export::export_to_dir(&self.table, dir, prefix) {
            Ok(path) => (Notice::success("Data exported successfully!"), Some(path)),
            Err(ExportError::NoData) => (Notice::error("No data to export!"), None),
            Err(e) => {
                error!(error = %e, "Export failed");
                (Notice::error(format!("Export failed: {e}")), None)
            }
        }
    }

    /// Open the OCR context. Its result comes back through this session's
    /// inbox; a newer context replaces any earlier one.
    pub fn open_ocr(
        &mut self,
        engine: Arc<dyn OcrEngine>,
        close_delay: Duration,
    ) -> (OcrWindow, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = oneshot::channel();
        self.ocr_inbox = Some(rx);
        OcrWindow::open(engine, tx, close_delay)
    }

    /// Pick up an OCR result if one has arrived.
    pub fn poll_ocr(&mut self) -> Option<Notice> {
        let inbox = self.ocr_inbox.as_mut()?;
        match inbox.try_recv() {
            Ok(message) => {
                self.ocr_inbox = None;
                Some(self.receive(message))
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.ocr_inbox = None;
                None
            }
        }
    }

    pub fn receive(&mut self, message: BridgeMessage) -> Notice {
        match message {
            BridgeMessage::OcrResult { text } => {
                info!(chars = text.len(), "OCR result received");
                self.raw_input = text;
                Notice::success("OCR text successfully imported!")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ExtractError, OcrError};
    use crate::line_item::{CurrencyBucket, RowStatus};
    use crate::store::{LineItemStore, SqliteStore};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeExtractor {
        reply: Mutex<Option<Result<Vec<LineItemDraft>, ExtractError>>>,
        seen_control: Mutex<Option<ControlState>>,
        control: Mutex<Option<watch::Receiver<ControlState>>>,
    }

    impl FakeExtractor {
        fn replying(reply: Result<Vec<LineItemDraft>, ExtractError>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(reply)),
                seen_control: Mutex::new(None),
                control: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Extractor for FakeExtractor {
        async fn extract(&self, _raw_text: &str) -> Result<Vec<LineItemDraft>, ExtractError> {
            if let Some(rx) = self.control.lock().unwrap().as_ref() {
                *self.seen_control.lock().unwrap() = Some(*rx.borrow());
            }
            self.reply.lock().unwrap().take().unwrap_or(Err(ExtractError::EmptyInput))
        }
    }

    fn draft(item: &str, cost: &str, measurement: &str, amount: &str) -> LineItemDraft {
        LineItemDraft {
            item: Some(item.to_string()),
            amount: Some(amount.to_string()),
            cost: Some(cost.to_string()),
            measurement: Some(measurement.to_string()),
            ..Default::default()
        }
    }

    fn session(extractor: Arc<dyn Extractor>) -> Session {
        let store = SqliteStore::in_memory("shipmentData").unwrap();
        Session::new(ShipmentTable::new(Box::new(store)), extractor)
    }

    #[tokio::test]
    async fn test_paste_parse_scenario() {
        let reply: Vec<LineItemDraft> = serde_json::from_str(
            r#"[{"item":"Ocean freight","cost":"USD 150","measurement":"/CTR 20'","amount":"1"}]"#,
        )
        .unwrap();
        let extractor = FakeExtractor::replying(Ok(reply));
        let mut s = session(extractor.clone());
        *extractor.control.lock().unwrap() = Some(s.parse_control());
        s.add_row(draft("Old", "USD 1", "/KG", "1"));
        s.set_raw_input("Ocean freight USD 150 per container");

        let notice = s.parse_with_ai().await;
        assert_eq!(notice, Notice::success("Successfully parsed 1 items with AI!"));

        let rows = s.table().rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line.status, RowStatus::Valid);
        assert_eq!(rows[0].line.rendered_total, "$150.00");
        let totals = s.table().grand_totals();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].bucket, CurrencyBucket::Usd);
        assert_eq!(totals[0].rendered, "$150.00");

        // Disabled while in flight, restored afterwards.
        assert_eq!(*extractor.seen_control.lock().unwrap(), Some(ControlState::BUSY));
        assert_eq!(*s.parse_control().borrow(), ControlState::IDLE);
    }

    #[tokio::test]
    async fn test_failure_leaves_table_untouched() {
        let mut s = session(FakeExtractor::replying(Err(ExtractError::Rejected {
            status: 500,
            message: "boom".to_string(),
        })));
        s.add_row(draft("Keep me", "USD 10", "/KG", "1"));
        s.set_raw_input("anything");

        let notice = s.parse_with_ai().await;
        assert!(notice.is_error());
        assert_eq!(notice.message, AI_FAILURE);
        assert_eq!(s.table().len(), 1);
        assert_eq!(*s.parse_control().borrow(), ControlState::IDLE);
    }

    #[tokio::test]
    async fn test_empty_paste_is_rejected_locally() {
        let extractor = FakeExtractor::replying(Ok(vec![draft("x", "1", "/KG", "1")]));
        let mut s = session(extractor.clone());
        s.set_raw_input("   \n");
        let notice = s.parse_with_ai().await;
        assert_eq!(notice.message, "Please paste data from email first!");
        assert!(extractor.reply.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_no_items_clears_table() {
        let mut s = session(FakeExtractor::replying(Ok(Vec::new())));
        s.add_row(draft("Old", "USD 1", "/KG", "1"));
        s.set_raw_input("nothing useful");
        let notice = s.parse_with_ai().await;
        assert_eq!(notice.message, "AI did not find any items to parse.");
        assert!(s.table().is_empty());
    }

    #[test]
    fn test_clear_all_scenario() {
        let store = SqliteStore::in_memory("shipmentData").unwrap();
        let mut s = Session::new(ShipmentTable::new(Box::new(store)), FakeExtractor::replying(Ok(Vec::new())));
        s.add_row(draft("Freight", "USD 150", "/KG", "1"));
        s.set_raw_input("staged");

        assert!(s.clear_all(&|_: &str| false).is_none());
        assert_eq!(s.table().len(), 1);
        assert_eq!(s.raw_input(), "staged");

        assert_eq!(s.clear_all(&|_: &str| true), Some(Notice::success("All data cleared!")));
        assert!(s.table().is_empty());
        assert_eq!(s.raw_input(), "");
    }

    #[test]
    fn test_persisted_rows_survive_reload() {
        let dir = std::env::temp_dir().join(format!("shipment-costing-{}", std::process::id()));
        let db = dir.join("reload.db");
        {
            let store = SqliteStore::open(&db, "shipmentData").unwrap();
            let mut s = Session::new(ShipmentTable::new(Box::new(store)), FakeExtractor::replying(Ok(Vec::new())));
            let id = s.add_row(draft("Trucking", "2000000", "/TRIP", "1"));
            s.edit(id, Field::Vendor, "PT Angkut").unwrap();
        }
        let store = SqliteStore::open(&db, "shipmentData").unwrap();
        assert_eq!(store.load().unwrap().unwrap().len(), 1);
        let mut s = Session::new(ShipmentTable::new(Box::new(store)), FakeExtractor::replying(Ok(Vec::new())));
        assert_eq!(s.load(), 1);
        let line = &s.table().rows()[0].line;
        assert_eq!(line.vendor, "PT Angkut");
        assert_eq!(line.rendered_total, "Rp 2.000.000");
        assert_eq!(s.table().grand_totals()[0].bucket, CurrencyBucket::Idr);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_export_empty_table() {
        let s = session(FakeExtractor::replying(Ok(Vec::new())));
        let (notice, path) = s.export(std::env::temp_dir(), "never");
        assert_eq!(notice.message, "No data to export!");
        assert!(path.is_none());
    }

    struct EchoEngine;

    #[async_trait]
    impl OcrEngine for EchoEngine {
        async fn initialize(&self) -> Result<(), OcrError> {
            Ok(())
        }

        async fn recognize(&self, image: &[u8], _progress: &(dyn Fn(u8) + Sync)) -> Result<String, OcrError> {
            Ok(String::from_utf8_lossy(image).into_owned())
        }
    }

    #[tokio::test]
    async fn test_ocr_result_lands_in_staging_field() {
        let mut s = session(FakeExtractor::replying(Ok(Vec::new())));
        let (mut window, _notices) = s.open_ocr(Arc::new(EchoEngine), Duration::ZERO);
        assert_eq!(s.poll_ocr(), None);

        window.wait_until_ready().await.unwrap();
        window
            .recognize(crate::ocr::ImageInput {
                mime: "image/png".to_string(),
                bytes: b"Customs clearance IDR 750000".to_vec(),
            })
            .await
            .unwrap();
        window.send_result().await.unwrap();

        assert_eq!(s.poll_ocr(), Some(Notice::success("OCR text successfully imported!")));
        assert_eq!(s.raw_input(), "Customs clearance IDR 750000");
        assert_eq!(s.poll_ocr(), None);
    }
}

// src/table.rs

use tracing::{debug, error, info, warn};

use crate::currency::{format_currency, format_plain};
use crate::errors::TableError;
use crate::line_item::{CurrencyBucket, LineItem, LineItemDraft};
use crate::store::LineItemStore;

pub type RowId = u64;

/// Editable cells of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Item,
    Amount,
    Cost,
    Measurement,
    Vendor,
    Notes,
}

impl Field {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "item" => Some(Field::Item),
            "amount" => Some(Field::Amount),
            "cost" => Some(Field::Cost),
            "measurement" | "unit" => Some(Field::Measurement),
            "vendor" => Some(Field::Vendor),
            "notes" | "note" => Some(Field::Notes),
            _ => None,
        }
    }

    /// Amount, cost and measurement edits go through the full recalculation.
    pub fn recalculates(self) -> bool {
        matches!(self, Field::Amount | Field::Cost | Field::Measurement)
    }
}

/// Interactive yes/no gate for destructive operations.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone)]
pub struct Row {
    pub id: RowId,
    pub line: LineItem,
}

/// Per-currency aggregate, rebuilt from the rows on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct GrandTotal {
    pub bucket: CurrencyBucket,
    pub sum: f64,
    pub rendered: String,
}

impl GrandTotal {
    fn new(bucket: CurrencyBucket, sum: f64) -> Self {
        let rendered = match bucket {
            CurrencyBucket::Idr => format_currency(sum, "IDR"),
            CurrencyBucket::Usd => format_currency(sum, "USD"),
            CurrencyBucket::Other => format_plain(sum),
        };
        Self { bucket, sum, rendered }
    }

    pub fn label(&self) -> &'static str {
        self.bucket.label()
    }
}

/// The editable grid: ordered rows plus derived grand totals. Every mutation
/// is synced to the store; store failures are logged and the in-memory table
/// stays authoritative.
pub struct ShipmentTable {
    rows: Vec<Row>,
    next_id: RowId,
    grand_totals: Vec<GrandTotal>,
    store: Box<dyn LineItemStore>,
}

impl ShipmentTable {
    pub fn new(store: Box<dyn LineItemStore>) -> Self {
        Self {
            rows: Vec::new(),
            next_id: 1,
            grand_totals: Vec::new(),
            store,
        }
    }

    /// Rebuild rows from the store. A corrupt payload is logged and ignored.
    pub fn restore(&mut self) -> usize {
        let drafts = match self.store.load() {
            Ok(Some(drafts)) => drafts,
            Ok(None) => return 0,
            Err(e) => {
                error!(error = %e, "Error loading saved data");
                return 0;
            }
        };
        let count = drafts.len();
        for draft in drafts {
            self.push(draft);
        }
        self.recompute_grand_totals();
        info!(rows = count, "Restored saved line items");
        count
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, id: RowId) -> Option<&LineItem> {
        self.rows.iter().find(|r| r.id == id).map(|r| &r.line)
    }

    pub fn grand_totals(&self) -> &[GrandTotal] {
        &self.grand_totals
    }

    /// Append a row, filling defaults for missing fields.
    pub fn add_row(&mut self, draft: LineItemDraft) -> RowId {
        let id = self.push(draft);
        self.recompute_grand_totals();
        self.persist();
        id
    }

    fn push(&mut self, draft: LineItemDraft) -> RowId {
        let id = self.next_id;
        self.next_id += 1;
        self.rows.push(Row {
            id,
            line: LineItem::from_draft(draft),
        });
        id
    }

    /// Write a cell and run the matching update path.
    pub fn set_field(&mut self, id: RowId, field: Field, value: &str) -> Result<&LineItem, TableError> {
        let line = self.line_mut(id)?;
        match field {
            Field::Item => line.item = value.to_string(),
            Field::Amount => line.amount = crate::line_item::parse_amount(value),
            Field::Cost => line.cost = value.to_string(),
            Field::Measurement => line.measurement = value.to_string(),
            Field::Vendor => line.vendor = value.to_string(),
            Field::Notes => line.notes = value.to_string(),
        }
        if field.recalculates() {
            self.recalculate_row(id)
        } else {
            self.update_row(id)
        }
    }

    /// Recompute a row's total and status, then the grand totals.
    pub fn recalculate_row(&mut self, id: RowId) -> Result<&LineItem, TableError> {
        let line = self.line_mut(id)?;
        line.recalculate();
        debug!(row = id, total = line.computed_total, rendered = %line.rendered_total, "Row recalculated");
        self.recompute_grand_totals();
        self.persist();
        self.row(id).ok_or(TableError::UnknownRow(id))
    }

    /// Status and persistence only; totals are left alone.
    pub fn update_row(&mut self, id: RowId) -> Result<&LineItem, TableError> {
        self.line_mut(id)?.refresh_status();
        self.persist();
        self.row(id).ok_or(TableError::UnknownRow(id))
    }

    /// Remove a row once the user confirms. Returns whether it was removed.
    pub fn delete_row(&mut self, id: RowId, confirm: &dyn Confirm) -> Result<bool, TableError> {
        let pos = self
            .rows
            .iter()
            .position(|r| r.id == id)
            .ok_or(TableError::UnknownRow(id))?;
        if !confirm.confirm("Delete this row?") {
            debug!(row = id, "Delete declined");
            return Ok(false);
        }
        self.rows.remove(pos);
        self.recompute_grand_totals();
        self.persist();
        Ok(true)
    }

    pub fn recompute_grand_totals(&mut self) {
        self.grand_totals.clear();
        if self.rows.is_empty() {
            return;
        }

        let mut sums = [0.0_f64; 3];
        for row in &self.rows {
            let slot = CurrencyBucket::ALL
                .iter()
                .position(|b| *b == row.line.bucket)
                .unwrap_or(2);
            sums[slot] += row.line.computed_total;
        }

        for (bucket, sum) in CurrencyBucket::ALL.into_iter().zip(sums) {
            if sum != 0.0 {
                self.grand_totals.push(GrandTotal::new(bucket, sum));
            }
        }
    }

    /// Drop every row. The store is not touched.
    pub fn clear_table(&mut self) {
        self.rows.clear();
        self.recompute_grand_totals();
    }

    /// Drop every row and erase the stored copy, once the user confirms.
    pub fn clear_all(&mut self, confirm: &dyn Confirm) -> bool {
        if !confirm.confirm("Clear all data from table and input?") {
            return false;
        }
        self.clear_table();
        if let Err(e) = self.store.clear() {
            error!(error = %e, "Error clearing saved data");
        }
        true
    }

    /// Sync rows to the store. Rows with no item name are not written.
    pub fn persist(&self) {
        let drafts: Vec<LineItemDraft> = self
            .rows
            .iter()
            .filter(|r| !r.line.item.is_empty())
            .map(|r| r.line.to_draft())
            .collect();
        if let Err(e) = self.store.save(&drafts) {
            warn!(error = %e, "Error saving data");
        }
    }

    fn line_mut(&mut self, id: RowId) -> Result<&mut LineItem, TableError> {
        self.rows
            .iter_mut()
            .find(|r| r.id == id)
            .map(|r| &mut r.line)
            .ok_or(TableError::UnknownRow(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::line_item::RowStatus;
    use crate::store::SqliteStore;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Store that records every save and can be told to fail.
    #[derive(Default)]
    struct RecordingStore {
        saved: Rc<RefCell<Vec<Vec<LineItemDraft>>>>,
        fail: bool,
    }

    impl LineItemStore for RecordingStore {
        fn load(&self) -> Result<Option<Vec<LineItemDraft>>, StoreError> {
            Ok(self.saved.borrow().last().cloned())
        }

        fn save(&self, rows: &[LineItemDraft]) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError::Io(std::io::Error::other("quota exceeded")));
            }
            self.saved.borrow_mut().push(rows.to_vec());
            Ok(())
        }

        fn clear(&self) -> Result<(), StoreError> {
            self.saved.borrow_mut().clear();
            Ok(())
        }
    }

    fn recording() -> (ShipmentTable, Rc<RefCell<Vec<Vec<LineItemDraft>>>>) {
        let store = RecordingStore::default();
        let saved = store.saved.clone();
        (ShipmentTable::new(Box::new(store)), saved)
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

    fn yes(_: &str) -> bool {
        true
    }

    fn no(_: &str) -> bool {
        false
    }

    #[test]
    fn test_add_row_defaults_and_persists() {
        let (mut table, saved) = recording();
        let id = table.add_row(LineItemDraft::default());
        let row = table.row(id).unwrap();
        assert_eq!(row.amount, 1);
        assert_eq!(row.status, RowStatus::Incomplete);
        // Unnamed rows are not written.
        assert_eq!(saved.borrow().last().unwrap().len(), 0);
        assert!(table.grand_totals().is_empty());
    }

    #[test]
    fn test_recalculate_on_amount_edit() {
        let (mut table, saved) = recording();
        let id = table.add_row(draft("Ocean freight", "USD 150", "/CTR 20'", "1"));
        let row = table.set_field(id, Field::Amount, "3").unwrap();
        assert_eq!(row.computed_total, 450.0);
        assert_eq!(row.rendered_total, "$450.00");
        assert_eq!(table.grand_totals()[0].rendered, "$450.00");
        assert_eq!(saved.borrow().last().unwrap()[0].amount.as_deref(), Some("3"));
    }

    #[test]
    fn test_update_row_leaves_totals() {
        let (mut table, _) = recording();
        let id = table.add_row(draft("", "USD 10", "/KG", "1"));
        assert_eq!(table.row(id).unwrap().status, RowStatus::Incomplete);
        let row = table.set_field(id, Field::Item, "Handling").unwrap();
        assert_eq!(row.status, RowStatus::Valid);
        assert_eq!(row.computed_total, 10.0);

        // Cost changed behind the table's back; a vendor edit must not pick it up.
        table.line_mut(id).unwrap().cost = "USD 99".to_string();
        let row = table.set_field(id, Field::Vendor, "Maersk").unwrap();
        assert_eq!(row.computed_total, 10.0);
    }

    #[test]
    fn test_required_cells_toggle_status() {
        let (mut table, _) = recording();
        let id = table.add_row(draft("Ocean freight", "USD 150", "/CTR 20'", "1"));
        for (field, value) in [
            (Field::Item, "Ocean freight"),
            (Field::Cost, "USD 150"),
            (Field::Measurement, "/CTR 20'"),
        ] {
            assert_eq!(table.set_field(id, field, "").unwrap().status, RowStatus::Incomplete);
            assert_eq!(table.set_field(id, field, value).unwrap().status, RowStatus::Valid);
        }

        // Clearing the cost also zeroes the total until it comes back.
        assert_eq!(table.set_field(id, Field::Cost, "").unwrap().computed_total, 0.0);
        let row = table.set_field(id, Field::Cost, "USD 150").unwrap();
        assert_eq!(row.computed_total, 150.0);
        assert_eq!(table.grand_totals()[0].rendered, "$150.00");
    }

    #[test]
    fn test_measurement_edit_recalculates() {
        let (mut table, _) = recording();
        let id = table.add_row(draft("THC", "", "", "1"));
        table.line_mut(id).unwrap().cost = "USD 20".to_string();
        let row = table.set_field(id, Field::Measurement, "/DOC").unwrap();
        assert_eq!(row.rendered_total, "$20.00");
        assert_eq!(row.status, RowStatus::Valid);
    }

    #[test]
    fn test_grand_totals_per_bucket() {
        let (mut table, _) = recording();
        table.add_row(draft("Freight", "USD 150", "/CTR 20'", "2"));
        table.add_row(draft("Docs", "usd 25.5", "/DOC", "1"));
        table.add_row(draft("Trucking", "IDR 1,500,000", "/TRIP", "1"));
        table.add_row(draft("Storage", "500000", "/DAY", "2"));

        let totals = table.grand_totals();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].bucket, CurrencyBucket::Idr);
        assert_eq!(totals[0].sum, 2_500_000.0);
        assert_eq!(totals[0].rendered, "Rp 2.500.000");
        assert_eq!(totals[1].bucket, CurrencyBucket::Usd);
        assert_eq!(totals[1].sum, 325.5);
        assert_eq!(totals[1].rendered, "$325.50");
    }

    #[test]
    fn test_uncalculated_rows_produce_no_aggregate() {
        let (mut table, _) = recording();
        table.add_row(draft("Pending", "", "/KG", "1"));
        assert_eq!(table.len(), 1);
        assert!(table.grand_totals().is_empty());
    }

    #[test]
    fn test_other_bucket_uses_plain_format() {
        let (mut table, _) = recording();
        let id = table.add_row(draft("Misc", "", "/SET", "1"));
        {
            let line = table.line_mut(id).unwrap();
            line.computed_total = 1234.5;
        }
        table.recompute_grand_totals();
        assert_eq!(table.grand_totals()[0].label(), "GRAND TOTAL (Other)");
        assert_eq!(table.grand_totals()[0].rendered, "1,234.5");
    }

    #[test]
    fn test_delete_declined_keeps_row() {
        let (mut table, saved) = recording();
        let id = table.add_row(draft("Freight", "USD 150", "/KG", "1"));
        let saves = saved.borrow().len();
        assert!(!table.delete_row(id, &no).unwrap());
        assert_eq!(table.len(), 1);
        assert_eq!(saved.borrow().len(), saves);
        assert_eq!(table.grand_totals().len(), 1);
    }

    #[test]
    fn test_delete_confirmed() {
        let (mut table, saved) = recording();
        let a = table.add_row(draft("Freight", "USD 150", "/KG", "1"));
        table.add_row(draft("Docs", "USD 50", "/DOC", "1"));
        assert!(table.delete_row(a, &yes).unwrap());
        assert_eq!(table.len(), 1);
        assert_eq!(table.grand_totals()[0].sum, 50.0);
        assert_eq!(saved.borrow().last().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_row() {
        let (mut table, _) = recording();
        assert!(matches!(table.set_field(42, Field::Cost, "1"), Err(TableError::UnknownRow(42))));
        assert!(table.delete_row(42, &yes).is_err());
    }

    #[test]
    fn test_clear_all_erases_store() {
        let store = SqliteStore::in_memory("shipmentData").unwrap();
        let mut table = ShipmentTable::new(Box::new(store));
        table.add_row(draft("Freight", "USD 150", "/KG", "1"));
        assert!(!table.clear_all(&no));
        assert_eq!(table.len(), 1);
        assert!(table.clear_all(&yes));
        assert!(table.is_empty());
        assert!(table.grand_totals().is_empty());
        assert_eq!(table.store.load().unwrap(), None);
    }

    #[test]
    fn test_restore_rebuilds_totals() {
        let store = SqliteStore::in_memory("shipmentData").unwrap();
        store
            .save(&[draft("Freight", "USD 150", "/KG", "2"), draft("Trucking", "2000000", "/TRIP", "1")])
            .unwrap();
        let mut table = ShipmentTable::new(Box::new(store));
        assert_eq!(table.restore(), 2);
        assert_eq!(table.rows()[0].line.computed_total, 300.0);
        assert_eq!(table.grand_totals().len(), 2);
    }

    #[test]
    fn test_save_failure_is_swallowed() {
        let store = RecordingStore {
            fail: true,
            ..Default::default()
        };
        let mut table = ShipmentTable::new(Box::new(store));
        let id = table.add_row(draft("Freight", "USD 150", "/KG", "1"));
        assert_eq!(table.row(id).unwrap().computed_total, 150.0);
    }

    #[test]
    fn test_field_names() {
        assert_eq!(Field::parse("Cost"), Some(Field::Cost));
        assert_eq!(Field::parse("unit"), Some(Field::Measurement));
        assert_eq!(Field::parse("total"), None);
    }
}

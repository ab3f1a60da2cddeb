// src/line_item.rs

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::LazyLock;

use crate::currency::format_currency;

/// Unit suffixes offered when editing the measurement cell. Free text is
/// still accepted.
pub const MEASUREMENT_TYPES: &[&str] = &[
    "/RT", "/DOC", "/WM", "/CTR 20'", "/CTR 40'", "/TRIP", "/SHIPMENT", "/KG", "/M3", "/TON",
    "/CBM", "/PALLET", "/BOX", "/ITEM", "/DAY", "/HOUR", "/KM", "/MILE", "/LITER", "/GALLON",
    "/SQM", "/CASE", "/DRUM", "/BAG", "/ROLL", "/UNIT", "/SET", "/DOZEN",
];

/// Currency classification used for grand-total aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurrencyBucket {
    Idr,
    Usd,
    Other,
}

impl CurrencyBucket {
    /// Aggregation order.
    pub const ALL: [CurrencyBucket; 3] = [CurrencyBucket::Idr, CurrencyBucket::Usd, CurrencyBucket::Other];

    pub fn label(self) -> &'static str {
        match self {
            CurrencyBucket::Idr => "GRAND TOTAL (IDR)",
            CurrencyBucket::Usd => "GRAND TOTAL (USD)",
            CurrencyBucket::Other => "GRAND TOTAL (Other)",
        }
    }

    /// Resolve from the raw cost and the rendered total. The rendered total
    /// always carries a symbol once a row has been calculated, so an untagged
    /// cost ends up in IDR through its "Rp" rendering.
    pub fn resolve(cost: &str, rendered_total: &str) -> Self {
        let cost = cost.to_uppercase();
        if cost.contains("USD") || rendered_total.contains('$') {
            CurrencyBucket::Usd
        } else if cost.contains("IDR") || rendered_total.contains("Rp") {
            CurrencyBucket::Idr
        } else {
            CurrencyBucket::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Valid,
    Incomplete,
}

impl RowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RowStatus::Valid => "VALID",
            RowStatus::Incomplete => "INCOMPLETE",
        }
    }
}

/// Partial line item as it arrives from the extraction service or from the
/// persisted store. Values may be strings, numbers or null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItemDraft {
    #[serde(default, deserialize_with = "lenient_text")]
    pub item: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub amount: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub cost: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub measurement: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub vendor: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub notes: Option<String>,
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// One shipping cost entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub item: String,
    pub amount: u32,
    pub cost: String,
    pub measurement: String,
    pub vendor: String,
    pub notes: String,
    pub computed_total: f64,
    /// Total as displayed; "0" until the row is first calculated.
    pub rendered_total: String,
    pub bucket: CurrencyBucket,
    pub status: RowStatus,
}

impl LineItem {
    /// Build a row with defaults for anything the draft leaves out. The total
    /// is only calculated when a cost is present.
    pub fn from_draft(draft: LineItemDraft) -> Self {
        let amount = draft.amount.as_deref().map(parse_amount).unwrap_or(1);
        let mut row = Self {
            item: draft.item.unwrap_or_default(),
            amount,
            cost: draft.cost.unwrap_or_default(),
            measurement: draft.measurement.unwrap_or_default(),
            vendor: draft.vendor.unwrap_or_default(),
            notes: draft.notes.unwrap_or_default(),
            computed_total: 0.0,
            rendered_total: "0".to_string(),
            bucket: CurrencyBucket::Other,
            status: RowStatus::Incomplete,
        };
        if !row.cost.is_empty() {
            row.recalculate();
        } else {
            row.refresh_bucket();
            row.refresh_status();
        }
        row
    }

    /// Persisted shape: the six editable fields, amount in textual form.
    pub fn to_draft(&self) -> LineItemDraft {
        LineItemDraft {
            item: Some(self.item.clone()),
            amount: Some(self.amount.to_string()),
            cost: Some(self.cost.clone()),
            measurement: Some(self.measurement.clone()),
            vendor: Some(self.vendor.clone()),
            notes: Some(self.notes.clone()),
        }
    }

    /// Recompute total, rendering, bucket and status from cost and amount.
    pub fn recalculate(&mut self) {
        self.computed_total = parse_cost_magnitude(&self.cost) * f64::from(self.amount);
        self.rendered_total = format_currency(self.computed_total, &self.cost);
        self.refresh_bucket();
        self.refresh_status();
    }

    pub fn refresh_status(&mut self) {
        self.status = if self.item.is_empty() || self.cost.is_empty() || self.measurement.is_empty() {
            RowStatus::Incomplete
        } else {
            RowStatus::Valid
        };
    }

    fn refresh_bucket(&mut self) {
        self.bucket = CurrencyBucket::resolve(&self.cost, &self.rendered_total);
    }

    pub fn is_valid(&self) -> bool {
        self.status == RowStatus::Valid
    }
}

/// Numeric magnitude of a free-form cost: everything but digits, sign and
/// decimal point is dropped, then the longest numeric prefix is read.
/// Anything unreadable is 0.
pub fn parse_cost_magnitude(cost: &str) -> f64 {
    let stripped: String = cost
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    leading_number(&stripped).unwrap_or(0.0)
}

/// Amount as a positive integer; unreadable or below 1 becomes 1.
pub fn parse_amount(amount: &str) -> u32 {
    match leading_number(amount.trim()) {
        Some(v) if v >= 1.0 => v.trunc().min(f64::from(u32::MAX)) as u32,
        _ => 1,
    }
}

/// `[-+]?digits[.digits]` at the start of a string.
static LEADING_NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[-+]?(?:\d+(?:\.\d*)?|\.\d+)").ok());

fn leading_number(s: &str) -> Option<f64> {
    LEADING_NUMBER
        .as_ref()?
        .find(s)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

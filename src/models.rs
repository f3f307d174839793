use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Date format used across the ledger files and the reference feed.
pub const LEDGER_DATE_FORMAT: &str = "%Y-%m-%d";

/// Fixed column order of the per-security signal ledger files.
pub const SIGNAL_FIELD_NAMES: [&str; 14] = [
    "code",
    "tradeday",
    "position_status",
    "next_open_action",
    "E1",
    "E2",
    "E3",
    "E4",
    "E5",
    "exit1",
    "close",
    "entry_price",
    "entry_date",
    "exit_price",
];

/// Fixed column order of the shared reconciliation results store.
pub const RESULT_FIELD_NAMES: [&str; 9] = [
    "stock_code",
    "timestamp",
    "total_api",
    "total_algo",
    "total_exact",
    "with_deviation",
    "unmatched_api",
    "unmatched_algo",
    "reference_fetch_ok",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub code: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Flat,
    InPosition,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Flat => "F",
            PositionStatus::InPosition => "I",
        }
    }
}

impl FromStr for PositionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "F" => Ok(PositionStatus::Flat),
            "I" => Ok(PositionStatus::InPosition),
            other => Err(anyhow!("Unknown position status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenAction {
    Buy,
    Sell,
    None,
}

impl OpenAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenAction::Buy => "B",
            OpenAction::Sell => "S",
            OpenAction::None => "N",
        }
    }
}

impl FromStr for OpenAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "B" => Ok(OpenAction::Buy),
            "S" => Ok(OpenAction::Sell),
            "N" => Ok(OpenAction::None),
            other => Err(anyhow!("Unknown open action '{}'", other)),
        }
    }
}

/// The five energy readings computed for every processed trading day,
/// regardless of position state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyIndicators {
    pub e1: f64,
    pub e2: f64,
    pub e3: f64,
    pub e4: f64,
    pub e5: f64,
}

/// One ledger row per (code, tradeday). Unset prices serialize as `0`,
/// an unset entry date as the literal `0`.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRow {
    pub code: String,
    pub tradeday: NaiveDate,
    pub position_status: PositionStatus,
    pub next_open_action: OpenAction,
    pub energies: EnergyIndicators,
    pub exit1: f64,
    pub close: f64,
    pub entry_price: f64,
    pub entry_date: Option<NaiveDate>,
    pub exit_price: f64,
}

impl SignalRow {
    /// Seed row for a security with no prior ledger history: flat, all
    /// numeric fields zero, dated at the given tradeday.
    pub fn seed(code: &str, tradeday: NaiveDate) -> Self {
        Self {
            code: code.to_string(),
            tradeday,
            position_status: PositionStatus::Flat,
            next_open_action: OpenAction::None,
            energies: EnergyIndicators::default(),
            exit1: 0.0,
            close: 0.0,
            entry_price: 0.0,
            entry_date: None,
            exit_price: 0.0,
        }
    }

    /// Encodes the row in the `SIGNAL_FIELD_NAMES` column order.
    pub fn to_record(&self) -> Vec<String> {
        vec![
            self.code.clone(),
            self.tradeday.format(LEDGER_DATE_FORMAT).to_string(),
            self.position_status.as_str().to_string(),
            self.next_open_action.as_str().to_string(),
            format_price(self.energies.e1),
            format_price(self.energies.e2),
            format_price(self.energies.e3),
            format_price(self.energies.e4),
            format_price(self.energies.e5),
            format_price(self.exit1),
            format_price(self.close),
            format_price(self.entry_price),
            self.entry_date
                .map(|d| d.format(LEDGER_DATE_FORMAT).to_string())
                .unwrap_or_else(|| "0".to_string()),
            format_price(self.exit_price),
        ]
    }

    /// Decodes a header-keyed ledger mapping back into a row.
    pub fn from_mapping(mapping: &HashMap<String, String>) -> Result<Self> {
        let field = |name: &str| -> Result<&str> {
            mapping
                .get(name)
                .map(|value| value.trim())
                .ok_or_else(|| anyhow!("missing ledger column '{}'", name))
        };

        let tradeday_raw = field("tradeday")?;
        Ok(Self {
            code: field("code")?.to_string(),
            tradeday: parse_ledger_date(tradeday_raw)
                .ok_or_else(|| anyhow!("unparsable tradeday '{}'", tradeday_raw))?,
            position_status: field("position_status")?.parse()?,
            next_open_action: field("next_open_action")?.parse()?,
            energies: EnergyIndicators {
                e1: parse_price(field("E1")?)?,
                e2: parse_price(field("E2")?)?,
                e3: parse_price(field("E3")?)?,
                e4: parse_price(field("E4")?)?,
                e5: parse_price(field("E5")?)?,
            },
            exit1: parse_price(field("exit1")?)?,
            close: parse_price(field("close")?)?,
            entry_price: parse_price(field("entry_price")?)?,
            entry_date: parse_ledger_date(field("entry_date")?),
            exit_price: parse_price(field("exit_price")?)?,
        })
    }
}

fn format_price(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        format!("{}", value)
    }
}

fn parse_price(raw: &str) -> Result<f64> {
    if raw.is_empty() {
        return Ok(0.0);
    }
    raw.parse::<f64>()
        .map_err(|_| anyhow!("unparsable numeric value '{}'", raw))
}

/// Parses a ledger date cell; `0` and empty cells mean unset.
pub fn parse_ledger_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "0" {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, LEDGER_DATE_FORMAT).ok()
}

/// Sentinel-bearing stop date: "Open position" compares equal only to itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Date(NaiveDate),
    OpenPosition,
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopSignal::Date(date) => write!(f, "{}", date.format(LEDGER_DATE_FORMAT)),
            StopSignal::OpenPosition => write!(f, "Open position"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitPrice {
    Price(f64),
    OpenPosition,
}

impl fmt::Display for ExitPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitPrice::Price(value) => write!(f, "{}", value),
            ExitPrice::OpenPosition => write!(f, "Open position"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    Ledger,
    Reference,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Ledger => "ledger",
            SignalSource::Reference => "reference",
        }
    }
}

/// One closed or still-open trade, derived from consecutive ledger rows or
/// from the reference feed. Ephemeral; consumed only by the matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedSignal {
    pub buy_signal: Option<NaiveDate>,
    pub stop_signal: StopSignal,
    pub entry_price: f64,
    pub exit_price: ExitPrice,
    pub day_before_buy: Option<NaiveDate>,
    pub day_before_sell: Option<NaiveDate>,
    pub gain_lose: Option<f64>,
    pub source: SignalSource,
}

#[derive(Debug, Clone)]
pub struct ReconciliationSummary {
    pub stock_code: String,
    pub timestamp: DateTime<Utc>,
    pub total_reference: usize,
    pub total_ledger: usize,
    pub exact_matches: usize,
    pub deviation_matches: usize,
    pub unmatched_reference: usize,
    pub unmatched_ledger: usize,
    pub reference_fetch_ok: bool,
}

impl ReconciliationSummary {
    /// Encodes the summary in the `RESULT_FIELD_NAMES` column order.
    pub fn to_record(&self) -> Vec<String> {
        vec![
            self.stock_code.clone(),
            self.timestamp.to_rfc3339(),
            self.total_reference.to_string(),
            self.total_ledger.to_string(),
            self.exact_matches.to_string(),
            self.deviation_matches.to_string(),
            self.unmatched_reference.to_string(),
            self.unmatched_ledger.to_string(),
            self.reference_fetch_ok.to_string(),
        ]
    }
}

// Task payloads consumed from the dispatcher boundary.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessTask {
    pub task_id: Uuid,
    pub stock: String,
}

impl ProcessTask {
    pub fn new(stock: &str) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            stock: stock.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileTask {
    pub task_id: Uuid,
    pub stock_code: String,
}

impl ReconcileTask {
    pub fn new(stock_code: &str) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            stock_code: stock_code.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryWriteTask {
    pub stock_code: String,
    pub results_data: Vec<Vec<String>>,
    pub field_names: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn signal_row_record_uses_zero_sentinels() {
        let seed = SignalRow::seed("0838", date(2019, 1, 2));
        let record = seed.to_record();
        assert_eq!(record[0], "0838");
        assert_eq!(record[1], "2019-01-02");
        assert_eq!(record[2], "F");
        assert_eq!(record[3], "N");
        for cell in &record[4..] {
            assert_eq!(cell, "0");
        }
    }

    #[test]
    fn signal_row_mapping_roundtrip_preserves_unset_entry_date() {
        let mut row = SignalRow::seed("0981", date(2020, 3, 16));
        row.next_open_action = OpenAction::Buy;
        row.close = 12.34;
        row.entry_price = 12.34;
        row.exit1 = 11.8;

        let mapping: HashMap<String, String> = SIGNAL_FIELD_NAMES
            .iter()
            .map(|name| name.to_string())
            .zip(row.to_record())
            .collect();
        let parsed = SignalRow::from_mapping(&mapping).unwrap();
        assert_eq!(parsed, row);
        assert!(parsed.entry_date.is_none());
    }

    #[test]
    fn from_mapping_rejects_malformed_cells() {
        let mut mapping: HashMap<String, String> = SIGNAL_FIELD_NAMES
            .iter()
            .map(|name| name.to_string())
            .zip(SignalRow::seed("0838", date(2019, 1, 2)).to_record())
            .collect();
        mapping.insert("tradeday".to_string(), "not-a-date".to_string());
        assert!(SignalRow::from_mapping(&mapping).is_err());

        mapping.insert("tradeday".to_string(), "2019-01-02".to_string());
        mapping.insert("close".to_string(), "n/a".to_string());
        assert!(SignalRow::from_mapping(&mapping).is_err());
    }

    #[test]
    fn stop_signal_sentinel_only_equals_itself() {
        let concrete = StopSignal::Date(date(2021, 5, 4));
        assert_ne!(concrete, StopSignal::OpenPosition);
        assert_eq!(StopSignal::OpenPosition, StopSignal::OpenPosition);
        assert_eq!(StopSignal::OpenPosition.to_string(), "Open position");
    }
}

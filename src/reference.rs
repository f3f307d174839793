use crate::models::{ExitPrice, SignalSource, StopSignal, UnifiedSignal, LEDGER_DATE_FORMAT};
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate};
use log::warn;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Signals derived before this year are excluded from reconciliation. The
/// trading-day calendar still includes earlier dates.
const START_FROM_YEAR: i32 = 2019;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("reference feed request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("reference feed returned no data for {code}")]
    EmptyResponse { code: String },
}

/// One raw record of the reference verification feed. Price fields arrive
/// as numbers, strings, or the "Open position" sentinel depending on the
/// record, so they are kept loose until scanning.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceRecord {
    #[serde(default)]
    pub tradeday: Option<String>,
    #[serde(default)]
    pub entry_date: Option<String>,
    #[serde(default)]
    pub prev_tradeday: Option<String>,
    #[serde(default)]
    pub today_open_action: Option<String>,
    #[serde(default)]
    pub position_status: Option<String>,
    #[serde(default)]
    pub entry_price: Option<Value>,
    #[serde(default)]
    pub exit_price: Option<Value>,
}

/// The reference feed reduced to what the matcher consumes: trade-level
/// signals plus the full trading-day calendar. Every record occupies one
/// calendar slot; a missing or unparsable tradeday leaves a `None` hole so
/// positional index distances stay aligned with the feed.
#[derive(Debug, Default)]
pub struct ReferenceHistory {
    pub signals: Vec<UnifiedSignal>,
    pub trade_days: Vec<Option<NaiveDate>>,
}

pub struct ReferenceClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ReferenceClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to construct HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Fetches the full verification history for one security. An empty
    /// body is an error like any transport failure; the caller decides how
    /// to degrade.
    pub async fn fetch_history(&self, code: &str) -> Result<ReferenceHistory, ReferenceError> {
        let url = format!(
            "{}/v1.1/debugHKEX/verifyData?TradeDay=&Code={}&verifyType=signal",
            self.base_url, code
        );
        let records: Vec<ReferenceRecord> = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if records.is_empty() {
            return Err(ReferenceError::EmptyResponse {
                code: code.to_string(),
            });
        }
        Ok(scan_records(&records))
    }
}

/// Walks the raw records in feed order, pairing `(B, I)` opens with
/// `(S, F)` closes. Every parseable tradeday lands in the calendar before
/// the year cutoff is applied, so pre-cutoff days still anchor the fuzzy
/// distance computation.
pub fn scan_records(records: &[ReferenceRecord]) -> ReferenceHistory {
    let mut trade_days = Vec::new();
    let mut signals = Vec::new();
    let mut current: Option<OpenReferencePosition> = None;

    for record in records {
        let tradeday = record.tradeday.as_deref().and_then(parse_feed_date);
        trade_days.push(tradeday);

        let anchor = tradeday.or_else(|| record.entry_date.as_deref().and_then(parse_feed_date));
        match anchor {
            Some(date) if date.year() >= START_FROM_YEAR => {}
            _ => continue,
        }

        let action = record.today_open_action.as_deref().unwrap_or("");
        let status = record.position_status.as_deref().unwrap_or("");

        if action == "B" && status == "I" {
            current = Some(OpenReferencePosition {
                buy_signal: record.entry_date.as_deref().and_then(parse_feed_date),
                entry_price: price_or_zero(record.entry_price.as_ref()),
                day_before_buy: record.prev_tradeday.as_deref().and_then(parse_feed_date),
            });
        } else if action == "S" && status == "F" {
            let stop_signal = tradeday
                .map(StopSignal::Date)
                .unwrap_or(StopSignal::OpenPosition);
            let day_before_sell = record.prev_tradeday.as_deref().and_then(parse_feed_date);
            let exit_price = price_or_open(record.exit_price.as_ref());

            match current.take() {
                Some(position) => signals.push(UnifiedSignal {
                    buy_signal: position.buy_signal,
                    stop_signal,
                    entry_price: position.entry_price,
                    exit_price,
                    day_before_buy: position.day_before_buy,
                    day_before_sell,
                    gain_lose: None,
                    source: SignalSource::Reference,
                }),
                None => signals.push(UnifiedSignal {
                    buy_signal: None,
                    stop_signal,
                    entry_price: 0.0,
                    exit_price,
                    day_before_buy: None,
                    day_before_sell,
                    gain_lose: None,
                    source: SignalSource::Reference,
                }),
            }
        }
    }

    if let Some(position) = current {
        signals.push(UnifiedSignal {
            buy_signal: position.buy_signal,
            stop_signal: StopSignal::OpenPosition,
            entry_price: position.entry_price,
            exit_price: ExitPrice::OpenPosition,
            day_before_buy: position.day_before_buy,
            day_before_sell: None,
            gain_lose: None,
            source: SignalSource::Reference,
        });
    }

    ReferenceHistory {
        signals,
        trade_days,
    }
}

struct OpenReferencePosition {
    buy_signal: Option<NaiveDate>,
    entry_price: f64,
    day_before_buy: Option<NaiveDate>,
}

/// Feed dates arrive as RFC 3339 timestamps or bare dates.
fn parse_feed_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(timestamp.date_naive());
    }
    NaiveDate::parse_from_str(trimmed, LEDGER_DATE_FORMAT).ok()
}

fn numeric_value(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed == "Open position" {
                None
            } else {
                match trimmed.parse::<f64>() {
                    Ok(parsed) => Some(parsed),
                    Err(_) => {
                        warn!("Unparsable price value '{}' in reference feed", trimmed);
                        None
                    }
                }
            }
        }
        _ => None,
    }
}

fn price_or_zero(value: Option<&Value>) -> f64 {
    numeric_value(value).unwrap_or(0.0)
}

fn price_or_open(value: Option<&Value>) -> ExitPrice {
    numeric_value(value)
        .map(ExitPrice::Price)
        .unwrap_or(ExitPrice::OpenPosition)
}

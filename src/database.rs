use crate::models::Bar;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{error, warn};
use tokio_postgres::{Client, NoTls};

pub struct Database {
    client: Client,
}

impl Database {
    pub async fn new<S: AsRef<str>>(database_url: S) -> Result<Self> {
        let database_url = database_url.as_ref().to_string();
        let (client, connection) = tokio_postgres::connect(&database_url, NoTls)
            .await
            .with_context(|| format!("failed to connect to PostgreSQL at {}", database_url))?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!("PostgreSQL connection error: {}", err);
            }
        });

        Ok(Self { client })
    }

    /// Adjusted daily bars for one security, oldest first. Rows with a zero
    /// adjusted open are unusable for fill pricing and are dropped with a
    /// warning listing the affected dates.
    pub async fn get_daily_bars(&self, code: &str) -> Result<Vec<Bar>> {
        let rows = self
            .client
            .query(
                "SELECT tradeday, open_adj, high_adj, low_adj, close_adj, volume_adj \
                 FROM daily_bars WHERE code = $1 ORDER BY tradeday ASC",
                &[&code],
            )
            .await
            .with_context(|| format!("failed to load daily bars for {}", code))?;

        let mut bars = Vec::with_capacity(rows.len());
        let mut dropped_dates: Vec<NaiveDate> = Vec::new();
        for row in rows {
            let date: NaiveDate = row.get(0);
            let open: f64 = row.get::<_, Option<f64>>(1).unwrap_or(0.0);
            if open == 0.0 {
                dropped_dates.push(date);
                continue;
            }
            bars.push(Bar {
                code: code.to_string(),
                date,
                open,
                high: row.get::<_, Option<f64>>(2).unwrap_or(0.0),
                low: row.get::<_, Option<f64>>(3).unwrap_or(0.0),
                close: row.get::<_, Option<f64>>(4).unwrap_or(0.0),
                volume: row.get::<_, Option<i64>>(5).unwrap_or(0),
            });
        }

        if !dropped_dates.is_empty() {
            warn!(
                "Dropped {} zero-open bar(s) for {} at dates: {}",
                dropped_dates.len(),
                code,
                dropped_dates
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Ok(bars)
    }

    /// Every distinct security code present in the bar table.
    pub async fn get_security_codes(&self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT DISTINCT code FROM daily_bars ORDER BY code ASC",
                &[],
            )
            .await
            .context("failed to load security codes")?;
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }
}

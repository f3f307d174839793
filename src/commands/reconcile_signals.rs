use crate::context::AppContext;
use crate::ledger::SignalLedger;
use crate::matcher::reconcile_signals;
use crate::models::{
    ReconcileTask, ReconciliationSummary, SummaryWriteTask, RESULT_FIELD_NAMES,
};
use crate::reference::ReferenceHistory;
use crate::unified::unify_ledger_rows;
use crate::universe::filter_universe;
use anyhow::Result;
use chrono::Utc;
use log::{error, info};

/// File name of the shared reconciliation results store inside the data
/// directory.
pub const RESULTS_FILE: &str = "results";

/// Verifies each security's ledger against the reference feed and appends
/// one statistics row per security to the shared results store. A failed
/// or empty reference fetch degrades to an empty reference set; the run
/// continues and the summary row carries `reference_fetch_ok = false`.
pub async fn run(app: &AppContext, codes: &[String]) -> Result<()> {
    let requested = if codes.is_empty() {
        let db = app.database().await?;
        db.get_security_codes().await?
    } else {
        codes.to_vec()
    };
    let universe = filter_universe(&requested);
    if universe.is_empty() {
        info!("No processable securities requested");
        return Ok(());
    }

    let ledger = app.ledger();
    let client = app.reference_client()?;

    for code in &universe {
        let task = ReconcileTask::new(code);
        info!(
            "Starting reconciliation for {} (task {})",
            task.stock_code, task.task_id
        );

        let (history, reference_fetch_ok) = match client.fetch_history(code).await {
            Ok(history) => (history, true),
            Err(err) => {
                error!("Reference fetch failed for {}: {}", code, err);
                (ReferenceHistory::default(), false)
            }
        };

        let ledger_rows = ledger.read_signal_rows(code);
        let unified_ledger = unify_ledger_rows(&ledger_rows);
        let total_reference = history.signals.len();
        let total_ledger = unified_ledger.len();

        let outcome = reconcile_signals(&history.signals, unified_ledger, &history.trade_days);

        info!("------------------------------");
        info!("Stock: {}", code);
        info!("Total reference signals: {}", total_reference);
        info!("Total ledger signals: {}", total_ledger);
        info!("Total exact matches: {}", outcome.exact_matches);
        info!(
            "Deviations matches (±2 trading days): {}",
            outcome.deviation_matches
        );
        info!(
            "Unmatched ledger signals: {}",
            outcome.unmatched_ledger.len()
        );
        info!("Unmatched ledger values: {:?}", outcome.unmatched_ledger);
        info!(
            "Unmatched reference signals: {}",
            outcome.unmatched_reference.len()
        );
        info!(
            "Unmatched reference values: {:?}",
            outcome.unmatched_reference
        );

        let summary = ReconciliationSummary {
            stock_code: code.clone(),
            timestamp: Utc::now(),
            total_reference,
            total_ledger,
            exact_matches: outcome.exact_matches,
            deviation_matches: outcome.deviation_matches,
            unmatched_reference: outcome.unmatched_reference.len(),
            unmatched_ledger: outcome.unmatched_ledger.len(),
            reference_fetch_ok,
        };

        let write_task = SummaryWriteTask {
            stock_code: code.clone(),
            results_data: vec![summary.to_record()],
            field_names: RESULT_FIELD_NAMES.iter().map(|s| s.to_string()).collect(),
        };
        if write_summary(&ledger, &write_task) {
            info!("Results row recorded for {}", code);
        } else {
            error!("Failed to record results row for {}", code);
        }
    }

    Ok(())
}

/// Appends a queued summary batch to the shared results store under the
/// schema it was built with.
pub fn write_summary(ledger: &SignalLedger, task: &SummaryWriteTask) -> bool {
    let fieldnames: Vec<&str> = task.field_names.iter().map(String::as_str).collect();
    ledger.append(RESULTS_FILE, &task.results_data, &fieldnames)
}

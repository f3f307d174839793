use crate::context::AppContext;
use crate::evaluator::create_evaluator;
use crate::models::{Bar, ProcessTask, SignalRow, SIGNAL_FIELD_NAMES};
use crate::retry::retry_data_fetch;
use crate::state_machine::run_state_machine;
use crate::universe::filter_universe;
use anyhow::{anyhow, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;

struct ProcessJob {
    task: ProcessTask,
    bars: Vec<Bar>,
    latest: Option<SignalRow>,
}

struct ProcessJobResult {
    task: ProcessTask,
    rows: Vec<SignalRow>,
}

/// Extends the per-security signal ledgers: one task per security, the
/// state machine running on blocking workers, appends issued from this
/// task only. Codes are deduplicated so each ledger file has exactly one
/// writer for the whole run.
pub async fn run(app: &AppContext, codes: &[String]) -> Result<()> {
    let db = app.database().await?;
    let requested = if codes.is_empty() {
        db.get_security_codes().await?
    } else {
        codes.to_vec()
    };

    let mut seen = HashSet::new();
    let universe: Vec<String> = filter_universe(&requested)
        .into_iter()
        .filter(|code| seen.insert(code.clone()))
        .collect();
    if universe.is_empty() {
        info!("No processable securities requested");
        return Ok(());
    }

    let reference_code = app.config().reference_code.clone();
    let reference_bars: Arc<Vec<Bar>> = Arc::new(retry_data_fetch!(
        format!("loading reference bars for {}", reference_code),
        db.get_daily_bars(&reference_code)
    )?);

    let ledger = app.ledger();
    let evaluator_name = app.config().evaluator.clone();

    let mut jobs = Vec::with_capacity(universe.len());
    for code in &universe {
        let task = ProcessTask::new(code);
        let bars = match retry_data_fetch!(
            format!("loading bars for {}", code),
            db.get_daily_bars(code)
        ) {
            Ok(bars) => bars,
            Err(err) => {
                warn!("Skipping {}: failed to load bars: {}", code, err);
                continue;
            }
        };
        if bars.is_empty() {
            info!("No bars for {}; skipping", code);
            continue;
        }
        let latest = ledger.latest(code);
        jobs.push(ProcessJob { task, bars, latest });
    }

    if jobs.is_empty() {
        info!("Nothing to process");
        return Ok(());
    }

    let cpu_budget = num_cpus::get().saturating_sub(1).max(1);
    let worker_limit = std::cmp::max(1, std::cmp::min(jobs.len(), cpu_budget));
    info!(
        "Processing {} securities with {} concurrent worker{}",
        jobs.len(),
        worker_limit,
        if worker_limit == 1 { "" } else { "s" }
    );

    let mut pending_jobs = jobs.into_iter();
    let mut in_flight: FuturesUnordered<_> = FuturesUnordered::new();

    let spawn_job = |job: ProcessJob| {
        let reference_bars = Arc::clone(&reference_bars);
        let evaluator_name = evaluator_name.clone();
        tokio::task::spawn_blocking(move || -> Result<ProcessJobResult> {
            let evaluator = create_evaluator(&evaluator_name)?;
            let rows = run_state_machine(
                &job.task.stock,
                &job.bars,
                &reference_bars,
                job.latest.as_ref(),
                evaluator.as_ref(),
            )?;
            Ok(ProcessJobResult {
                task: job.task,
                rows,
            })
        })
    };

    for _ in 0..worker_limit {
        if let Some(job) = pending_jobs.next() {
            in_flight.push(spawn_job(job));
        }
    }

    let mut processed = 0usize;
    let mut failed = 0usize;

    while let Some(handle) = in_flight.next().await {
        match handle {
            Ok(Ok(result)) => {
                let code = result.task.stock.as_str();
                if result.rows.is_empty() {
                    info!("Ledger for {} already up to date (task {})", code, result.task.task_id);
                    processed += 1;
                } else {
                    let records: Vec<Vec<String>> =
                        result.rows.iter().map(SignalRow::to_record).collect();
                    if ledger.append(code, &records, &SIGNAL_FIELD_NAMES) {
                        info!(
                            "Appended {} row(s) for {} (task {})",
                            records.len(),
                            code,
                            result.task.task_id
                        );
                        processed += 1;
                    } else {
                        warn!("Failed to persist {} row(s) for {}", records.len(), code);
                        failed += 1;
                    }
                }
            }
            Ok(Err(err)) => {
                warn!("Signal processing task failed: {}", err);
                failed += 1;
            }
            Err(err) => {
                warn!("Signal processing worker panicked: {}", err);
                failed += 1;
            }
        }

        if let Some(job) = pending_jobs.next() {
            in_flight.push(spawn_job(job));
        }
    }

    info!(
        "Signal processing complete: {} succeeded, {} failed",
        processed, failed
    );
    if processed == 0 && failed > 0 {
        return Err(anyhow!("all signal processing tasks failed"));
    }
    Ok(())
}

use crate::evaluator::SignalEvaluator;
use crate::models::{Bar, EnergyIndicators, OpenAction, PositionStatus, SignalRow};
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use log::info;

/// Securities with no ledger history are seeded no earlier than this date.
pub const PROCESSING_START: NaiveDate = match NaiveDate::from_ymd_opt(2019, 1, 1) {
    Some(date) => date,
    None => panic!("invalid processing start date"),
};

/// Position state carried across bars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionState {
    Flat {
        stop_level: f64,
    },
    InPosition {
        entry_date: NaiveDate,
        entry_price: f64,
        stop_level: f64,
    },
}

/// Full per-security carried state: the position plus the action the
/// previous row scheduled for the next open (the one-bar execution lag).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarriedState {
    pub position: PositionState,
    pub pending_action: OpenAction,
}

impl CarriedState {
    /// Reconstructs the carried state from the most recent persisted row.
    /// The stored `position_status` is the state the row was evaluated in;
    /// a scheduled B or S means the carried state already transitioned.
    pub fn from_latest_row(row: &SignalRow) -> Self {
        let position = match (row.position_status, row.next_open_action) {
            (PositionStatus::Flat, OpenAction::Buy) => PositionState::InPosition {
                // Provisional values; overwritten by the fill on the next bar.
                entry_date: row.tradeday,
                entry_price: row.close,
                stop_level: row.exit1,
            },
            (PositionStatus::Flat, _) => PositionState::Flat {
                stop_level: row.exit1,
            },
            (PositionStatus::InPosition, OpenAction::Sell) => PositionState::Flat {
                stop_level: row.exit1,
            },
            (PositionStatus::InPosition, _) => PositionState::InPosition {
                entry_date: row.entry_date.unwrap_or(row.tradeday),
                entry_price: row.entry_price,
                stop_level: row.exit1,
            },
        };
        Self {
            position,
            pending_action: row.next_open_action,
        }
    }
}

/// Advances the state machine by one bar. `bars` and `reference_bars` run
/// through today inclusive; the last bar is the one being processed.
/// Returns the ledger row for that day and mutates the carried state.
pub fn advance(
    state: &mut CarriedState,
    code: &str,
    bars: &[Bar],
    reference_bars: &[Bar],
    evaluator: &dyn SignalEvaluator,
) -> Result<SignalRow> {
    let today = bars
        .last()
        .ok_or_else(|| anyhow!("advance called with an empty bar window"))?;
    let energies: EnergyIndicators =
        evaluator.energy_indicators(today.date, bars, reference_bars)?;

    match state.position {
        PositionState::Flat { .. } => {
            // A sell scheduled yesterday fills at today's open.
            let exit_price = if state.pending_action == OpenAction::Sell {
                today.open
            } else {
                0.0
            };

            let buy = evaluator.evaluate_buy(bars, today.date, reference_bars)?;
            let action = if buy.signal {
                OpenAction::Buy
            } else {
                OpenAction::None
            };

            let row = SignalRow {
                code: code.to_string(),
                tradeday: today.date,
                position_status: PositionStatus::Flat,
                next_open_action: action,
                energies,
                exit1: buy.stop_loss,
                close: today.close,
                entry_price: today.close,
                entry_date: None,
                exit_price,
            };

            state.pending_action = action;
            state.position = if buy.signal {
                // Provisional entry; the fill overwrites it on the next bar.
                PositionState::InPosition {
                    entry_date: today.date,
                    entry_price: today.close,
                    stop_level: buy.stop_loss,
                }
            } else {
                PositionState::Flat {
                    stop_level: buy.stop_loss,
                }
            };

            Ok(row)
        }
        PositionState::InPosition {
            mut entry_date,
            mut entry_price,
            stop_level,
        } => {
            // A buy scheduled yesterday is realized at today's open before
            // the sell condition sees the position.
            if state.pending_action == OpenAction::Buy {
                entry_date = today.date;
                entry_price = today.open;
            }

            let sell = evaluator.evaluate_sell(
                bars,
                reference_bars,
                entry_date,
                entry_price,
                stop_level,
                today.date,
            )?;
            let action = if sell.signal {
                OpenAction::Sell
            } else {
                OpenAction::None
            };

            let row = SignalRow {
                code: code.to_string(),
                tradeday: today.date,
                position_status: PositionStatus::InPosition,
                next_open_action: action,
                energies,
                exit1: sell.stop_loss,
                close: today.close,
                entry_price,
                entry_date: Some(entry_date),
                exit_price: 0.0,
            };

            state.pending_action = action;
            state.position = if sell.signal {
                PositionState::Flat {
                    stop_level: sell.stop_loss,
                }
            } else {
                PositionState::InPosition {
                    entry_date,
                    entry_price,
                    stop_level: sell.stop_loss,
                }
            };

            Ok(row)
        }
    }
}

/// Runs the state machine for one security over its full bar history.
///
/// `bars` is the complete chronological sequence (the evaluators need the
/// full context); rows are emitted only for bars after the latest persisted
/// tradeday. With no prior history a seed row is emitted first, dated at
/// the later of the first bar date and `PROCESSING_START`.
///
/// The whole batch is buffered in memory; an evaluator error aborts the run
/// with nothing to append.
pub fn run_state_machine(
    code: &str,
    bars: &[Bar],
    reference_bars: &[Bar],
    latest: Option<&SignalRow>,
    evaluator: &dyn SignalEvaluator,
) -> Result<Vec<SignalRow>> {
    let mut batch = Vec::new();

    let (mut state, cursor) = match latest {
        Some(row) => (CarriedState::from_latest_row(row), row.tradeday),
        None => {
            let first_bar_date = match bars.first() {
                Some(bar) => bar.date,
                None => return Ok(batch),
            };
            let seed_date = first_bar_date.max(PROCESSING_START);
            let seed = SignalRow::seed(code, seed_date);
            let state = CarriedState::from_latest_row(&seed);
            batch.push(seed);
            (state, seed_date)
        }
    };

    for (index, bar) in bars.iter().enumerate() {
        if bar.date <= cursor {
            continue;
        }
        let reference_end = reference_bars.partition_point(|b| b.date <= bar.date);
        let row = advance(
            &mut state,
            code,
            &bars[..=index],
            &reference_bars[..reference_end],
            evaluator,
        )?;
        batch.push(row);
    }

    if !batch.is_empty() {
        info!(
            "Computed {} new signal row(s) for {} ({} - {})",
            batch.len(),
            code,
            batch[0].tradeday,
            batch[batch.len() - 1].tradeday
        );
    }

    Ok(batch)
}

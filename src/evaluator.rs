use crate::models::{Bar, EnergyIndicators};
use anyhow::Result;
use chrono::NaiveDate;

/// Outcome of the buy condition for one trading day.
#[derive(Debug, Clone, Copy)]
pub struct BuyEvaluation {
    pub signal: bool,
    pub stop_loss: f64,
}

/// Outcome of the sell condition for one trading day. `stop_loss` is the
/// updated trailing stop carried into the next day.
#[derive(Debug, Clone, Copy)]
pub struct SellEvaluation {
    pub signal: bool,
    pub stop_loss: f64,
}

/// The three opaque condition capabilities the state machine depends on.
/// Implementations must be deterministic for a given bar history.
pub trait SignalEvaluator: Send + Sync {
    fn evaluate_buy(
        &self,
        bars: &[Bar],
        as_of: NaiveDate,
        reference_bars: &[Bar],
    ) -> Result<BuyEvaluation>;

    #[allow(clippy::too_many_arguments)]
    fn evaluate_sell(
        &self,
        bars: &[Bar],
        reference_bars: &[Bar],
        entry_date: NaiveDate,
        entry_price: f64,
        stop_level: f64,
        as_of: NaiveDate,
    ) -> Result<SellEvaluation>;

    fn energy_indicators(
        &self,
        as_of: NaiveDate,
        bars: &[Bar],
        reference_bars: &[Bar],
    ) -> Result<EnergyIndicators>;
}

#[path = "evaluators/momentum.rs"]
pub mod momentum;

pub use momentum::MomentumEvaluator;

pub fn create_evaluator(name: &str) -> Result<Box<dyn SignalEvaluator>> {
    match name {
        "momentum" => Ok(Box::new(MomentumEvaluator::default())),
        _ => Err(anyhow::anyhow!("Unknown evaluator '{}'", name)),
    }
}

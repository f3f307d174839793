use super::{BuyEvaluation, SellEvaluation, SignalEvaluator};
use crate::models::{Bar, EnergyIndicators};
use anyhow::Result;
use chrono::NaiveDate;

/// Channel-breakout evaluator with a ratcheting range-based trailing stop.
/// Buys when the close breaks above the highest high of the lookback
/// channel, sells once the close falls through the trailing stop.
pub struct MomentumEvaluator {
    channel_period: usize,
    range_period: usize,
    stop_multiplier: f64,
}

impl Default for MomentumEvaluator {
    fn default() -> Self {
        Self {
            channel_period: 20,
            range_period: 14,
            stop_multiplier: 2.0,
        }
    }
}

impl MomentumEvaluator {
    /// Average true range over the trailing window ending at the last bar.
    fn average_range(&self, bars: &[Bar]) -> f64 {
        if bars.len() < 2 {
            return 0.0;
        }
        let start = bars.len().saturating_sub(self.range_period + 1);
        let window = &bars[start..];
        let mut sum = 0.0;
        let mut count = 0usize;
        for pair in window.windows(2) {
            let prev_close = pair[0].close;
            let bar = &pair[1];
            let true_range = (bar.high - bar.low)
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs());
            sum += true_range;
            count += 1;
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    fn trailing_stop(&self, bars: &[Bar]) -> f64 {
        let today = match bars.last() {
            Some(bar) => bar,
            None => return 0.0,
        };
        let range = self.average_range(bars);
        (today.close - self.stop_multiplier * range).max(0.0)
    }
}

fn momentum_percent(bars: &[Bar], days: usize) -> f64 {
    if bars.len() <= days {
        return 0.0;
    }
    let current = bars[bars.len() - 1].close;
    let past = bars[bars.len() - 1 - days].close;
    if past == 0.0 {
        return 0.0;
    }
    (current - past) / past * 100.0
}

impl SignalEvaluator for MomentumEvaluator {
    fn evaluate_buy(
        &self,
        bars: &[Bar],
        _as_of: NaiveDate,
        _reference_bars: &[Bar],
    ) -> Result<BuyEvaluation> {
        if bars.len() <= self.channel_period {
            return Ok(BuyEvaluation {
                signal: false,
                stop_loss: 0.0,
            });
        }

        let today = &bars[bars.len() - 1];
        let channel = &bars[bars.len() - 1 - self.channel_period..bars.len() - 1];
        let channel_high = channel.iter().map(|b| b.high).fold(f64::MIN, f64::max);

        let signal = today.close > channel_high;
        Ok(BuyEvaluation {
            signal,
            stop_loss: self.trailing_stop(bars),
        })
    }

    fn evaluate_sell(
        &self,
        bars: &[Bar],
        _reference_bars: &[Bar],
        _entry_date: NaiveDate,
        _entry_price: f64,
        stop_level: f64,
        _as_of: NaiveDate,
    ) -> Result<SellEvaluation> {
        let today = match bars.last() {
            Some(bar) => bar,
            None => {
                return Ok(SellEvaluation {
                    signal: false,
                    stop_loss: stop_level,
                })
            }
        };

        // Stop only ratchets upward while the position is open.
        let new_stop = self.trailing_stop(bars).max(stop_level);
        let signal = stop_level > 0.0 && today.close < stop_level;
        Ok(SellEvaluation {
            signal,
            stop_loss: new_stop,
        })
    }

    fn energy_indicators(
        &self,
        _as_of: NaiveDate,
        bars: &[Bar],
        reference_bars: &[Bar],
    ) -> Result<EnergyIndicators> {
        let e1 = momentum_percent(bars, 5);
        let e2 = momentum_percent(bars, 10);
        let e3 = momentum_percent(bars, 20);

        // Volume pressure: today's volume relative to the 20-day average.
        let e4 = if bars.len() > 1 {
            let start = bars.len().saturating_sub(21);
            let window = &bars[start..bars.len() - 1];
            let avg = window.iter().map(|b| b.volume as f64).sum::<f64>() / window.len() as f64;
            if avg > 0.0 {
                bars[bars.len() - 1].volume as f64 / avg
            } else {
                0.0
            }
        } else {
            0.0
        };

        // Relative strength against the reference security.
        let e5 = momentum_percent(bars, 20) - momentum_percent(reference_bars, 20);

        Ok(EnergyIndicators { e1, e2, e3, e4, e5 })
    }
}

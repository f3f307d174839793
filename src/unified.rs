use crate::models::{
    ExitPrice, OpenAction, PositionStatus, SignalRow, SignalSource, StopSignal, UnifiedSignal,
};
use log::warn;

/// Collapses a chronological ledger row sequence into trade-level signals.
/// An I-row whose predecessor flagged `B` opens a trade at that row's
/// recorded fill; an F-row whose predecessor flagged `S` closes it. A trade
/// still open after the last row is emitted with the open-position sentinel.
pub fn unify_ledger_rows(rows: &[SignalRow]) -> Vec<UnifiedSignal> {
    let mut rows: Vec<&SignalRow> = rows.iter().collect();
    rows.sort_by_key(|row| row.tradeday);

    let mut signals = Vec::new();
    let mut open: Option<OpenTrade> = None;

    for pair in rows.windows(2) {
        let previous = pair[0];
        let current = pair[1];

        match (previous.next_open_action, current.position_status) {
            (OpenAction::Buy, PositionStatus::InPosition) => {
                if open.is_some() {
                    warn!(
                        "Overlapping open trade at {} for {}; keeping the earlier one",
                        current.tradeday, current.code
                    );
                    continue;
                }
                open = Some(OpenTrade {
                    buy_signal: current.entry_date,
                    entry_price: current.entry_price,
                    day_before_buy: Some(previous.tradeday),
                });
            }
            (OpenAction::Sell, PositionStatus::Flat) => match open.take() {
                Some(trade) => {
                    let gain_lose = Some(current.exit_price - trade.entry_price);
                    signals.push(UnifiedSignal {
                        buy_signal: trade.buy_signal,
                        stop_signal: StopSignal::Date(current.tradeday),
                        entry_price: trade.entry_price,
                        exit_price: ExitPrice::Price(current.exit_price),
                        day_before_buy: trade.day_before_buy,
                        day_before_sell: Some(previous.tradeday),
                        gain_lose,
                        source: SignalSource::Ledger,
                    });
                }
                // A close with no recorded open still counts as a signal.
                None => signals.push(UnifiedSignal {
                    buy_signal: None,
                    stop_signal: StopSignal::Date(current.tradeday),
                    entry_price: 0.0,
                    exit_price: ExitPrice::Price(current.exit_price),
                    day_before_buy: None,
                    day_before_sell: Some(previous.tradeday),
                    gain_lose: None,
                    source: SignalSource::Ledger,
                }),
            },
            _ => {}
        }
    }

    if let Some(trade) = open {
        signals.push(UnifiedSignal {
            buy_signal: trade.buy_signal,
            stop_signal: StopSignal::OpenPosition,
            entry_price: trade.entry_price,
            exit_price: ExitPrice::OpenPosition,
            day_before_buy: trade.day_before_buy,
            day_before_sell: None,
            gain_lose: None,
            source: SignalSource::Ledger,
        });
    }

    signals
}

struct OpenTrade {
    buy_signal: Option<chrono::NaiveDate>,
    entry_price: f64,
    day_before_buy: Option<chrono::NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(
        tradeday: NaiveDate,
        status: PositionStatus,
        action: OpenAction,
    ) -> SignalRow {
        let mut row = SignalRow::seed("0838", tradeday);
        row.position_status = status;
        row.next_open_action = action;
        row
    }

    #[test]
    fn closed_trade_spans_fill_to_exit() {
        let d = |day| date(2021, 3, day);
        let mut fill = row(d(3), PositionStatus::InPosition, OpenAction::None);
        fill.entry_date = Some(d(3));
        fill.entry_price = 10.0;
        let mut exit = row(d(5), PositionStatus::Flat, OpenAction::None);
        exit.exit_price = 12.5;

        let rows = vec![
            row(d(1), PositionStatus::Flat, OpenAction::None),
            row(d(2), PositionStatus::Flat, OpenAction::Buy),
            fill,
            row(d(4), PositionStatus::InPosition, OpenAction::Sell),
            exit,
        ];

        let signals = unify_ledger_rows(&rows);
        assert_eq!(signals.len(), 1);
        let trade = &signals[0];
        assert_eq!(trade.buy_signal, Some(d(3)));
        assert_eq!(trade.stop_signal, StopSignal::Date(d(5)));
        assert_eq!(trade.entry_price, 10.0);
        assert_eq!(trade.exit_price, ExitPrice::Price(12.5));
        assert_eq!(trade.day_before_buy, Some(d(2)));
        assert_eq!(trade.day_before_sell, Some(d(4)));
        assert_eq!(trade.gain_lose, Some(2.5));
        assert_eq!(trade.source, SignalSource::Ledger);
    }

    #[test]
    fn trailing_open_trade_uses_sentinels() {
        let d = |day| date(2021, 3, day);
        let mut fill = row(d(3), PositionStatus::InPosition, OpenAction::None);
        fill.entry_date = Some(d(3));
        fill.entry_price = 8.0;

        let rows = vec![
            row(d(2), PositionStatus::Flat, OpenAction::Buy),
            fill,
        ];

        let signals = unify_ledger_rows(&rows);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].stop_signal, StopSignal::OpenPosition);
        assert_eq!(signals[0].exit_price, ExitPrice::OpenPosition);
        assert_eq!(signals[0].gain_lose, None);
    }

    #[test]
    fn close_without_open_yields_buyless_signal() {
        let d = |day| date(2021, 3, day);
        let mut exit = row(d(3), PositionStatus::Flat, OpenAction::None);
        exit.exit_price = 9.0;

        let rows = vec![
            row(d(2), PositionStatus::InPosition, OpenAction::Sell),
            exit,
        ];

        let signals = unify_ledger_rows(&rows);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].buy_signal, None);
        assert_eq!(signals[0].stop_signal, StopSignal::Date(d(3)));
        assert_eq!(signals[0].gain_lose, None);
    }

    #[test]
    fn unsorted_input_is_ordered_before_scanning() {
        let d = |day| date(2021, 3, day);
        let mut fill = row(d(3), PositionStatus::InPosition, OpenAction::None);
        fill.entry_date = Some(d(3));
        fill.entry_price = 8.0;

        let rows = vec![fill, row(d(2), PositionStatus::Flat, OpenAction::Buy)];
        let signals = unify_ledger_rows(&rows);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].buy_signal, Some(d(3)));
    }

    #[test]
    fn flat_only_history_yields_no_signals() {
        let d = |day| date(2021, 3, day);
        let rows = vec![
            row(d(1), PositionStatus::Flat, OpenAction::None),
            row(d(2), PositionStatus::Flat, OpenAction::None),
        ];
        assert!(unify_ledger_rows(&rows).is_empty());
    }
}

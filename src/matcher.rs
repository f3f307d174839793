use crate::models::{StopSignal, UnifiedSignal};
use chrono::NaiveDate;
use log::info;

/// Maximum trading-day index distance treated as an execution-timing
/// deviation rather than a real discrepancy.
pub const DEVIATION_TOLERANCE_DAYS: usize = 2;

#[derive(Debug)]
pub struct MatchOutcome {
    pub exact_matches: usize,
    pub deviation_matches: usize,
    pub unmatched_reference: Vec<UnifiedSignal>,
    pub unmatched_ledger: Vec<UnifiedSignal>,
}

/// Greedy first-fit matching of the reference signal sequence against the
/// ledger-derived one. For each reference signal the remaining ledger pool
/// is scanned in order; an exact `(buy_signal, stop_signal)` match wins,
/// otherwise a candidate within the ±2 trading-day tolerance on both legs
/// counts as a deviation. A consumed candidate leaves the pool. No
/// backtracking and no globally optimal assignment: an earlier reference
/// item can greedily take a candidate a later item would have matched
/// exactly, and that order dependence is intentional, preserved behavior.
///
/// The calendar carries one slot per feed record; `None` holes (records
/// whose tradeday failed to parse) still count toward index distances.
pub fn reconcile_signals(
    reference: &[UnifiedSignal],
    ledger: Vec<UnifiedSignal>,
    calendar: &[Option<NaiveDate>],
) -> MatchOutcome {
    let mut pool = ledger;
    let mut exact_matches = 0usize;
    let mut deviation_matches = 0usize;
    let mut unmatched_reference = Vec::new();

    for reference_item in reference {
        let mut found = false;
        let mut index = 0usize;
        while index < pool.len() {
            let candidate = &pool[index];

            if reference_item.buy_signal == candidate.buy_signal
                && reference_item.stop_signal == candidate.stop_signal
            {
                exact_matches += 1;
                pool.remove(index);
                found = true;
                break;
            }

            if buy_within_tolerance(reference_item, candidate, calendar)
                && stop_within_tolerance(reference_item, candidate, calendar)
            {
                deviation_matches += 1;
                pool.remove(index);
                found = true;
                break;
            }

            index += 1;
        }

        if !found {
            unmatched_reference.push(reference_item.clone());
        }
    }

    MatchOutcome {
        exact_matches,
        deviation_matches,
        unmatched_reference,
        unmatched_ledger: pool,
    }
}

fn calendar_index(date: NaiveDate, calendar: &[Option<NaiveDate>], side: &str) -> Option<usize> {
    let index = calendar.iter().position(|day| *day == Some(date));
    if index.is_none() {
        info!("{} signal {} not found in the trading calendar", side, date);
    }
    index
}

fn buy_within_tolerance(
    reference_item: &UnifiedSignal,
    candidate: &UnifiedSignal,
    calendar: &[Option<NaiveDate>],
) -> bool {
    let (Some(reference_buy), Some(candidate_buy)) =
        (reference_item.buy_signal, candidate.buy_signal)
    else {
        return false;
    };
    let (Some(a), Some(b)) = (
        calendar_index(reference_buy, calendar, "Reference buy"),
        calendar_index(candidate_buy, calendar, "Ledger buy"),
    ) else {
        return false;
    };
    a.abs_diff(b) <= DEVIATION_TOLERANCE_DAYS
}

fn stop_within_tolerance(
    reference_item: &UnifiedSignal,
    candidate: &UnifiedSignal,
    calendar: &[Option<NaiveDate>],
) -> bool {
    match (reference_item.stop_signal, candidate.stop_signal) {
        (StopSignal::Date(reference_stop), StopSignal::Date(candidate_stop)) => {
            let (Some(a), Some(b)) = (
                calendar_index(reference_stop, calendar, "Reference stop"),
                calendar_index(candidate_stop, calendar, "Ledger stop"),
            ) else {
                return false;
            };
            a.abs_diff(b) <= DEVIATION_TOLERANCE_DAYS
        }
        // Both open positions agree; a sentinel never matches a concrete date.
        (StopSignal::OpenPosition, StopSignal::OpenPosition) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExitPrice, SignalSource};
    use chrono::Duration;

    fn calendar(days: usize) -> Vec<NaiveDate> {
        let base = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        (0..days).map(|i| base + Duration::days(i as i64)).collect()
    }

    fn slots(days: &[NaiveDate]) -> Vec<Option<NaiveDate>> {
        days.iter().copied().map(Some).collect()
    }

    fn signal(
        buy: Option<NaiveDate>,
        stop: StopSignal,
        source: SignalSource,
    ) -> UnifiedSignal {
        UnifiedSignal {
            buy_signal: buy,
            stop_signal: stop,
            entry_price: 10.0,
            exit_price: ExitPrice::Price(11.0),
            day_before_buy: None,
            day_before_sell: None,
            gain_lose: None,
            source,
        }
    }

    #[test]
    fn identical_pair_counts_exact_and_consumes_one_candidate() {
        let days = calendar(11);
        let reference = vec![
            signal(Some(days[1]), StopSignal::Date(days[4]), SignalSource::Reference),
            signal(Some(days[1]), StopSignal::Date(days[4]), SignalSource::Reference),
        ];
        let ledger = vec![signal(
            Some(days[1]),
            StopSignal::Date(days[4]),
            SignalSource::Ledger,
        )];

        let outcome = reconcile_signals(&reference, ledger, &slots(&days));
        assert_eq!(outcome.exact_matches, 1);
        assert_eq!(outcome.deviation_matches, 0);
        assert_eq!(outcome.unmatched_reference.len(), 1);
        assert!(outcome.unmatched_ledger.is_empty());
    }

    #[test]
    fn buy_distance_two_matches_distance_three_does_not() {
        let days = calendar(11);
        let reference = vec![signal(
            Some(days[5]),
            StopSignal::OpenPosition,
            SignalSource::Reference,
        )];

        let near = vec![signal(Some(days[7]), StopSignal::OpenPosition, SignalSource::Ledger)];
        let outcome = reconcile_signals(&reference, near, &slots(&days));
        assert_eq!(outcome.deviation_matches, 1);

        let far = vec![signal(Some(days[8]), StopSignal::OpenPosition, SignalSource::Ledger)];
        let outcome = reconcile_signals(&reference, far, &slots(&days));
        assert_eq!(outcome.deviation_matches, 0);
        assert_eq!(outcome.unmatched_reference.len(), 1);
        assert_eq!(outcome.unmatched_ledger.len(), 1);
    }

    #[test]
    fn open_position_sentinel_never_matches_concrete_stop() {
        let days = calendar(11);
        let reference = vec![signal(
            Some(days[5]),
            StopSignal::OpenPosition,
            SignalSource::Reference,
        )];
        let ledger = vec![signal(
            Some(days[5]),
            StopSignal::Date(days[9]),
            SignalSource::Ledger,
        )];

        let outcome = reconcile_signals(&reference, ledger, &slots(&days));
        assert_eq!(outcome.exact_matches, 0);
        assert_eq!(outcome.deviation_matches, 0);
        assert_eq!(outcome.unmatched_reference.len(), 1);
    }

    #[test]
    fn absent_buy_on_either_side_fails_the_buy_leg() {
        let days = calendar(11);
        let reference = vec![signal(
            None,
            StopSignal::Date(days[4]),
            SignalSource::Reference,
        )];
        let ledger = vec![signal(
            Some(days[1]),
            StopSignal::Date(days[4]),
            SignalSource::Ledger,
        )];

        let outcome = reconcile_signals(&reference, ledger, &slots(&days));
        assert_eq!(outcome.exact_matches, 0);
        assert_eq!(outcome.deviation_matches, 0);
    }

    #[test]
    fn missing_buy_on_both_sides_compares_equal_exactly() {
        let days = calendar(11);
        let reference = vec![signal(
            None,
            StopSignal::Date(days[4]),
            SignalSource::Reference,
        )];
        let ledger = vec![signal(None, StopSignal::Date(days[4]), SignalSource::Ledger)];

        let outcome = reconcile_signals(&reference, ledger, &slots(&days));
        assert_eq!(outcome.exact_matches, 1);
    }

    #[test]
    fn date_outside_calendar_fails_the_leg() {
        let days = calendar(11);
        let stray = NaiveDate::from_ymd_opt(2022, 6, 1).unwrap();
        let reference = vec![signal(
            Some(stray),
            StopSignal::OpenPosition,
            SignalSource::Reference,
        )];
        let ledger = vec![signal(
            Some(days[5]),
            StopSignal::OpenPosition,
            SignalSource::Ledger,
        )];

        let outcome = reconcile_signals(&reference, ledger, &slots(&days));
        assert_eq!(outcome.deviation_matches, 0);
        assert_eq!(outcome.unmatched_reference.len(), 1);
    }

    #[test]
    fn calendar_holes_count_toward_index_distance() {
        // A record whose tradeday failed to parse still occupies a slot,
        // so distances reflect feed record positions, not parsed dates.
        let days = calendar(6);
        let reference = vec![signal(
            Some(days[0]),
            StopSignal::OpenPosition,
            SignalSource::Reference,
        )];

        let one_hole = vec![Some(days[0]), None, Some(days[2]), Some(days[3])];
        let ledger = vec![signal(Some(days[2]), StopSignal::OpenPosition, SignalSource::Ledger)];
        let outcome = reconcile_signals(&reference, ledger, &one_hole);
        assert_eq!(outcome.deviation_matches, 1);

        let two_holes = vec![Some(days[0]), None, None, Some(days[2]), Some(days[3])];
        let ledger = vec![signal(Some(days[2]), StopSignal::OpenPosition, SignalSource::Ledger)];
        let outcome = reconcile_signals(&reference, ledger, &two_holes);
        assert_eq!(outcome.deviation_matches, 0);
        assert_eq!(outcome.unmatched_reference.len(), 1);
    }

    #[test]
    fn first_fit_greedy_consumption_is_order_dependent() {
        // The first reference item takes the candidate that the second
        // would have matched exactly. Documented behavior, not a bug.
        let days = calendar(11);
        let reference = vec![
            signal(Some(days[2]), StopSignal::OpenPosition, SignalSource::Reference),
            signal(Some(days[3]), StopSignal::OpenPosition, SignalSource::Reference),
        ];
        let ledger = vec![signal(
            Some(days[3]),
            StopSignal::OpenPosition,
            SignalSource::Ledger,
        )];

        let outcome = reconcile_signals(&reference, ledger, &slots(&days));
        assert_eq!(outcome.exact_matches, 0);
        assert_eq!(outcome.deviation_matches, 1);
        assert_eq!(outcome.unmatched_reference.len(), 1);
        assert_eq!(outcome.unmatched_reference[0].buy_signal, Some(days[3]));
    }
}

//! Eligibility filter (C5, §4.5): the seven-step precedence that turns a
//! candidate (symbol, snapshot, signal) into an `EntryEligibility` decision.
//! Pure and deterministic — the same inputs always yield the same output
//! (§8 "Eligibility determinism").

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::types::{EntryEligibility, PriceHistory, Snapshot, StrategySignal};

/// The edge-filter and eligibility thresholds from the closed configuration
/// surface (§6) that this filter consults.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityThresholds {
    pub max_spread_bps: Decimal,
    pub min_volume_ratio: Decimal,
    pub min_required_edge_bps: Decimal,
    pub slippage_buffer_bps: Decimal,
    pub adverse_selection_bps: Decimal,
}

/// Evaluates the seven-step precedence of §4.5 in order, returning the
/// first failing condition or `Eligible` if none trip.
#[allow(clippy::too_many_arguments)]
pub fn check_eligibility(
    symbol: &str,
    snapshot: &Snapshot,
    history: &PriceHistory,
    in_position: &HashSet<String>,
    pending_orders: &HashSet<String>,
    cooldowns: &HashMap<String, DateTime<Utc>>,
    signal: Option<&StrategySignal>,
    now: DateTime<Utc>,
    thresholds: EligibilityThresholds,
) -> EntryEligibility {
    if in_position.contains(symbol) {
        return EntryEligibility::BlockedByInPosition;
    }
    if pending_orders.contains(symbol) {
        return EntryEligibility::BlockedByPendingOrder;
    }

    if let Some(expiry) = cooldowns.get(symbol) {
        if now < *expiry {
            return EntryEligibility::BlockedByCooldown(*expiry);
        }
    }

    let spread_bps = match snapshot.spread_bps() {
        Some(bps) if bps <= thresholds.max_spread_bps => bps,
        Some(bps) => return EntryEligibility::BlockedBySpread(bps),
        None => return EntryEligibility::BlockedBySpread(Decimal::MAX),
    };

    let avg_volume = history.average_volume(20).unwrap_or(Decimal::ZERO);
    let ratio = if avg_volume.is_zero() { Decimal::ZERO } else { snapshot.latest_minute_volume / avg_volume };
    if ratio < thresholds.min_volume_ratio {
        return EntryEligibility::BlockedByVolume(ratio);
    }

    let net_edge_bps = thresholds.min_required_edge_bps
        - (spread_bps + thresholds.slippage_buffer_bps + thresholds.adverse_selection_bps);
    if net_edge_bps < Decimal::ZERO {
        return EntryEligibility::BlockedByEdge(net_edge_bps);
    }

    match signal {
        Some(s) if s.should_buy => EntryEligibility::Eligible,
        _ => EntryEligibility::NoSignal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn thresholds() -> EligibilityThresholds {
        EligibilityThresholds {
            max_spread_bps: dec!(30),
            min_volume_ratio: dec!(0.5),
            min_required_edge_bps: dec!(5),
            slippage_buffer_bps: dec!(1),
            adverse_selection_bps: dec!(1),
        }
    }

    fn snapshot(bid: Decimal, ask: Decimal, volume: Decimal) -> Snapshot {
        Snapshot {
            trade_price: (bid + ask) / dec!(2),
            trade_timestamp: Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap(),
            bid,
            ask,
            previous_daily_close: bid,
            latest_minute_volume: volume,
        }
    }

    fn history_with_volume(avg: Decimal) -> PriceHistory {
        let mut h = PriceHistory::new(100);
        let ts = Utc.with_ymd_and_hms(2026, 3, 5, 9, 30, 0).unwrap();
        for i in 0..20 {
            h.append_bar(crate::types::Bar::new(ts + chrono::Duration::minutes(i), dec!(100), dec!(100), dec!(100), dec!(100), avg));
        }
        h
    }

    #[test]
    fn blocked_by_in_position_takes_precedence_over_everything() {
        let mut in_position = HashSet::new();
        in_position.insert("AAPL".to_string());
        let result = check_eligibility(
            "AAPL",
            &snapshot(dec!(100), dec!(100.02), dec!(1000)),
            &history_with_volume(dec!(1000)),
            &in_position,
            &HashSet::new(),
            &HashMap::new(),
            None,
            Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap(),
            thresholds(),
        );
        assert_eq!(result, EntryEligibility::BlockedByInPosition);
    }

    #[test]
    fn wide_spread_blocks_entry() {
        let result = check_eligibility(
            "AAPL",
            &snapshot(dec!(100), dec!(101), dec!(1000)),
            &history_with_volume(dec!(1000)),
            &HashSet::new(),
            &HashSet::new(),
            &HashMap::new(),
            None,
            Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap(),
            thresholds(),
        );
        assert!(matches!(result, EntryEligibility::BlockedBySpread(_)));
    }

    #[test]
    fn thin_volume_blocks_entry() {
        let result = check_eligibility(
            "AAPL",
            &snapshot(dec!(100), dec!(100.02), dec!(100)),
            &history_with_volume(dec!(1000)),
            &HashSet::new(),
            &HashSet::new(),
            &HashMap::new(),
            None,
            Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap(),
            thresholds(),
        );
        assert!(matches!(result, EntryEligibility::BlockedByVolume(_)));
    }

    #[test]
    fn no_signal_when_nothing_fired() {
        let result = check_eligibility(
            "AAPL",
            &snapshot(dec!(100), dec!(100.02), dec!(1000)),
            &history_with_volume(dec!(1000)),
            &HashSet::new(),
            &HashSet::new(),
            &HashMap::new(),
            None,
            Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap(),
            thresholds(),
        );
        assert_eq!(result, EntryEligibility::NoSignal);
    }

    #[test]
    fn eligibility_is_deterministic() {
        let snap = snapshot(dec!(100), dec!(100.02), dec!(1000));
        let history = history_with_volume(dec!(1000));
        let signal = StrategySignal::buy("ma_crossover", dec!(0.8), "test");
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap();
        let first = check_eligibility("AAPL", &snap, &history, &HashSet::new(), &HashSet::new(), &HashMap::new(), Some(&signal), now, thresholds());
        let second = check_eligibility("AAPL", &snap, &history, &HashSet::new(), &HashSet::new(), &HashMap::new(), Some(&signal), now, thresholds());
        assert_eq!(first, second);
    }
}

//! Five pure strategy evaluators (C2, §4.2). Each takes a read-only
//! `PriceHistory` (and, for relative strength, the full peer map) and
//! returns a `StrategySignal` — no strategy retains state between calls,
//! unlike the teacher's stateful `Strategy` trait objects that carried
//! their own indicator state across candles.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::{PriceHistory, StrategySignal};

/// Fixed precedence order from §4.2's table — the first fired-and-enabled
/// signal for a symbol wins within one cycle.
pub const PRECEDENCE: [&str; 5] = [
    "ma_crossover",
    "mean_reversion",
    "volatility_breakout",
    "relative_strength",
    "volume_surge",
];

/// Momentum-family strategies suppressed by the high-noise regime gate.
const MOMENTUM_FAMILY: [&str; 3] = ["ma_crossover", "volatility_breakout", "volume_surge"];

const MA_FAST: usize = 5;
const MA_SLOW: usize = 20;
const BREAKOUT_LOOKBACK: usize = 4;
const HIGH_NOISE_THRESHOLD: Decimal = dec!(0.015);
const LOW_NOISE_THRESHOLD: Decimal = dec!(0.005);

/// 5-bar MA crosses above the 20-bar MA between the previous and current bar.
pub fn ma_crossover(history: &PriceHistory) -> StrategySignal {
    let name = "ma_crossover";
    let (fast_prev, slow_prev, fast_cur, slow_cur) = match (
        history.moving_average_ending(MA_FAST, 1),
        history.moving_average_ending(MA_SLOW, 1),
        history.moving_average_ending(MA_FAST, 0),
        history.moving_average_ending(MA_SLOW, 0),
    ) {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        _ => return StrategySignal::no_signal(name, "fewer than 21 closes"),
    };

    if fast_prev <= slow_prev && fast_cur > slow_cur {
        let gap_pct = if slow_cur.is_zero() { Decimal::ZERO } else { (fast_cur - slow_cur) / slow_cur };
        let confidence = (gap_pct * dec!(50)).clamp(dec!(0.5), Decimal::ONE);
        StrategySignal::buy(
            name,
            confidence,
            format!("5-bar MA {fast_cur:.4} crossed above 20-bar MA {slow_cur:.4}"),
        )
    } else {
        StrategySignal::no_signal(name, "no crossover")
    }
}

/// `(close − MA₂₀) / σ < −2.0`, where σ is return-volatility and the price
/// deviation is expressed as a fraction of MA₂₀ before dividing, so the
/// ratio is dimensionless (§4.2; the raw formula leaves this normalization
/// implicit).
pub fn mean_reversion(history: &PriceHistory) -> StrategySignal {
    let name = "mean_reversion";
    let ma20 = match history.moving_average(MA_SLOW) {
        Some(ma) => ma,
        None => return StrategySignal::no_signal(name, "fewer than 20 closes"),
    };
    let sigma = match history.volatility() {
        Some(s) if s >= dec!(0.0001) => s,
        _ => return StrategySignal::no_signal(name, "volatility below floor"),
    };
    let close = match history.last() {
        Some(b) => b.close,
        None => return StrategySignal::no_signal(name, "no bars"),
    };
    if ma20.is_zero() {
        return StrategySignal::no_signal(name, "MA is zero");
    }

    let deviation_pct = (close - ma20) / ma20;
    let z = deviation_pct / sigma;
    if z < dec!(-2.0) {
        let confidence = ((-z) / dec!(4.0)).clamp(dec!(0.5), Decimal::ONE);
        StrategySignal::buy(name, confidence, format!("z-score {z:.2} below -2.0"))
    } else {
        StrategySignal::no_signal(name, "not oversold")
    }
}

/// Mean absolute return over the last 4 bars exceeds 1.5x historical
/// return-volatility, and the current bar's change is positive.
pub fn volatility_breakout(history: &PriceHistory) -> StrategySignal {
    let name = "volatility_breakout";
    let recent = match history.recent_mean_abs_return(BREAKOUT_LOOKBACK) {
        Some(r) => r,
        None => return StrategySignal::no_signal(name, "fewer than 20 closes"),
    };
    let historical_vol = match history.volatility() {
        Some(v) => v,
        None => return StrategySignal::no_signal(name, "fewer than 20 closes"),
    };
    let change = history.last_change_pct();

    if recent > historical_vol * dec!(1.5) && change > Decimal::ZERO {
        let ratio = if historical_vol.is_zero() { Decimal::ONE } else { recent / historical_vol };
        let confidence = (ratio / dec!(3.0)).clamp(dec!(0.5), Decimal::ONE);
        StrategySignal::buy(name, confidence, format!("breakout: recent move {recent:.4} vs vol {historical_vol:.4}"))
    } else {
        StrategySignal::no_signal(name, "no breakout")
    }
}

/// Current bar's % change exceeds the mean % change across all
/// currently-tracked peer symbols by at least 0.5 percentage points.
pub fn relative_strength(symbol: &str, history: &PriceHistory, peers: &HashMap<String, PriceHistory>) -> StrategySignal {
    let name = "relative_strength";
    if peers.is_empty() {
        return StrategySignal::no_signal(name, "empty peer set");
    }
    let own_change = history.last_change_pct();
    let peer_changes: Vec<Decimal> = peers
        .iter()
        .filter(|(sym, _)| sym.as_str() != symbol)
        .map(|(_, h)| h.last_change_pct())
        .collect();
    if peer_changes.is_empty() {
        return StrategySignal::no_signal(name, "no peers besides self");
    }
    let mean_peer_change: Decimal = peer_changes.iter().sum::<Decimal>() / Decimal::from(peer_changes.len() as u64);

    let edge = own_change - mean_peer_change;
    if edge >= dec!(0.5) {
        let confidence = (edge / dec!(5.0)).clamp(dec!(0.5), Decimal::ONE);
        StrategySignal::buy(name, confidence, format!("outperforming peers by {edge:.2} pp"))
    } else {
        StrategySignal::no_signal(name, "not outperforming peers")
    }
}

/// Latest bar volume is at least 2x its 20-bar average and the bar's %
/// change exceeds 0.5%. Confidence scales with volume ratio, capped at 1.0.
pub fn volume_surge(history: &PriceHistory) -> StrategySignal {
    let name = "volume_surge";
    let avg_volume = match history.average_volume(MA_SLOW) {
        Some(v) if !v.is_zero() => v,
        _ => return StrategySignal::no_signal(name, "fewer than 20 volumes"),
    };
    let current_volume = match history.last() {
        Some(b) => b.volume,
        None => return StrategySignal::no_signal(name, "no bars"),
    };
    let change = history.last_change_pct();
    let ratio = current_volume / avg_volume;

    if ratio >= dec!(2.0) && change > dec!(0.5) {
        // Firing requires ratio >= 2.0, so anchor the floor there: 2.0x
        // average volume is the weakest possible confidence (0.5), scaling
        // up to 1.0 by 4.0x, matching the [0.5, 1.0] band the other four
        // strategies produce.
        let confidence = (ratio / dec!(4.0)).clamp(dec!(0.5), Decimal::ONE);
        StrategySignal::buy(name, confidence, format!("volume {ratio:.2}x average, change {change:.2}%"))
    } else {
        StrategySignal::no_signal(name, "no volume surge")
    }
}

/// Evaluates all five strategies in precedence order for one symbol,
/// applying the regime gates and volume-confidence rescaling, and returns
/// the first fired-and-enabled signal whose rescaled confidence meets
/// `min_confidence` (§4.2, §4.6 step "evaluate all five strategies").
///
/// `enabled` is the post-calibration set (C4); a disabled strategy's firing
/// is treated the same as not firing at all, so the next in precedence gets
/// a chance.
pub fn evaluate(
    symbol: &str,
    history: &PriceHistory,
    peers: &HashMap<String, PriceHistory>,
    enabled: &std::collections::HashSet<String>,
    min_confidence: Decimal,
) -> Option<StrategySignal> {
    let high_noise = history.recent_noise(BREAKOUT_LOOKBACK).map(|n| n > HIGH_NOISE_THRESHOLD).unwrap_or(false);
    let low_noise = history.recent_noise(BREAKOUT_LOOKBACK).map(|n| n < LOW_NOISE_THRESHOLD).unwrap_or(false);
    let volume_factor = history.volume_confidence_factor(MA_SLOW);

    for name in PRECEDENCE {
        if !enabled.contains(name) {
            continue;
        }
        if high_noise && MOMENTUM_FAMILY.contains(&name) {
            continue;
        }
        if low_noise && name == "mean_reversion" {
            continue;
        }

        let signal = match name {
            "ma_crossover" => ma_crossover(history),
            "mean_reversion" => mean_reversion(history),
            "volatility_breakout" => volatility_breakout(history),
            "relative_strength" => relative_strength(symbol, history, peers),
            "volume_surge" => volume_surge(history),
            _ => unreachable!("PRECEDENCE is exhaustive"),
        };

        if !signal.should_buy {
            continue;
        }
        let rescaled = signal.confidence / volume_factor;
        if rescaled >= min_confidence {
            return Some(StrategySignal { confidence: rescaled, ..signal });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Bar;
    use chrono::{TimeZone, Utc};

    fn bar_at(minute: i64, close: Decimal, volume: Decimal) -> Bar {
        let ts = Utc.with_ymd_and_hms(2026, 3, 5, 9, 30, 0).unwrap() + chrono::Duration::minutes(minute);
        Bar::new(ts, close, close, close, close, volume)
    }

    #[test]
    fn ma_crossover_needs_21_closes() {
        let mut h = PriceHistory::new(100);
        for i in 0..20 {
            h.append_bar(bar_at(i, Decimal::from(100), dec!(1000)));
        }
        assert!(!ma_crossover(&h).should_buy);
    }

    #[test]
    fn ma_crossover_fires_on_upward_cross() {
        let mut h = PriceHistory::new(100);
        for i in 0..20 {
            h.append_bar(bar_at(i, Decimal::from(100), dec!(1000)));
        }
        // A sharp final bar pulls the fast MA above the slow MA.
        h.append_bar(bar_at(20, Decimal::from(130), dec!(1000)));
        let signal = ma_crossover(&h);
        assert!(signal.should_buy);
    }

    #[test]
    fn volume_surge_requires_both_ratio_and_change() {
        let mut h = PriceHistory::new(100);
        for i in 0..19 {
            h.append_bar(bar_at(i, dec!(100), dec!(1000)));
        }
        h.append_bar(bar_at(19, dec!(101), dec!(5000)));
        let signal = volume_surge(&h);
        assert!(signal.should_buy);
        assert!(signal.confidence <= Decimal::ONE);
    }

    #[test]
    fn relative_strength_needs_nonempty_peers() {
        let mut h = PriceHistory::new(100);
        h.append_bar(bar_at(0, dec!(100), dec!(1000)));
        let peers = HashMap::new();
        assert!(!relative_strength("AAPL", &h, &peers).should_buy);
    }

    #[test]
    fn evaluate_returns_none_when_nothing_enabled() {
        let mut h = PriceHistory::new(100);
        for i in 0..25 {
            h.append_bar(bar_at(i, Decimal::from(100 + i), dec!(1000)));
        }
        let peers = HashMap::new();
        let enabled = std::collections::HashSet::new();
        assert!(evaluate("AAPL", &h, &peers, &enabled, dec!(0.7)).is_none());
    }

    #[test]
    fn evaluate_respects_precedence_order() {
        let mut h = PriceHistory::new(100);
        for i in 0..20 {
            h.append_bar(bar_at(i, Decimal::from(100), dec!(1000)));
        }
        h.append_bar(bar_at(20, Decimal::from(130), dec!(1000)));
        let peers = HashMap::new();
        let enabled: std::collections::HashSet<String> = PRECEDENCE.iter().map(|s| s.to_string()).collect();
        let signal = evaluate("AAPL", &h, &peers, &enabled, dec!(0.1)).unwrap();
        assert_eq!(signal.name, "ma_crossover");
    }
}

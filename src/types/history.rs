use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;

use super::bar::Bar;

/// Minimum retained capacity mandated by §3 ("bounded capacity (≥ 100)").
pub const MIN_CAPACITY: usize = 100;

/// Rolling per-symbol series of bars with derived statistics (C1).
///
/// Backed by a `VecDeque` so `append_bar` is amortized O(1) even on overflow
/// eviction — the teacher's `CandleBuffer` used `Vec::remove(0)`, which is
/// O(n) and does not satisfy §4.1's ring-buffer requirement.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    capacity: usize,
    bars: VecDeque<Bar>,
    last_trade_timestamp: Option<DateTime<Utc>>,
    last_change_pct: Decimal,
}

impl PriceHistory {
    /// The `>= 100` floor (§3) is enforced by production call sites, which
    /// always pass [`MIN_CAPACITY`] — not by this constructor, so tests can
    /// still construct a small history to exercise eviction directly.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            bars: VecDeque::with_capacity(capacity),
            last_trade_timestamp: None,
            last_change_pct: Decimal::ZERO,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    /// Bars ordered oldest-first.
    pub fn bars(&self) -> impl Iterator<Item = &Bar> {
        self.bars.iter()
    }

    /// Appends a bar, evicting the oldest entry on overflow. Amortized O(1).
    pub fn append_bar(&mut self, bar: Bar) {
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
    }

    /// Appends a synthetic one-point bar derived from a trade print, but only
    /// if `trade_timestamp` differs from the last one appended; otherwise a
    /// no-op that preserves the previously-derived `change_percent` (§4.1).
    ///
    /// This prevents a repeated broker snapshot of an unchanged last trade
    /// from polluting moving averages with a false zero-delta bar.
    pub fn append_trade(&mut self, price: Decimal, volume: Decimal, trade_timestamp: DateTime<Utc>) {
        if self.last_trade_timestamp == Some(trade_timestamp) {
            return;
        }
        let previous_close = self.last().map(|b| b.close).unwrap_or(price);
        let bar = Bar::new(trade_timestamp, previous_close, price.max(previous_close), price.min(previous_close), price, volume);
        self.last_change_pct = bar.change_pct(previous_close);
        self.append_bar(bar);
        self.last_trade_timestamp = Some(trade_timestamp);
    }

    pub fn last_change_pct(&self) -> Decimal {
        self.last_change_pct
    }

    /// Moving average of `close` over the last `k` bars. Returns `None`
    /// ("not enough data") when `len() < k`, per §4.1 — callers must check
    /// before use rather than receiving a misleading partial average.
    pub fn moving_average(&self, k: usize) -> Option<Decimal> {
        self.moving_average_ending(k, 0)
    }

    /// Moving average of `close` over `k` bars, ending `offset` bars before
    /// the most recent one. `offset = 0` is the current window; `offset = 1`
    /// is "as of the previous bar" — used by MA crossover (§4.2) to compare
    /// the fast/slow relationship one bar apart without re-slicing history.
    pub fn moving_average_ending(&self, k: usize, offset: usize) -> Option<Decimal> {
        if k == 0 || self.bars.len() < k + offset {
            return None;
        }
        let sum: Decimal = self.bars.iter().rev().skip(offset).take(k).map(|b| b.close).sum();
        Some(sum / Decimal::from(k as u64))
    }

    /// Mean absolute one-bar return over the last `k` bars — the numerator of
    /// the volatility-breakout firing condition (§4.2).
    pub fn recent_mean_abs_return(&self, k: usize) -> Option<Decimal> {
        let returns = self.returns();
        if returns.len() < k || k == 0 {
            return None;
        }
        let sum: Decimal = returns.iter().rev().take(k).map(|r| r.abs()).sum();
        Some(sum / Decimal::from(k as u64))
    }

    /// Per-bar simple returns `r_i = (p_i - p_{i-1}) / p_{i-1}`, oldest first.
    fn returns(&self) -> Vec<Decimal> {
        self.bars
            .iter()
            .zip(self.bars.iter().skip(1))
            .filter(|(prev, _)| !prev.close.is_zero())
            .map(|(prev, cur)| (cur.close - prev.close) / prev.close)
            .collect()
    }

    /// Population standard deviation of one-bar returns. Price-level std-dev
    /// is intentionally not offered (§4.1 disallows it).
    pub fn volatility(&self) -> Option<Decimal> {
        let returns = self.returns();
        if returns.len() < 2 {
            return None;
        }
        let n = Decimal::from(returns.len() as u64);
        let mean: Decimal = returns.iter().sum::<Decimal>() / n;
        let variance: Decimal = returns.iter().map(|r| (*r - mean) * (*r - mean)).sum::<Decimal>() / n;
        variance.sqrt()
    }

    /// Mean of `(high - low) / close` over the last `k` bars.
    pub fn recent_noise(&self, k: usize) -> Option<Decimal> {
        if self.bars.len() < k || k == 0 {
            return None;
        }
        let sum: Decimal = self.bars.iter().rev().take(k).map(|b| b.noise()).sum();
        Some(sum / Decimal::from(k as u64))
    }

    pub fn average_volume(&self, k: usize) -> Option<Decimal> {
        if self.bars.len() < k || k == 0 {
            return None;
        }
        let sum: Decimal = self.bars.iter().rev().take(k).map(|b| b.volume).sum();
        Some(sum / Decimal::from(k as u64))
    }

    /// Maps `current / avg` volume ratio to a scalar ≥ 1 that signal
    /// confidence is divided by (§4.2 confidence rescaling). Monotonically
    /// increases as volume falls below 0.75x its rolling average; is exactly
    /// 1 (no penalty) at or above that threshold.
    pub fn volume_confidence_factor(&self, lookback: usize) -> Decimal {
        let avg = match self.average_volume(lookback) {
            Some(a) if !a.is_zero() => a,
            _ => return Decimal::ONE,
        };
        let current = match self.last() {
            Some(b) => b.volume,
            None => return Decimal::ONE,
        };
        let ratio = current / avg;
        let threshold = Decimal::new(75, 2); // 0.75
        if ratio >= threshold {
            Decimal::ONE
        } else {
            // Scales up smoothly to a factor > 1 as ratio -> 0.
            (threshold / ratio.max(Decimal::new(1, 2))).min(Decimal::from(10))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn bar_at(minute: i64, close: Decimal) -> Bar {
        let ts = Utc.with_ymd_and_hms(2026, 3, 5, 9, 30, 0).unwrap() + chrono::Duration::minutes(minute);
        Bar::new(ts, close, close, close, close, dec!(1000))
    }

    #[test]
    fn append_bar_evicts_oldest_at_capacity() {
        let mut h = PriceHistory::new(3);
        for i in 0..5 {
            h.append_bar(bar_at(i, Decimal::from(i)));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.last().unwrap().close, Decimal::from(4));
        assert_eq!(h.bars().next().unwrap().close, Decimal::from(2));
    }

    #[test]
    fn append_trade_is_idempotent_for_same_timestamp() {
        let mut h = PriceHistory::new(MIN_CAPACITY);
        let ts = Utc.with_ymd_and_hms(2026, 3, 5, 9, 30, 0).unwrap();
        h.append_trade(dec!(100), dec!(10), ts);
        let len_after_first = h.len();
        let change_after_first = h.last_change_pct();

        h.append_trade(dec!(150), dec!(999), ts);

        assert_eq!(h.len(), len_after_first);
        assert_eq!(h.last_change_pct(), change_after_first);
    }

    #[test]
    fn moving_average_requires_enough_data() {
        let mut h = PriceHistory::new(MIN_CAPACITY);
        for i in 0..5 {
            h.append_bar(bar_at(i, Decimal::from(10 + i)));
        }
        assert!(h.moving_average(10).is_none());
        assert!(h.moving_average(5).is_some());
    }

    #[test]
    fn moving_average_ending_compares_previous_and_current_bar() {
        let mut h = PriceHistory::new(MIN_CAPACITY);
        for i in 0..25 {
            h.append_bar(bar_at(i, Decimal::from(i)));
        }
        let prev = h.moving_average_ending(5, 1).unwrap();
        let cur = h.moving_average_ending(5, 0).unwrap();
        assert!(cur > prev);
    }

    #[test]
    fn recent_mean_abs_return_requires_enough_bars() {
        let mut h = PriceHistory::new(MIN_CAPACITY);
        for i in 0..3 {
            h.append_bar(bar_at(i, Decimal::from(10 + i)));
        }
        assert!(h.recent_mean_abs_return(4).is_none());
    }

    #[test]
    fn volume_confidence_factor_is_one_when_volume_healthy() {
        let mut h = PriceHistory::new(MIN_CAPACITY);
        for i in 0..20 {
            h.append_bar(bar_at(i, dec!(100)));
        }
        assert_eq!(h.volume_confidence_factor(20), Decimal::ONE);
    }

    #[test]
    fn volume_confidence_factor_penalizes_thin_volume() {
        let mut h = PriceHistory::new(MIN_CAPACITY);
        for i in 0..19 {
            let ts = Utc.with_ymd_and_hms(2026, 3, 5, 9, 30, 0).unwrap() + chrono::Duration::minutes(i);
            h.append_bar(Bar::new(ts, dec!(100), dec!(100), dec!(100), dec!(100), dec!(1000)));
        }
        let ts = Utc.with_ymd_and_hms(2026, 3, 5, 9, 30, 0).unwrap() + chrono::Duration::minutes(19);
        h.append_bar(Bar::new(ts, dec!(100), dec!(100), dec!(100), dec!(100), dec!(100)));
        assert!(h.volume_confidence_factor(20) > Decimal::ONE);
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An immutable OHLCV observation over a fixed interval (15 minutes unless noted).
///
/// Timestamps are opaque to the core except that they are orderable and
/// originate from the broker at a declared bar size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self { timestamp, open, high, low, close, volume }
    }

    /// `(high - low) / close`, the per-bar noise measure §4.1's recent-noise
    /// statistic averages over a window.
    pub fn noise(&self) -> Decimal {
        if self.close.is_zero() {
            return Decimal::ZERO;
        }
        (self.high - self.low) / self.close
    }

    pub fn change_pct(&self, previous_close: Decimal) -> Decimal {
        if previous_close.is_zero() {
            return Decimal::ZERO;
        }
        (self.close - previous_close) / previous_close * Decimal::from(100)
    }
}

/// Latest quote state for one symbol (§3 Snapshot).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub trade_price: Decimal,
    pub trade_timestamp: DateTime<Utc>,
    pub bid: Decimal,
    pub ask: Decimal,
    pub previous_daily_close: Decimal,
    pub latest_minute_volume: Decimal,
}

impl Snapshot {
    /// `(ask - bid) / mid * 10000` — see GLOSSARY "Spread (bps)".
    ///
    /// Returns `None` when the quote is degenerate (non-positive or crossed),
    /// matching §4.5 step 3's explicit bid/ask sanity checks.
    pub fn spread_bps(&self) -> Option<Decimal> {
        if self.bid <= Decimal::ZERO || self.ask <= Decimal::ZERO || self.ask < self.bid {
            return None;
        }
        let mid = (self.ask + self.bid) / Decimal::from(2);
        if mid.is_zero() {
            return None;
        }
        Some((self.ask - self.bid) / mid * Decimal::from(10_000))
    }

    pub fn mid_price(&self) -> Decimal {
        (self.ask + self.bid) / Decimal::from(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 5, 14, 30, 0).unwrap()
    }

    #[test]
    fn spread_bps_matches_scenario_2() {
        let snap = Snapshot {
            trade_price: dec!(100.25),
            trade_timestamp: ts(),
            bid: dec!(100.00),
            ask: dec!(100.50),
            previous_daily_close: dec!(99.00),
            latest_minute_volume: dec!(1000),
        };
        let bps = snap.spread_bps().unwrap();
        assert!((bps - dec!(49.875)).abs() < dec!(0.01));
    }

    #[test]
    fn crossed_quote_has_no_spread() {
        let snap = Snapshot {
            trade_price: dec!(100.0),
            trade_timestamp: ts(),
            bid: dec!(100.50),
            ask: dec!(100.00),
            previous_daily_close: dec!(99.00),
            latest_minute_volume: dec!(1000),
        };
        assert!(snap.spread_bps().is_none());
    }

    #[test]
    fn bar_noise_is_range_over_close() {
        let bar = Bar::new(ts(), dec!(100), dec!(102), dec!(99), dec!(101), dec!(5000));
        assert_eq!(bar.noise(), (dec!(102) - dec!(99)) / dec!(101));
    }
}

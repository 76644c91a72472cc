use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Output of a pure strategy evaluator (C2): {name, should_buy, confidence, reason} per §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySignal {
    pub name: String,
    pub should_buy: bool,
    pub confidence: Decimal,
    pub reason: String,
}

impl StrategySignal {
    pub fn buy(name: impl Into<String>, confidence: Decimal, reason: impl Into<String>) -> Self {
        Self { name: name.into(), should_buy: true, confidence, reason: reason.into() }
    }

    pub fn no_signal(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { name: name.into(), should_buy: false, confidence: Decimal::ZERO, reason: reason.into() }
    }
}

/// Outcome of the eligibility filter (C5) for one entry candidate (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EntryEligibility {
    Eligible,
    BlockedByInPosition,
    BlockedByPendingOrder,
    BlockedBySpread(Decimal),
    BlockedByVolume(Decimal),
    BlockedByEdge(Decimal),
    BlockedByCooldown(DateTime<Utc>),
    NoSignal,
    StrategyDisabled,
}

impl EntryEligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, EntryEligibility::Eligible)
    }

    /// The reason string recorded for blocked entries (§7 "user-visible behavior").
    pub fn reason(&self) -> String {
        match self {
            EntryEligibility::Eligible => "eligible".to_string(),
            EntryEligibility::BlockedByInPosition => "already in position".to_string(),
            EntryEligibility::BlockedByPendingOrder => "order already pending".to_string(),
            EntryEligibility::BlockedBySpread(bps) => format!("spread {bps} bps exceeds maximum"),
            EntryEligibility::BlockedByVolume(ratio) => format!("volume ratio {ratio} below minimum"),
            EntryEligibility::BlockedByEdge(bps) => format!("net edge {bps} bps is negative"),
            EntryEligibility::BlockedByCooldown(until) => format!("cooldown active until {until}"),
            EntryEligibility::NoSignal => "no enabled strategy fired".to_string(),
            EntryEligibility::StrategyDisabled => "strategy disabled for this session".to_string(),
        }
    }
}

/// Outcome of evaluating an open position for exit (C7/C8) (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ExitDecision {
    Hold,
    TakeProfit(Decimal),
    StopLoss(Decimal),
    TrailingStop(Decimal),
    Panic(Decimal),
    EndOfDay,
}

impl ExitDecision {
    pub fn is_exit(&self) -> bool {
        !matches!(self, ExitDecision::Hold)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ExitDecision::Hold => "hold",
            ExitDecision::TakeProfit(_) => "take profit",
            ExitDecision::StopLoss(_) => "stop loss",
            ExitDecision::TrailingStop(_) => "trailing stop",
            ExitDecision::Panic(_) => "panic stop",
            ExitDecision::EndOfDay => "end of day flatten",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn eligibility_reasons_are_human_readable() {
        let e = EntryEligibility::BlockedBySpread(dec!(50));
        assert!(e.reason().contains("50"));
        assert!(!e.is_eligible());
        assert!(EntryEligibility::Eligible.is_eligible());
    }

    #[test]
    fn exit_decision_hold_is_not_an_exit() {
        assert!(!ExitDecision::Hold.is_exit());
        assert!(ExitDecision::TakeProfit(dec!(2)).is_exit());
    }
}

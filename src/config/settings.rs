//! The closed configuration surface (§6, §4.11, ambient A1).
//!
//! Loaded once at process start by layering, lowest to highest precedence:
//! compiled-in [`Defaults`](Settings::default), an optional TOML file, then
//! `TRADER__`-prefixed environment variables (double underscore separates
//! nested keys, e.g. `TRADER__EXITS__STOP_LOSS_PCT`). A `.env` file is read
//! first for local-development secrets only (broker credentials), never
//! trading parameters. `validate()` runs once, collects every violation
//! rather than stopping at the first, and is fatal to startup.

use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub trading: TradingSettings,
    pub exits: ExitSettings,
    pub eligibility: EligibilitySettings,
    pub schedule: ScheduleSettings,
    pub broker: BrokerSettings,
    pub backtest: BacktestSettings,
}

/// Watchlist and order-sizing parameters (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSettings {
    pub watchlist: Vec<String>,
    pub notional_per_trade: Decimal,
    pub calibration_days: u32,
    pub min_trades_to_enable: u64,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            watchlist: vec!["AAPL".to_string(), "MSFT".to_string(), "NVDA".to_string()],
            notional_per_trade: dec!(1000),
            calibration_days: 30,
            min_trades_to_enable: 10,
        }
    }
}

/// Normal and panic exit thresholds (§4.7, §4.8).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExitSettings {
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    pub trailing_stop_pct: Decimal,
    pub panic_stop_pct: Decimal,
}

impl Default for ExitSettings {
    fn default() -> Self {
        Self {
            take_profit_pct: dec!(2.0),
            stop_loss_pct: dec!(5.0),
            trailing_stop_pct: dec!(30.0),
            panic_stop_pct: dec!(6.0),
        }
    }
}

/// Eligibility filter (C5) thresholds (§4.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EligibilitySettings {
    pub max_spread_bps: Decimal,
    pub min_volume_ratio: Decimal,
    pub min_required_edge_bps: Decimal,
    pub slippage_buffer_bps: Decimal,
    pub adverse_selection_bps: Decimal,
    pub min_signal_confidence: Decimal,
}

impl Default for EligibilitySettings {
    fn default() -> Self {
        Self {
            max_spread_bps: dec!(30),
            min_volume_ratio: dec!(0.5),
            min_required_edge_bps: dec!(5),
            slippage_buffer_bps: dec!(1),
            adverse_selection_bps: dec!(1),
            min_signal_confidence: dec!(0.7),
        }
    }
}

/// Time-of-day gates (§4.10, §4.11). Expressed and compared in UTC — see
/// DESIGN.md's resolution of the DST open question: translating an
/// exchange-local wall-clock cutoff into the correct UTC instant for a
/// given calendar day is the operator's job when writing this file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScheduleSettings {
    pub risk_on_time: chrono::NaiveTime,
    pub no_more_entries_time: chrono::NaiveTime,
    pub eod_cutoff_time: chrono::NaiveTime,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            risk_on_time: chrono::NaiveTime::from_hms_opt(14, 30, 0).unwrap(), // 10:00 ET
            no_more_entries_time: chrono::NaiveTime::from_hms_opt(19, 30, 0).unwrap(), // 3:30 PM ET
            eod_cutoff_time: chrono::NaiveTime::from_hms_opt(19, 50, 0).unwrap(), // 3:50 PM ET
        }
    }
}

/// Adapter-level settings (§6: "not part of the closed trading-parameter
/// set"). Credential fields are environment-variable *names*, never the
/// secrets themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    pub base_url: String,
    pub data_url: String,
    pub key_id_env: String,
    pub secret_key_env: String,
    pub recent_orders_limit: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            base_url: "https://paper-api.alpaca.markets".to_string(),
            data_url: "https://data.alpaca.markets".to_string(),
            key_id_env: "ALPACA_API_KEY_ID".to_string(),
            secret_key_env: "ALPACA_API_SECRET_KEY".to_string(),
            recent_orders_limit: 100,
        }
    }
}

/// Backtest-only parameters (§4.3); the spread here is a simulation
/// constant, distinct from `eligibility.max_spread_bps`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BacktestSettings {
    pub starting_capital: Decimal,
    pub spread_pct: Decimal,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self { starting_capital: dec!(100_000), spread_pct: dec!(0.05) }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trading: TradingSettings::default(),
            exits: ExitSettings::default(),
            eligibility: EligibilitySettings::default(),
            schedule: ScheduleSettings::default(),
            broker: BrokerSettings::default(),
            backtest: BacktestSettings::default(),
        }
    }
}

impl Settings {
    /// Layers compiled-in defaults, an optional TOML file, then
    /// `TRADER__`-prefixed environment variables. `.env` is loaded (if
    /// present) before the environment layer so local secrets are visible
    /// to it, but `.env` is expected to carry credentials only.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let defaults = config::Config::try_from(&Settings::default())
            .map_err(|e| Error::ConfigInvalid(format!("could not serialize defaults: {e}")))?;

        let builder = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::from(config_path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix("TRADER").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Collects every violated invariant rather than failing on the first
    /// (§4.11, §8 "Configuration"). Enforces §8 invariant 5:
    /// `panic_stop_pct > stop_loss_pct > 0` and
    /// `trailing_stop_pct >= take_profit_pct > 0`.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.trading.watchlist.is_empty() {
            errors.push("trading.watchlist must not be empty".to_string());
        }
        if self.trading.notional_per_trade <= Decimal::ZERO {
            errors.push("trading.notional_per_trade must be > 0".to_string());
        }
        if self.trading.calibration_days == 0 {
            errors.push("trading.calibration_days must be > 0".to_string());
        }

        if self.exits.stop_loss_pct <= Decimal::ZERO {
            errors.push("exits.stop_loss_pct must be > 0".to_string());
        }
        if self.exits.take_profit_pct <= Decimal::ZERO {
            errors.push("exits.take_profit_pct must be > 0".to_string());
        }
        if self.exits.panic_stop_pct <= self.exits.stop_loss_pct {
            errors.push("exits.panic_stop_pct must be strictly greater than exits.stop_loss_pct".to_string());
        }
        if self.exits.trailing_stop_pct < self.exits.take_profit_pct {
            errors.push("exits.trailing_stop_pct must be >= exits.take_profit_pct".to_string());
        }

        if self.eligibility.max_spread_bps <= Decimal::ZERO {
            errors.push("eligibility.max_spread_bps must be > 0".to_string());
        }
        if self.eligibility.min_volume_ratio < Decimal::ZERO {
            errors.push("eligibility.min_volume_ratio must be >= 0".to_string());
        }
        if self.eligibility.min_signal_confidence <= Decimal::ZERO || self.eligibility.min_signal_confidence > Decimal::ONE {
            errors.push("eligibility.min_signal_confidence must be in (0, 1]".to_string());
        }

        if self.schedule.no_more_entries_time > self.schedule.eod_cutoff_time {
            errors.push("schedule.no_more_entries_time must not be after schedule.eod_cutoff_time".to_string());
        }
        if self.schedule.risk_on_time > self.schedule.no_more_entries_time {
            errors.push("schedule.risk_on_time must not be after schedule.no_more_entries_time".to_string());
        }

        if self.broker.recent_orders_limit < 100 {
            errors.push("broker.recent_orders_limit must be >= 100 (§4.9 'M >= 100')".to_string());
        }

        if self.backtest.starting_capital <= Decimal::ZERO {
            errors.push("backtest.starting_capital must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn panic_stop_not_exceeding_stop_loss_is_rejected() {
        let mut settings = Settings::default();
        settings.exits.panic_stop_pct = settings.exits.stop_loss_pct;
        let errors = settings.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("panic_stop_pct")));
    }

    #[test]
    fn trailing_stop_below_take_profit_is_rejected() {
        let mut settings = Settings::default();
        settings.exits.trailing_stop_pct = settings.exits.take_profit_pct - dec!(0.1);
        let errors = settings.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("trailing_stop_pct")));
    }

    #[test]
    fn validate_reports_every_violation_not_just_the_first() {
        let mut settings = Settings::default();
        settings.trading.watchlist.clear();
        settings.exits.stop_loss_pct = dec!(0);
        let errors = settings.validate().unwrap_err();
        assert!(errors.len() >= 2);
    }

    #[test]
    fn empty_watchlist_is_rejected() {
        let mut settings = Settings::default();
        settings.trading.watchlist.clear();
        assert!(settings.validate().is_err());
    }
}

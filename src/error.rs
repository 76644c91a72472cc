use thiserror::Error;

/// The closed set of failure kinds the core trading engine reasons about.
///
/// Every fallible operation in this crate returns `Result<T, Error>` (or a
/// component-scoped alias of it). The CLI boundary in `main.rs` is the only
/// place that widens this into `anyhow::Error` for human-readable reporting.
#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited, retry after: {0}")]
    RateLimit(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("order rejected for {symbol}: {reason}")]
    OrderRejected { symbol: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl Error {
    /// A cycle-wide error is one where the whole cycle is skipped and
    /// retried at the next cadence, rather than swallowed per-symbol.
    pub fn is_cycle_wide(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Auth(_) | Error::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // Timeouts are enforced at the adapter and surface as Network to the cycle (§7).
            Error::Network(format!("timeout: {e}"))
        } else if e.is_connect() {
            Error::Network(e.to_string())
        } else if e.is_decode() {
            Error::Parse(e.to_string())
        } else if let Some(status) = e.status() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                Error::Auth(e.to_string())
            } else if status.as_u16() == 429 {
                Error::RateLimit(e.to_string())
            } else {
                Error::Network(e.to_string())
            }
        } else {
            Error::Network(e.to_string())
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::ConfigInvalid(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_auth_and_timeout_are_cycle_wide() {
        assert!(Error::Network("x".into()).is_cycle_wide());
        assert!(Error::Auth("x".into()).is_cycle_wide());
        assert!(Error::Timeout("x".into()).is_cycle_wide());
    }

    #[test]
    fn order_rejected_is_not_cycle_wide() {
        assert!(!Error::OrderRejected { symbol: "AAPL".into(), reason: "x".into() }.is_cycle_wide());
    }
}

//! Session scheduler (C10, §4.10). A single cooperative loop, single
//! -threaded with respect to ledger mutation, interleaving three cadences:
//! panic checks every minute at :35s, entries+exits at each 15-minute
//! boundary, and a coarse idle sleep once the session is flattened.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use tracing::{info, warn};

use crate::broker::BrokerAdapter;
use crate::config::Settings;
use crate::engine::entry_cycle::{run_entry_cycle, EntryParams};
use crate::engine::exit_cycle::{run_exit_cycle, ExitThresholds};
use crate::engine::ledger::Ledger;
use crate::engine::panic_cycle::{run_panic_cycle, EodLatch, PanicThresholds};
use crate::risk::eligibility::EligibilityThresholds;

/// Smallest boundary `>= t` on the 15-minute wall-clock grid (:00/:15/:30/:45).
fn next_quarter_boundary(t: DateTime<Utc>) -> DateTime<Utc> {
    let aligned = t.with_second(0).unwrap().with_nanosecond(0).unwrap();
    let remainder = aligned.minute() % 15;
    if remainder == 0 && aligned == t {
        aligned
    } else if remainder == 0 {
        aligned + ChronoDuration::minutes(15)
    } else {
        aligned + ChronoDuration::minutes((15 - remainder) as i64)
    }
}

/// Smallest `:35s` instant `>= t`.
fn next_minute_35s(t: DateTime<Utc>) -> DateTime<Utc> {
    let candidate = t.with_second(35).unwrap().with_nanosecond(0).unwrap();
    if candidate >= t {
        candidate
    } else {
        candidate + ChronoDuration::minutes(1)
    }
}

async fn sleep_until(target: DateTime<Utc>) {
    let now = Utc::now();
    if target <= now {
        return;
    }
    let std_duration = (target - now).to_std().unwrap_or(std::time::Duration::ZERO);
    tokio::time::sleep(std_duration).await;
}

fn entry_params(settings: &Settings) -> EntryParams {
    EntryParams {
        notional_per_trade: settings.trading.notional_per_trade,
        min_signal_confidence: settings.eligibility.min_signal_confidence,
        take_profit_pct: settings.exits.take_profit_pct,
        stop_loss_pct: settings.exits.stop_loss_pct,
        trailing_stop_pct: settings.exits.trailing_stop_pct,
        eligibility: EligibilityThresholds {
            max_spread_bps: settings.eligibility.max_spread_bps,
            min_volume_ratio: settings.eligibility.min_volume_ratio,
            min_required_edge_bps: settings.eligibility.min_required_edge_bps,
            slippage_buffer_bps: settings.eligibility.slippage_buffer_bps,
            adverse_selection_bps: settings.eligibility.adverse_selection_bps,
        },
    }
}

fn exit_thresholds(settings: &Settings) -> ExitThresholds {
    ExitThresholds {
        take_profit_pct: settings.exits.take_profit_pct,
        stop_loss_pct: settings.exits.stop_loss_pct,
        trailing_stop_pct: settings.exits.trailing_stop_pct,
    }
}

fn panic_thresholds(settings: &Settings) -> PanicThresholds {
    PanicThresholds { panic_stop_pct: settings.exits.panic_stop_pct }
}

/// Runs the full session loop until `session_end` or a shutdown signal.
/// Returns the final ledger state (useful for tests and graceful restarts).
pub async fn run_session(
    broker: &dyn BrokerAdapter,
    mut ledger: Ledger,
    enabled: HashSet<String>,
    settings: &Settings,
    session_end: DateTime<Utc>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Ledger {
    let cooldowns: HashMap<String, DateTime<Utc>> = HashMap::new();
    let mut eod_latch = EodLatch::default();

    let mut next_panic = next_minute_35s(Utc::now());
    let mut next_quarter = next_quarter_boundary(Utc::now());

    loop {
        if *shutdown.borrow() {
            info!("shutdown requested, exiting session loop");
            break;
        }

        let clock = match broker.get_clock().await {
            Ok(c) => c,
            Err(err) => {
                warn!(error = %err, "scheduler: get_clock failed, retrying in 1 minute");
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(60)) => {},
                    _ = shutdown.changed() => {},
                }
                continue;
            }
        };

        if !clock.is_open {
            info!("market closed, idling");
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(60)) => {},
                _ = shutdown.changed() => {},
            }
            continue;
        }

        let now = Utc::now();
        if now >= session_end {
            info!("session end reached");
            break;
        }

        if eod_latch.is_latched() {
            // Idle coarsely until session_end once flattened (§4.10).
            let wake = session_end.min(now + ChronoDuration::minutes(5));
            tokio::select! {
                _ = sleep_until(wake) => {},
                _ = shutdown.changed() => {},
            }
            continue;
        }

        let wake = next_panic.min(next_quarter).min(session_end);
        tokio::select! {
            _ = sleep_until(wake) => {},
            _ = shutdown.changed() => {},
        }
        if *shutdown.borrow() {
            continue;
        }

        let now = Utc::now();
        let panic_due = now >= next_panic;
        let quarter_due = now >= next_quarter;

        if panic_due || quarter_due {
            // §4.9: the broker is the single source of truth; re-derive
            // `in_position` from it every cycle rather than trusting the
            // locally-mutated cache indefinitely.
            match broker.get_positions().await {
                Ok(positions) => ledger.reconcile(&positions, now),
                Err(err) => warn!(error = %err, "scheduler: get_positions failed, reconciling next cycle"),
            }
        }

        // Fixed dispatch order per §4.10: panic -> exits -> entries.
        if panic_due {
            run_panic_cycle(&mut ledger, broker, panic_thresholds(settings), now, eod_cutoff(settings, now), &mut eod_latch).await;
            next_panic = next_panic + ChronoDuration::minutes(1);
        }

        if quarter_due {
            run_exit_cycle(&mut ledger, broker, exit_thresholds(settings)).await;

            let risk_on = now.time() >= settings.schedule.risk_on_time;
            let before_no_more_entries = now.time() < settings.schedule.no_more_entries_time;
            if risk_on && before_no_more_entries && !eod_latch.is_latched() {
                run_entry_cycle(&mut ledger, broker, &settings.trading.watchlist, &enabled, &cooldowns, entry_params(settings), now).await;
            }
            next_quarter = next_quarter + ChronoDuration::minutes(15);
        }
    }

    ledger
}

/// Converts today's `eod_cutoff_time` into a concrete instant against `now`'s
/// calendar date (§4.11's UTC-only DST resolution).
fn eod_cutoff(settings: &Settings, now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(settings.schedule.eod_cutoff_time).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_quarter_boundary_rounds_up_to_grid() {
        let t = Utc.with_ymd_and_hms(2026, 3, 5, 10, 7, 12).unwrap();
        let boundary = next_quarter_boundary(t);
        assert_eq!(boundary, Utc.with_ymd_and_hms(2026, 3, 5, 10, 15, 0).unwrap());
    }

    #[test]
    fn next_quarter_boundary_on_grid_advances_to_next_one() {
        let t = Utc.with_ymd_and_hms(2026, 3, 5, 10, 15, 0).unwrap();
        let boundary = next_quarter_boundary(t);
        assert_eq!(boundary, Utc.with_ymd_and_hms(2026, 3, 5, 10, 30, 0).unwrap());
    }

    #[test]
    fn next_minute_35s_rounds_up_within_the_minute() {
        let t = Utc.with_ymd_and_hms(2026, 3, 5, 10, 7, 12).unwrap();
        let boundary = next_minute_35s(t);
        assert_eq!(boundary, Utc.with_ymd_and_hms(2026, 3, 5, 10, 7, 35).unwrap());
    }

    #[test]
    fn next_minute_35s_past_offset_rolls_to_next_minute() {
        let t = Utc.with_ymd_and_hms(2026, 3, 5, 10, 7, 50).unwrap();
        let boundary = next_minute_35s(t);
        assert_eq!(boundary, Utc.with_ymd_and_hms(2026, 3, 5, 10, 8, 35).unwrap());
    }
}

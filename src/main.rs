mod broker;
mod config;
mod engine;
mod error;
mod risk;
mod strategies;
mod types;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use broker::alpaca::AlpacaClient;
use broker::paper::PaperBroker;
use broker::BrokerAdapter;
use config::Settings;
use engine::backtest::BacktestParams;
use engine::calibrator::{calibrate, enabled_set};
use engine::exit_cycle::ExitThresholds;
use engine::ledger::Ledger;
use engine::scheduler::run_session;
use types::Bar;

#[derive(Parser)]
#[command(name = "intraday-trader")]
#[command(version = "0.1.0")]
#[command(about = "Automated intraday equity trading agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a live/paper trading session: recovers the ledger, calibrates, enters the scheduler.
    Run {
        /// Use the in-memory paper broker against a recorded bar file instead of the live adapter.
        #[arg(long)]
        paper_bars: Option<String>,
    },
    /// Run the backtest simulator for every strategy over a recorded bar file and print stats.
    Backtest {
        /// Path to a JSON bar map: `{"AAPL": [{...}, ...], ...}`.
        #[arg(short, long)]
        bars: String,
    },
    /// Run calibration over a recorded bar file and print the enabled/disabled decision per strategy.
    Calibrate {
        #[arg(short, long)]
        bars: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load(&cli.config)?;
    if let Err(violations) = settings.validate() {
        for violation in &violations {
            error!("config: {violation}");
        }
        return Err(anyhow!("{} configuration violation(s), refusing to start", violations.len()));
    }

    match cli.command {
        Commands::Run { paper_bars } => run(settings, paper_bars).await,
        Commands::Backtest { bars } => run_backtest_command(&settings, &bars).await,
        Commands::Calibrate { bars } => run_calibrate_command(&settings, &bars).await,
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { Level::DEBUG } else { Level::INFO };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level.to_string()));
    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).json().finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn load_bar_map(path: &str) -> Result<HashMap<String, Vec<Bar>>> {
    let contents = std::fs::read_to_string(path).map_err(|e| anyhow!("could not read bar file {path}: {e}"))?;
    let bars: HashMap<String, Vec<Bar>> =
        serde_json::from_str(&contents).map_err(|e| anyhow!("could not parse bar file {path}: {e}"))?;
    Ok(bars)
}

fn backtest_params(settings: &Settings) -> BacktestParams {
    BacktestParams {
        notional_per_trade: settings.trading.notional_per_trade,
        spread_pct: settings.backtest.spread_pct,
        min_signal_confidence: settings.eligibility.min_signal_confidence,
        exits: ExitThresholds {
            take_profit_pct: settings.exits.take_profit_pct,
            stop_loss_pct: settings.exits.stop_loss_pct,
            trailing_stop_pct: settings.exits.trailing_stop_pct,
        },
    }
}

async fn run(settings: Settings, paper_bars: Option<String>) -> Result<()> {
    info!("starting session");

    let broker: Box<dyn BrokerAdapter> = match paper_bars {
        Some(path) => {
            let bars = load_bar_map(&path)?;
            let now = Utc::now();
            Box::new(PaperBroker::new(Arc::new(bars), now, now + chrono::Duration::hours(7)))
        }
        None => {
            let key_id = std::env::var(&settings.broker.key_id_env)
                .map_err(|_| anyhow!("missing env var {}", settings.broker.key_id_env))?;
            let secret_key = std::env::var(&settings.broker.secret_key_env)
                .map_err(|_| anyhow!("missing env var {}", settings.broker.secret_key_env))?;
            Box::new(AlpacaClient::new(
                settings.broker.base_url.clone(),
                settings.broker.data_url.clone(),
                key_id,
                secret_key,
            ))
        }
    };

    let ledger = Ledger::rebuild(broker.as_ref(), settings.broker.recent_orders_limit).await?;
    let recovered: Vec<String> = ledger.symbols().collect();
    info!(symbols = ?recovered, "ledger recovered from broker");

    let mut bar_map: HashMap<String, Vec<Bar>> = HashMap::new();
    for symbol in &settings.trading.watchlist {
        match broker.get_bars(symbol, broker::BarSize::FifteenMin, settings.trading.calibration_days).await {
            Ok(bars) => {
                bar_map.insert(symbol.clone(), bars);
            }
            Err(err) => warn!(symbol = %symbol, error = %err, "calibration bar fetch failed, symbol excluded"),
        }
    }

    let configs = calibrate(Arc::new(bar_map), backtest_params(&settings), settings.trading.min_trades_to_enable).await;
    for config in &configs {
        config.print_summary();
    }
    let enabled = enabled_set(&configs);

    let clock = broker.get_clock().await?;
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let _final_ledger = run_session(broker.as_ref(), ledger, enabled, &settings, clock.next_close, shutdown_rx).await;

    info!("session ended");
    Ok(())
}

async fn run_backtest_command(settings: &Settings, bars_path: &str) -> Result<()> {
    let bars = load_bar_map(bars_path)?;
    let params = backtest_params(settings);

    for strategy in strategies::PRECEDENCE {
        let stats = engine::backtest::run_backtest(strategy, &bars, params);
        stats.print_summary();
    }
    Ok(())
}

async fn run_calibrate_command(settings: &Settings, bars_path: &str) -> Result<()> {
    let bars = load_bar_map(bars_path)?;
    let configs = calibrate(Arc::new(bars), backtest_params(settings), settings.trading.min_trades_to_enable).await;
    for config in &configs {
        config.print_summary();
    }
    Ok(())
}

pub mod backtest;
pub mod calibrator;
pub mod entry_cycle;
pub mod exit_cycle;
pub mod ledger;
pub mod panic_cycle;
pub mod results;
pub mod scheduler;

pub use backtest::*;
pub use calibrator::*;
pub use entry_cycle::*;
pub use exit_cycle::*;
pub use ledger::*;
pub use panic_cycle::*;
pub use results::*;
pub use scheduler::*;

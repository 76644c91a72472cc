pub mod bar;
pub mod history;
pub mod order;
pub mod position;
pub mod signal;

pub use bar::*;
pub use history::*;
pub use order::*;
pub use position::*;
pub use signal::*;

/// Ordered sequence of symbols considered each entry cycle (§6 watchlist).
/// Supplied by the caller at startup; the core never mutates it.
pub type Watchlist = Vec<String>;

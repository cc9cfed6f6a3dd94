//! Cross-Venue Perpetual Futures Arbitrage Engine
//!
//! Observes best prices on two independent derivatives venues, computes their
//! spread continuously, and drives an offsetting position pair through a
//! deterministic decision state machine. Outbound orders are authenticated
//! per venue with Stark-curve signature schemes.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod ledger;
pub mod market;
pub mod signing;
pub mod strategy;
pub mod trading;
pub mod utils;
pub mod venues;

// Re-export commonly used types
pub use config::ArbitrageConfig;
pub use ledger::{LedgerError, PairSide, PositionLedger};
pub use market::{Quote, QuoteFeed, Spread, SpreadCalculator};
pub use signing::{RequestSigner, SignedRequest, SigningError};
pub use strategy::{ArbState, ArbitrageStateMachine, EngineParams, OrderIntent};
pub use trading::{OrderExecutor, PaperExecutor, SubmissionError};
pub use venues::Venue;

/// Result type used throughout the application
pub type Result<T> = anyhow::Result<T>;

/// Common error types for the arbitrage engine
#[derive(thiserror::Error, Debug)]
pub enum ArbitrageError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Market data is missing or older than the staleness window
    #[error("Stale market data: {0}")]
    StaleData(String),

    /// Request signing failure
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// Position ledger contract breach
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Order submission failure
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// Risk ceiling breached; the engine halts until manually restarted
    #[error("Risk limit breached: {0}")]
    RiskLimitBreach(String),

    /// State machine received an event it cannot apply in its current state
    #[error("State machine error: {0}")]
    StateMachine(String),
}

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert!(!APP_NAME.is_empty());
    }
}

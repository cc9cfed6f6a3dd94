//! Order execution boundary and the event-loop runner
//!
//! The decision core only sees the `OrderExecutor` contract; how a venue's
//! client is implemented (in-process, subprocess bridge, remote) is an
//! integration concern behind it.

pub mod paper;
pub mod runner;

pub use paper::{PaperExecutor, PaperParams, PaperResults, SimulatedFeed};
pub use runner::{EngineRunner, SignerSet};

use crate::{signing::SignedRequest, venues::Venue};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order fields carried in the signed request body (and, for venues that
/// sign parameters, mirrored into the canonical query set)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPayload {
    /// Trading symbol
    pub market: String,
    /// Order side
    pub side: OrderSide,
    /// Order size in base units
    pub size: f64,
    /// Reference price the order was built against
    pub price: f64,
    /// Client order id
    pub client_order_id: String,
}

/// Confirmation that all or part of an order executed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillResult {
    /// Venue that filled the order
    pub venue: Venue,
    /// Venue order id
    pub order_id: String,
    /// Filled size in base units
    pub size: f64,
    /// Average fill price
    pub price: f64,
    /// Fill timestamp, epoch milliseconds
    pub timestamp_ms: i64,
}

/// Order submission failures
#[derive(thiserror::Error, Debug)]
pub enum SubmissionError {
    /// Order neither confirmed nor rejected within the bounded timeout.
    /// Triggers a reconciliation query, never a blind retry.
    #[error("Submission to {venue} timed out")]
    Timeout {
        /// Venue the order went to
        venue: Venue,
    },

    /// Venue rejected the order
    #[error("Order rejected by {venue}: {reason}")]
    Rejected {
        /// Venue the order went to
        venue: Venue,
        /// Venue-reported reason
        reason: String,
    },

    /// Transport-level failure before any venue decision
    #[error("Submission transport error for {venue}: {reason}")]
    Transport {
        /// Venue the order went to
        venue: Venue,
        /// What failed
        reason: String,
    },
}

impl SubmissionError {
    /// Whether the order outcome is unknown and exposure must be
    /// reconciled against the venue
    pub fn outcome_unknown(&self) -> bool {
        matches!(
            self,
            SubmissionError::Timeout { .. } | SubmissionError::Transport { .. }
        )
    }
}

/// Submits signed order requests to a venue.
///
/// `position` reports the venue's view of current signed exposure
/// (positive long, negative short) and backs both startup reconciliation
/// and post-timeout reconciliation.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Submit a signed request; resolves to fill data or a submission error
    async fn submit(&self, request: &SignedRequest) -> Result<FillResult, SubmissionError>;

    /// Venue-reported signed position size for the managed symbol
    async fn position(&self, venue: Venue) -> Result<f64, SubmissionError>;
}

//! Market data types and cross-venue spread computation

use crate::{venues::Venue, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Immutable best-price snapshot for one venue.
///
/// Each feed update supersedes the previous snapshot; quotes are never
/// mutated in place.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Quote {
    /// Originating venue
    pub venue: Venue,
    /// Best bid price
    pub bid: f64,
    /// Best ask price
    pub ask: f64,
    /// Mid price ((bid + ask) / 2)
    pub mid: f64,
    /// Venue-reported timestamp in epoch milliseconds
    pub timestamp_ms: i64,
}

impl Quote {
    /// Create a quote snapshot; the mid price is derived from bid/ask
    pub fn new(venue: Venue, bid: f64, ask: f64, timestamp_ms: i64) -> Self {
        Self {
            venue,
            bid,
            ask,
            mid: (bid + ask) / 2.0,
            timestamp_ms,
        }
    }
}

/// Which venue carries the higher price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpreadDirection {
    /// edgeX mid is at or above the Paradex mid
    EdgexHigh,
    /// Paradex mid is above the edgeX mid
    ParadexHigh,
}

impl fmt::Display for SpreadDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpreadDirection::EdgexHigh => write!(f, "edgex-high"),
            SpreadDirection::ParadexHigh => write!(f, "paradex-high"),
        }
    }
}

/// Signed price divergence between the two venues.
///
/// Derived on every quote update, never persisted. `value` is
/// `edgex.mid - paradex.mid` in quote currency units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Spread {
    /// Signed spread in quote currency units
    pub value: f64,
    /// Which venue is priced higher
    pub direction: SpreadDirection,
    /// When the spread was computed, epoch milliseconds
    pub computed_at_ms: i64,
}

/// A spread observation paired with a reference price level.
///
/// The reference price (average of the two mids) is what the decision core
/// uses to express notional-relative limits; the spread alone carries no
/// absolute price level.
#[derive(Debug, Clone, Copy)]
pub struct SpreadView {
    /// The computed spread
    pub spread: Spread,
    /// Average of the two venue mids
    pub ref_price: f64,
}

/// Maintains the most recent quote per venue and produces the current
/// spread with staleness detection.
#[derive(Debug)]
pub struct SpreadCalculator {
    staleness_ms: i64,
    edgex: Option<Quote>,
    paradex: Option<Quote>,
}

impl SpreadCalculator {
    /// Create a calculator treating quotes unmodified for longer than
    /// `staleness_ms` as absent
    pub fn new(staleness_ms: i64) -> Self {
        Self {
            staleness_ms,
            edgex: None,
            paradex: None,
        }
    }

    /// Store `quote` if it is strictly newer than the held snapshot for its
    /// venue. Older or duplicate updates are idempotent no-ops; returns
    /// whether the quote was accepted.
    pub fn update(&mut self, quote: Quote) -> bool {
        let slot = match quote.venue {
            Venue::Edgex => &mut self.edgex,
            Venue::Paradex => &mut self.paradex,
        };
        match slot {
            Some(held) if quote.timestamp_ms <= held.timestamp_ms => false,
            _ => {
                *slot = Some(quote);
                true
            }
        }
    }

    /// Current spread, or `None` when either venue's quote is missing or
    /// older than the staleness window. The decision core treats `None` as
    /// "no decision possible, hold".
    pub fn current(&self, now_ms: i64) -> Option<SpreadView> {
        let a = self.fresh(self.edgex.as_ref(), now_ms)?;
        let b = self.fresh(self.paradex.as_ref(), now_ms)?;

        let value = a.mid - b.mid;
        let direction = if value >= 0.0 {
            SpreadDirection::EdgexHigh
        } else {
            SpreadDirection::ParadexHigh
        };

        Some(SpreadView {
            spread: Spread {
                value,
                direction,
                computed_at_ms: now_ms,
            },
            ref_price: (a.mid + b.mid) / 2.0,
        })
    }

    /// Latest stored quote for a venue regardless of freshness
    pub fn latest_quote(&self, venue: Venue) -> Option<&Quote> {
        match venue {
            Venue::Edgex => self.edgex.as_ref(),
            Venue::Paradex => self.paradex.as_ref(),
        }
    }

    fn fresh<'a>(&self, quote: Option<&'a Quote>, now_ms: i64) -> Option<&'a Quote> {
        quote.filter(|q| now_ms - q.timestamp_ms <= self.staleness_ms)
    }
}

/// Push interface supplied by venue quote feeds.
///
/// Implementations must deliver monotonically non-decreasing timestamps per
/// venue; the calculator discards anything else.
#[async_trait]
pub trait QuoteFeed: Send + Sync {
    /// Subscribe to best-price updates for one venue
    async fn subscribe(&self, venue: Venue) -> Result<mpsc::Receiver<Quote>>;
}

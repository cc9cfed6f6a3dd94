//! Position ledger: the single source of truth for current exposure
//!
//! All decision-core reads come from here and only confirmed fills mutate
//! it. The ledger is the last line of defense: any call that would break a
//! size or add-count invariant fails instead of clamping.

use crate::venues::Venue;
use serde::{Deserialize, Serialize};

/// Tolerance for fill-size bookkeeping in f64
const SIZE_EPS: f64 = 1e-9;

/// Position ledger contract breaches
#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    /// `open` called while a position is already held
    #[error("Ledger invariant violated: position already open")]
    PositionAlreadyOpen,

    /// `add`/`close` called with no open position
    #[error("Ledger invariant violated: no open position")]
    NoOpenPosition,

    /// Fill size must be strictly positive
    #[error("Ledger invariant violated: non-positive fill size {0}")]
    NonPositiveFill(f64),

    /// Add would exceed the configured add-count ceiling
    #[error("Ledger invariant violated: add count {count} at ceiling {max}")]
    AddCountExceeded {
        /// Current add count
        count: u32,
        /// Configured ceiling
        max: u32,
    },

    /// Add would push total size beyond the configured maximum
    #[error("Ledger invariant violated: size {requested} would exceed maximum {max}")]
    MaxSizeExceeded {
        /// Total size the mutation would produce
        requested: f64,
        /// Configured maximum
        max: f64,
    },

    /// Close larger than the held position
    #[error("Ledger invariant violated: close size {requested} exceeds held size {held}")]
    OversizedClose {
        /// Requested close size
        requested: f64,
        /// Currently held size
        held: f64,
    },
}

/// Which venue the pair is short; the other leg is long.
///
/// The side is chosen so the pair profits as the spread reverts toward
/// zero: short the higher-priced venue, long the lower-priced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairSide {
    /// Short edgeX, long Paradex (entered while the edgeX mid was higher)
    ShortEdgex,
    /// Short Paradex, long edgeX (entered while the Paradex mid was higher)
    ShortParadex,
}

impl PairSide {
    /// Venue carrying the short leg
    pub fn short_venue(&self) -> Venue {
        match self {
            PairSide::ShortEdgex => Venue::Edgex,
            PairSide::ShortParadex => Venue::Paradex,
        }
    }

    /// Venue carrying the long leg
    pub fn long_venue(&self) -> Venue {
        self.short_venue().other()
    }

    /// Profit on `size` units entered at `entry` spread and exited at
    /// `exit` spread, signed per side.
    ///
    /// Spread prices are `edgex.mid - paradex.mid`; a short-edgeX pair
    /// profits as that value falls.
    pub fn pnl(&self, entry: f64, exit: f64, size: f64) -> f64 {
        match self {
            PairSide::ShortEdgex => (entry - exit) * size,
            PairSide::ShortParadex => (exit - entry) * size,
        }
    }
}

/// One confirmed fill recorded against the position
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FillEntry {
    /// Filled size in base units
    pub size: f64,
    /// Spread level at which the pair filled, quote currency units
    pub price: f64,
    /// Fill confirmation time, epoch milliseconds
    pub timestamp_ms: i64,
}

/// The live position pair.
///
/// Created on the first successful open fill, mutated only by confirmed
/// fills, reset to empty when fully closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Side assignment for the pair
    pub side: PairSide,
    /// Currently held size; equals the entry total minus closes
    pub total_size: f64,
    /// Number of add-on fills recorded
    pub add_count: u32,
    /// Ordered open/add fills (audit trail; closes reduce `total_size`
    /// against the weighted average, entries are not popped)
    pub entries: Vec<FillEntry>,
    /// Open fill confirmation time, epoch milliseconds
    pub opened_at_ms: i64,
    /// Last confirmed mutation time, epoch milliseconds
    pub last_action_at_ms: i64,
    /// PnL realized by closes against this position
    pub realized_pnl: f64,
}

impl Position {
    /// Size-weighted average entry spread over all open/add fills
    pub fn weighted_avg_entry(&self) -> f64 {
        let entered: f64 = self.entries.iter().map(|e| e.size).sum();
        if entered <= SIZE_EPS {
            return 0.0;
        }
        self.entries.iter().map(|e| e.size * e.price).sum::<f64>() / entered
    }
}

/// Invariant limits injected at construction
#[derive(Debug, Clone, Copy)]
pub struct LedgerLimits {
    /// Maximum number of add-on fills per position
    pub max_add_positions: u32,
    /// Maximum total position size in base units
    pub max_position_size: f64,
}

/// Authoritative in-memory record of the managed pair's exposure
#[derive(Debug)]
pub struct PositionLedger {
    limits: LedgerLimits,
    position: Option<Position>,
    closed_at_ms: Option<i64>,
    lifetime_realized_pnl: f64,
}

impl PositionLedger {
    /// Create an empty ledger with the given invariant limits
    pub fn new(limits: LedgerLimits) -> Self {
        Self {
            limits,
            position: None,
            closed_at_ms: None,
            lifetime_realized_pnl: 0.0,
        }
    }

    /// Record the opening fill. Requires the ledger to be empty.
    pub fn open(&mut self, side: PairSide, fill: FillEntry) -> Result<(), LedgerError> {
        if self.position.is_some() {
            return Err(LedgerError::PositionAlreadyOpen);
        }
        Self::check_fill(&fill)?;
        if fill.size > self.limits.max_position_size + SIZE_EPS {
            return Err(LedgerError::MaxSizeExceeded {
                requested: fill.size,
                max: self.limits.max_position_size,
            });
        }

        self.position = Some(Position {
            side,
            total_size: fill.size,
            add_count: 0,
            entries: vec![fill],
            opened_at_ms: fill.timestamp_ms,
            last_action_at_ms: fill.timestamp_ms,
            realized_pnl: 0.0,
        });
        Ok(())
    }

    /// Record an add-on fill against the open position
    pub fn add(&mut self, fill: FillEntry) -> Result<(), LedgerError> {
        Self::check_fill(&fill)?;
        let limits = self.limits;
        let position = self.position.as_mut().ok_or(LedgerError::NoOpenPosition)?;

        if position.add_count >= limits.max_add_positions {
            return Err(LedgerError::AddCountExceeded {
                count: position.add_count,
                max: limits.max_add_positions,
            });
        }
        let requested = position.total_size + fill.size;
        if requested > limits.max_position_size + SIZE_EPS {
            return Err(LedgerError::MaxSizeExceeded {
                requested,
                max: limits.max_position_size,
            });
        }

        position.total_size = requested;
        position.add_count += 1;
        position.entries.push(fill);
        position.last_action_at_ms = fill.timestamp_ms;
        Ok(())
    }

    /// Record a (possibly partial) close fill.
    ///
    /// Returns the PnL realized by this fill,
    /// `(exit - weighted_avg_entry) * size` signed per side. When the
    /// remaining size reaches zero the position is reset to empty and the
    /// close time recorded.
    pub fn close(&mut self, fill: FillEntry) -> Result<f64, LedgerError> {
        Self::check_fill(&fill)?;
        let position = self.position.as_mut().ok_or(LedgerError::NoOpenPosition)?;

        if fill.size > position.total_size + SIZE_EPS {
            return Err(LedgerError::OversizedClose {
                requested: fill.size,
                held: position.total_size,
            });
        }

        let realized = position
            .side
            .pnl(position.weighted_avg_entry(), fill.price, fill.size);
        position.realized_pnl += realized;
        position.total_size -= fill.size;
        position.last_action_at_ms = fill.timestamp_ms;
        self.lifetime_realized_pnl += realized;

        if position.total_size <= SIZE_EPS {
            self.closed_at_ms = Some(fill.timestamp_ms);
            self.position = None;
        }
        Ok(realized)
    }

    /// Rebuild the ledger from venue-reported exposure at startup.
    ///
    /// Local state is not durable; the ledger reconciles against what the
    /// venues report before the decision core resumes.
    pub fn seed(
        &mut self,
        side: PairSide,
        size: f64,
        avg_price: f64,
        now_ms: i64,
    ) -> Result<(), LedgerError> {
        self.open(
            side,
            FillEntry {
                size,
                price: avg_price,
                timestamp_ms: now_ms,
            },
        )
    }

    /// Current position, if any
    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Whether a position is currently held
    pub fn is_open(&self) -> bool {
        self.position.is_some()
    }

    /// Currently held size, zero when empty
    pub fn total_size(&self) -> f64 {
        self.position.as_ref().map_or(0.0, |p| p.total_size)
    }

    /// When the last position fully closed, epoch milliseconds
    pub fn last_close_ms(&self) -> Option<i64> {
        self.closed_at_ms
    }

    /// Realized PnL accumulated over the ledger lifetime
    pub fn lifetime_realized_pnl(&self) -> f64 {
        self.lifetime_realized_pnl
    }

    fn check_fill(fill: &FillEntry) -> Result<(), LedgerError> {
        if fill.size <= 0.0 {
            return Err(LedgerError::NonPositiveFill(fill.size));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> LedgerLimits {
        LedgerLimits {
            max_add_positions: 2,
            max_position_size: 1.0,
        }
    }

    fn fill(size: f64, price: f64, ts: i64) -> FillEntry {
        FillEntry {
            size,
            price,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn test_open_requires_empty_ledger() {
        let mut ledger = PositionLedger::new(limits());
        ledger.open(PairSide::ShortEdgex, fill(0.1, 90.0, 1)).unwrap();
        let err = ledger
            .open(PairSide::ShortEdgex, fill(0.1, 90.0, 2))
            .unwrap_err();
        assert!(matches!(err, LedgerError::PositionAlreadyOpen));
    }

    #[test]
    fn test_total_size_tracks_entries() {
        let mut ledger = PositionLedger::new(limits());
        ledger.open(PairSide::ShortEdgex, fill(0.1, 90.0, 1)).unwrap();
        ledger.add(fill(0.2, 95.0, 2)).unwrap();

        let position = ledger.position().unwrap();
        let entered: f64 = position.entries.iter().map(|e| e.size).sum();
        assert!((position.total_size - entered).abs() < 1e-12);
        assert_eq!(position.add_count, 1);
    }

    #[test]
    fn test_add_count_ceiling_rejected_not_clamped() {
        let mut ledger = PositionLedger::new(limits());
        ledger.open(PairSide::ShortEdgex, fill(0.1, 90.0, 1)).unwrap();
        ledger.add(fill(0.1, 92.0, 2)).unwrap();
        ledger.add(fill(0.1, 94.0, 3)).unwrap();

        let err = ledger.add(fill(0.1, 96.0, 4)).unwrap_err();
        assert!(matches!(err, LedgerError::AddCountExceeded { .. }));
        assert_eq!(ledger.position().unwrap().add_count, 2);
    }

    #[test]
    fn test_max_size_rejected_not_clamped() {
        let mut ledger = PositionLedger::new(limits());
        ledger.open(PairSide::ShortEdgex, fill(0.9, 90.0, 1)).unwrap();
        let err = ledger.add(fill(0.2, 92.0, 2)).unwrap_err();
        assert!(matches!(err, LedgerError::MaxSizeExceeded { .. }));
        assert!((ledger.total_size() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_close_realizes_pnl_signed_per_side() {
        // short-edgeX entered at spread 100, closed at 40: profit
        let mut ledger = PositionLedger::new(limits());
        ledger.open(PairSide::ShortEdgex, fill(0.5, 100.0, 1)).unwrap();
        let realized = ledger.close(fill(0.5, 40.0, 2)).unwrap();
        assert!((realized - 30.0).abs() < 1e-9);
        assert!(!ledger.is_open());
        assert_eq!(ledger.last_close_ms(), Some(2));

        // short-Paradex entered at spread -100, closed at -40: also profit
        let mut ledger = PositionLedger::new(limits());
        ledger
            .open(PairSide::ShortParadex, fill(0.5, -100.0, 1))
            .unwrap();
        let realized = ledger.close(fill(0.5, -40.0, 2)).unwrap();
        assert!((realized - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_close_keeps_position_open() {
        let mut ledger = PositionLedger::new(limits());
        ledger.open(PairSide::ShortEdgex, fill(0.6, 100.0, 1)).unwrap();
        ledger.close(fill(0.2, 80.0, 2)).unwrap();

        assert!(ledger.is_open());
        assert!((ledger.total_size() - 0.4).abs() < 1e-12);
        // weighted average entry is unchanged by partial closes
        assert!((ledger.position().unwrap().weighted_avg_entry() - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_oversized_close_rejected() {
        let mut ledger = PositionLedger::new(limits());
        ledger.open(PairSide::ShortEdgex, fill(0.3, 100.0, 1)).unwrap();
        let err = ledger.close(fill(0.4, 80.0, 2)).unwrap_err();
        assert!(matches!(err, LedgerError::OversizedClose { .. }));
        assert!((ledger.total_size() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_non_positive_fills_rejected() {
        let mut ledger = PositionLedger::new(limits());
        assert!(matches!(
            ledger.open(PairSide::ShortEdgex, fill(0.0, 100.0, 1)),
            Err(LedgerError::NonPositiveFill(_))
        ));
        ledger.open(PairSide::ShortEdgex, fill(0.1, 100.0, 1)).unwrap();
        assert!(matches!(
            ledger.close(fill(-0.1, 80.0, 2)),
            Err(LedgerError::NonPositiveFill(_))
        ));
    }

    #[test]
    fn test_seed_rebuilds_exposure() {
        let mut ledger = PositionLedger::new(limits());
        ledger.seed(PairSide::ShortParadex, 0.4, -75.0, 1_000).unwrap();

        let position = ledger.position().unwrap();
        assert_eq!(position.side, PairSide::ShortParadex);
        assert!((position.total_size - 0.4).abs() < 1e-12);
        assert!((position.weighted_avg_entry() + 75.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_avg_entry() {
        let mut ledger = PositionLedger::new(limits());
        ledger.open(PairSide::ShortEdgex, fill(0.2, 100.0, 1)).unwrap();
        ledger.add(fill(0.2, 110.0, 2)).unwrap();
        assert!((ledger.position().unwrap().weighted_avg_entry() - 105.0).abs() < 1e-12);
    }
}

//! The arbitrage decision state machine
//!
//! Consumes spread updates and ledger state, emits order intents subject to
//! thresholds, time-locks, and risk limits. Exactly one instance manages
//! one position pair per process; evaluation is strictly sequential over a
//! serialized stream of spread events.

use crate::{
    ledger::{FillEntry, LedgerLimits, PairSide, Position, PositionLedger},
    market::{SpreadDirection, SpreadView},
    ArbitrageError,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

const MS_PER_DAY: i64 = 86_400_000;

/// Decision state of the managed pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArbState {
    /// No position, no pending order
    Idle,
    /// Open order submitted, awaiting fill
    OpenPending,
    /// Position live, no pending order
    Open,
    /// Add-on order submitted, awaiting fill
    AddPending,
    /// Close order submitted, awaiting fill
    ClosePending,
    /// Post-close lockout before re-entry
    Cooldown,
    /// Daily loss ceiling breached; terminal until manual restart
    Halted,
}

/// What an emitted intent asks the executor to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentKind {
    /// Open the pair at the base trade amount
    Open,
    /// Scale into the open pair
    Add,
    /// Close the full held size
    Close,
}

/// Which rule produced an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentReason {
    /// Entry threshold crossed from idle
    Threshold,
    /// Spread grew past the add increment since the last anchor
    SpreadGrowth,
    /// Spread converged under the close threshold
    Convergence,
    /// Unrealized profit reached the profit target
    ProfitTarget,
    /// Unrealized loss reached the loss-limit fraction of notional
    LossLimit,
    /// Profit retraced past the trailing callback from its peak
    TrailingStop,
    /// Position exceeded the force-close deadline
    ForceClose,
}

/// An order intent emitted by the state machine.
///
/// The runner expands it into one order per leg, signs, and submits; the
/// eventual fill/rejection/timeout resolves the pending state.
#[derive(Debug, Clone, Copy)]
pub struct OrderIntent {
    /// Open, add, or close
    pub kind: IntentKind,
    /// Pair side the intent acts on
    pub side: PairSide,
    /// Size in base units
    pub size: f64,
    /// Spread at decision time, if a fresh one existed
    pub spread: Option<f64>,
    /// Rule that fired
    pub reason: IntentReason,
    /// Decision time, epoch milliseconds
    pub created_at_ms: i64,
}

/// Confirmed pair fill handed back to the state machine.
///
/// `price` is the spread level the pair filled at
/// (edgeX fill price minus Paradex fill price).
#[derive(Debug, Clone, Copy)]
pub struct PairFill {
    /// Filled size in base units
    pub size: f64,
    /// Fill spread in quote currency units
    pub price: f64,
    /// Fill confirmation time, epoch milliseconds
    pub timestamp_ms: i64,
}

/// Immutable threshold set injected at construction.
///
/// The state machine holds no hardcoded business constants; every
/// comparison uses these values so behavior is testable by substitution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngineParams {
    /// Base trade amount per open/add, base units
    pub trade_amount: f64,
    /// Maximum total position size, base units
    pub max_position_size: f64,
    /// Maximum add-on fills per position
    pub max_add_positions: u32,
    /// Spread growth beyond the last anchor required for an add, quote units
    pub add_position_spread: f64,
    /// Entry threshold on |spread|, quote units
    pub arb_threshold: f64,
    /// Convergence close threshold on |spread|, quote units
    pub close_diff: f64,
    /// Unrealized profit target, quote units
    pub profit_diff_limit: f64,
    /// Loss limit as a fraction of position notional
    pub loss_limit: f64,
    /// Spread sanity ceiling, quote units; larger spreads are anomalous
    pub max_spread: f64,
    /// Minimum interval between entry evaluations, milliseconds
    pub trade_interval_ms: i64,
    /// Rolling daily realized-loss ceiling, quote units
    pub daily_loss_limit: f64,
    /// Hard force-close deadline after open, milliseconds
    pub force_close_ms: i64,
    /// Lock after open/add before the next add, milliseconds
    pub open_lock_ms: i64,
    /// Lock after a close before re-entry, milliseconds
    pub close_lock_ms: i64,
    /// Unrealized profit that arms the trailing stop, quote units
    pub trailing_profit: f64,
    /// Retracement fraction of peak profit that fires the trailing stop
    pub trailing_callback_rate: f64,
}

/// Counters exposed for monitoring
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngineStatistics {
    /// Confirmed open fills
    pub opens: u64,
    /// Confirmed add fills
    pub adds: u64,
    /// Fully closed positions
    pub closes: u64,
    /// Venue-rejected intents
    pub rejections: u64,
    /// Timed-out intents
    pub timeouts: u64,
    /// Realized PnL since start, quote units
    pub realized_pnl: f64,
}

#[derive(Debug, Clone, Copy)]
struct PendingIntent {
    kind: IntentKind,
    side: PairSide,
    prior: ArbState,
}

/// The decision core: multi-threshold state transitions with time-locks
/// and risk caps over a single managed position pair.
#[derive(Debug)]
pub struct ArbitrageStateMachine {
    params: EngineParams,
    state: ArbState,
    ledger: PositionLedger,
    pending: Option<PendingIntent>,
    /// |spread| at open or at the last confirmed add; adds are measured
    /// against this anchor
    anchor_spread: f64,
    peak_profit: f64,
    trailing_armed: bool,
    last_entry_check_ms: i64,
    last_close_ms: Option<i64>,
    daily_loss: f64,
    daily_window: i64,
    stats: EngineStatistics,
}

impl ArbitrageStateMachine {
    /// Build a machine with injected thresholds and an empty ledger
    pub fn new(params: EngineParams) -> Self {
        Self {
            params,
            state: ArbState::Idle,
            ledger: PositionLedger::new(LedgerLimits {
                max_add_positions: params.max_add_positions,
                max_position_size: params.max_position_size,
            }),
            pending: None,
            anchor_spread: 0.0,
            peak_profit: 0.0,
            trailing_armed: false,
            last_entry_check_ms: i64::MIN / 2,
            last_close_ms: None,
            daily_loss: 0.0,
            daily_window: 0,
            stats: EngineStatistics::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> ArbState {
        self.state
    }

    /// Read access to the position ledger
    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    /// Counters snapshot
    pub fn statistics(&self) -> EngineStatistics {
        self.stats
    }

    /// Realized loss accumulated in the current UTC day, quote units
    pub fn daily_loss(&self) -> f64 {
        self.daily_loss
    }

    /// Seed the ledger from venue-reported exposure and resume in `Open`.
    ///
    /// Used at startup: local state is not durable, so the ledger
    /// reconciles against the venues before the machine evaluates anything.
    pub fn resume_with_position(
        &mut self,
        side: PairSide,
        size: f64,
        avg_price: f64,
        now_ms: i64,
    ) -> crate::Result<()> {
        if self.state != ArbState::Idle {
            return Err(ArbitrageError::StateMachine(format!(
                "cannot seed position while {:?}",
                self.state
            ))
            .into());
        }
        self.ledger.seed(side, size, avg_price, now_ms)?;
        self.anchor_spread = avg_price.abs();
        self.state = ArbState::Open;
        info!(side = ?side, size, avg_price, "resumed with venue-reported position");
        Ok(())
    }

    /// Evaluate the transition rules against a spread observation.
    ///
    /// `view` is `None` when either venue's quote is stale or missing; the
    /// machine holds in that case, except for the time-based force-close
    /// rule which needs no market data.
    pub fn on_spread(&mut self, view: Option<&SpreadView>, now_ms: i64) -> Option<OrderIntent> {
        self.roll_daily_window(now_ms);

        match self.state {
            ArbState::Halted => None,
            ArbState::OpenPending | ArbState::AddPending | ArbState::ClosePending => None,
            ArbState::Cooldown => {
                let since_close = self
                    .last_close_ms
                    .map_or(i64::MAX, |closed| now_ms - closed);
                if since_close >= self.params.close_lock_ms {
                    debug!("cooldown elapsed, returning to idle");
                    self.state = ArbState::Idle;
                }
                None
            }
            ArbState::Idle => self.evaluate_idle(view?, now_ms),
            ArbState::Open => self.evaluate_open(view, now_ms),
        }
    }

    /// Apply a confirmed fill to the pending transition.
    ///
    /// Open/add fills advance to `Open`; a close fill advances to
    /// `Cooldown` once the ledger is empty (a partial close returns to
    /// `Open`, where the close rules re-fire on the next evaluation).
    pub fn on_fill(&mut self, fill: PairFill) -> crate::Result<()> {
        let pending = self.pending.take().ok_or_else(|| {
            ArbitrageError::StateMachine("fill received with no pending intent".to_string())
        })?;
        let entry = FillEntry {
            size: fill.size,
            price: fill.price,
            timestamp_ms: fill.timestamp_ms,
        };

        let applied: Result<(), ArbitrageError> = match pending.kind {
            IntentKind::Open => {
                self.ledger.open(pending.side, entry).map_err(Into::into)
            }
            IntentKind::Add => self.ledger.add(entry).map_err(Into::into),
            IntentKind::Close => match self.ledger.close(entry) {
                Ok(realized) => {
                    self.settle_close(realized, fill.timestamp_ms);
                    Ok(())
                }
                Err(e) => Err(e.into()),
            },
        };

        if let Err(e) = applied {
            // the ledger rejected the fill; revert to the prior stable
            // state rather than leave the machine straddling it
            error!(error = %e, kind = ?pending.kind, "ledger rejected confirmed fill");
            self.state = pending.prior;
            return Err(e.into());
        }

        match pending.kind {
            IntentKind::Open => {
                self.anchor_spread = fill.price.abs();
                self.reset_trailing();
                self.state = ArbState::Open;
                self.stats.opens += 1;
                info!(size = fill.size, price = fill.price, "position opened");
            }
            IntentKind::Add => {
                self.anchor_spread = fill.price.abs();
                self.state = ArbState::Open;
                self.stats.adds += 1;
                info!(size = fill.size, price = fill.price, "position increased");
            }
            IntentKind::Close => {
                // state already settled in settle_close
            }
        }
        Ok(())
    }

    /// Revert a pending transition after a venue rejection
    pub fn on_rejected(&mut self, now_ms: i64) {
        self.stats.rejections += 1;
        self.revert_pending("rejected", now_ms);
    }

    /// Revert a pending transition after a submission timeout.
    ///
    /// Returns `true`: the caller must reconcile against the venues before
    /// any further action, since the order outcome is unknown.
    pub fn on_timeout(&mut self, now_ms: i64) -> bool {
        self.stats.timeouts += 1;
        self.revert_pending("timed out", now_ms);
        true
    }

    fn evaluate_idle(&mut self, view: &SpreadView, now_ms: i64) -> Option<OrderIntent> {
        // entry rule is throttled regardless of update frequency
        if now_ms - self.last_entry_check_ms < self.params.trade_interval_ms {
            return None;
        }
        self.last_entry_check_ms = now_ms;

        if self.daily_loss >= self.params.daily_loss_limit {
            self.halt("daily loss ceiling reached before entry");
            return None;
        }

        let spread = view.spread.value;
        if spread.abs() < self.params.arb_threshold {
            return None;
        }
        if spread.abs() > self.params.max_spread {
            crate::log_risk!(warn, "max_spread", spread.abs(), self.params.max_spread,
                "implausible spread, suppressing entry");
            return None;
        }
        if let Some(closed) = self.last_close_ms {
            if now_ms - closed < self.params.close_lock_ms {
                return None;
            }
        }
        if self.ledger.is_open() {
            // single managed pair: Idle implies an empty ledger
            warn!("idle state with open ledger; holding");
            return None;
        }

        let side = side_for(view.spread.direction);
        self.pending = Some(PendingIntent {
            kind: IntentKind::Open,
            side,
            prior: ArbState::Idle,
        });
        self.state = ArbState::OpenPending;
        Some(OrderIntent {
            kind: IntentKind::Open,
            side,
            size: self.params.trade_amount,
            spread: Some(spread),
            reason: IntentReason::Threshold,
            created_at_ms: now_ms,
        })
    }

    fn evaluate_open(&mut self, view: Option<&SpreadView>, now_ms: i64) -> Option<OrderIntent> {
        let Some(snapshot) = self.ledger.position().map(PositionSnapshot::from) else {
            error!("open state with empty ledger; resetting to idle");
            self.state = ArbState::Idle;
            return None;
        };

        // hard safety valve: fires even without fresh market data
        if now_ms - snapshot.opened_at_ms >= self.params.force_close_ms {
            return Some(self.emit_close(&snapshot, None, IntentReason::ForceClose, now_ms));
        }

        let view = view?;
        let spread = view.spread.value;
        let upnl = snapshot
            .side
            .pnl(snapshot.avg_entry, spread, snapshot.total_size);
        let notional = snapshot.total_size * view.ref_price;

        if notional > 0.0 && upnl <= -(self.params.loss_limit * notional) {
            return Some(self.emit_close(&snapshot, Some(spread), IntentReason::LossLimit, now_ms));
        }

        if !self.trailing_armed && upnl >= self.params.trailing_profit {
            self.trailing_armed = true;
            self.peak_profit = upnl;
            debug!(upnl, "trailing stop armed");
        }
        if self.trailing_armed {
            if upnl > self.peak_profit {
                self.peak_profit = upnl;
            } else if self.peak_profit > 0.0
                && self.peak_profit - upnl >= self.params.trailing_callback_rate * self.peak_profit
            {
                return Some(self.emit_close(
                    &snapshot,
                    Some(spread),
                    IntentReason::TrailingStop,
                    now_ms,
                ));
            }
        }

        if upnl >= self.params.profit_diff_limit {
            return Some(self.emit_close(
                &snapshot,
                Some(spread),
                IntentReason::ProfitTarget,
                now_ms,
            ));
        }

        if spread.abs() <= self.params.close_diff {
            return Some(self.emit_close(
                &snapshot,
                Some(spread),
                IntentReason::Convergence,
                now_ms,
            ));
        }

        self.maybe_add(&snapshot, view, now_ms)
    }

    fn maybe_add(
        &mut self,
        snapshot: &PositionSnapshot,
        view: &SpreadView,
        now_ms: i64,
    ) -> Option<OrderIntent> {
        let spread = view.spread.value;

        if side_for(view.spread.direction) != snapshot.side {
            return None;
        }
        if snapshot.add_count >= self.params.max_add_positions {
            return None;
        }
        if spread.abs() - self.anchor_spread < self.params.add_position_spread {
            return None;
        }
        if now_ms - snapshot.last_action_at_ms < self.params.open_lock_ms {
            return None;
        }
        if spread.abs() > self.params.max_spread {
            crate::log_risk!(warn, "max_spread", spread.abs(), self.params.max_spread,
                "implausible spread, suppressing add");
            return None;
        }
        if snapshot.total_size + self.params.trade_amount > self.params.max_position_size {
            return None;
        }
        if self.daily_loss >= self.params.daily_loss_limit {
            self.halt("daily loss ceiling reached before add");
            return None;
        }

        self.pending = Some(PendingIntent {
            kind: IntentKind::Add,
            side: snapshot.side,
            prior: ArbState::Open,
        });
        self.state = ArbState::AddPending;
        Some(OrderIntent {
            kind: IntentKind::Add,
            side: snapshot.side,
            size: self.params.trade_amount,
            spread: Some(spread),
            reason: IntentReason::SpreadGrowth,
            created_at_ms: now_ms,
        })
    }

    fn emit_close(
        &mut self,
        snapshot: &PositionSnapshot,
        spread: Option<f64>,
        reason: IntentReason,
        now_ms: i64,
    ) -> OrderIntent {
        self.pending = Some(PendingIntent {
            kind: IntentKind::Close,
            side: snapshot.side,
            prior: ArbState::Open,
        });
        self.state = ArbState::ClosePending;
        info!(reason = ?reason, size = snapshot.total_size, "closing position");
        OrderIntent {
            kind: IntentKind::Close,
            side: snapshot.side,
            size: snapshot.total_size,
            spread,
            reason,
            created_at_ms: now_ms,
        }
    }

    fn settle_close(&mut self, realized: f64, now_ms: i64) {
        self.stats.realized_pnl += realized;
        if realized < 0.0 {
            self.daily_loss += -realized;
        }

        if self.ledger.is_open() {
            // partial close: remaining size stays under the close rules
            self.state = ArbState::Open;
        } else {
            self.last_close_ms = Some(now_ms);
            self.reset_trailing();
            self.stats.closes += 1;
            self.state = ArbState::Cooldown;
            info!(realized, daily_loss = self.daily_loss, "position closed");
        }

        if self.daily_loss >= self.params.daily_loss_limit {
            self.halt("daily realized loss ceiling breached");
        }
    }

    fn revert_pending(&mut self, outcome: &str, _now_ms: i64) {
        match self.pending.take() {
            Some(pending) => {
                warn!(kind = ?pending.kind, outcome, "order unresolved, reverting transition");
                self.state = pending.prior;
            }
            None => warn!(outcome, "resolution event with no pending intent"),
        }
    }

    fn halt(&mut self, reason: &str) {
        if self.state != ArbState::Halted {
            crate::log_risk!(error, "daily_loss_limit", self.daily_loss,
                self.params.daily_loss_limit, "{}; manual restart required", reason);
            self.state = ArbState::Halted;
        }
    }

    fn reset_trailing(&mut self) {
        self.trailing_armed = false;
        self.peak_profit = 0.0;
    }

    fn roll_daily_window(&mut self, now_ms: i64) {
        let window = now_ms.div_euclid(MS_PER_DAY);
        if window != self.daily_window {
            self.daily_window = window;
            self.daily_loss = 0.0;
            // Halted is terminal: a new day does not clear it
        }
    }
}

fn side_for(direction: SpreadDirection) -> PairSide {
    match direction {
        SpreadDirection::EdgexHigh => PairSide::ShortEdgex,
        SpreadDirection::ParadexHigh => PairSide::ShortParadex,
    }
}

struct PositionSnapshot {
    side: PairSide,
    total_size: f64,
    add_count: u32,
    avg_entry: f64,
    opened_at_ms: i64,
    last_action_at_ms: i64,
}

impl From<&Position> for PositionSnapshot {
    fn from(p: &Position) -> Self {
        Self {
            side: p.side,
            total_size: p.total_size,
            add_count: p.add_count,
            avg_entry: p.weighted_avg_entry(),
            opened_at_ms: p.opened_at_ms,
            last_action_at_ms: p.last_action_at_ms,
        }
    }
}

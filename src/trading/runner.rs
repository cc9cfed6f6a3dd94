//! Event loop wiring feeds, spread computation, the decision core,
//! signing, and order submission together
//!
//! Both venues' quote streams are funneled through a single ordered
//! consumption point, so exactly one state-machine evaluation is in flight
//! at a time and the ledger is only touched synchronously. Order
//! submission is awaited inline with a bounded timeout; by the time an
//! event-loop iteration ends, every emitted intent has resolved to a fill,
//! a rejection, or a timeout-plus-reconciliation.

use super::{FillResult, OrderExecutor, OrderPayload, OrderSide, SubmissionError};
use crate::{
    config::{ArbitrageConfig, VenuesConfig},
    ledger::PairSide,
    market::{Quote, QuoteFeed, SpreadCalculator},
    signing::{
        NonceMode, OutboundRequest, RequestSigner, SignedRequest, SigningKeyMaterial,
        StarkexSigner, TypedDataSigner,
    },
    strategy::{ArbState, ArbitrageStateMachine, EngineStatistics, IntentKind, OrderIntent, PairFill},
    venues::Venue,
    ArbitrageError, Result,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

const SIZE_EPS: f64 = 1e-9;
const RECONCILE_EPS: f64 = 1e-6;

/// One request signer per venue
#[derive(Debug)]
pub struct SignerSet {
    edgex: RequestSigner,
    paradex: RequestSigner,
}

impl SignerSet {
    /// Build both venue signers from configuration and run their
    /// startup self-checks
    pub fn from_config(venues: &VenuesConfig) -> Result<Self> {
        let nonce_mode = match &venues.edgex.nonce_mode {
            Some(mode) => mode.parse::<NonceMode>()?,
            None => NonceMode::default(),
        };
        let edgex_keys = SigningKeyMaterial::load(
            Venue::Edgex,
            &venues.edgex.account,
            &venues.edgex.private_key,
            venues.edgex.public_key.as_deref(),
        )
        .map_err(ArbitrageError::Signing)?;
        let edgex = RequestSigner::Starkex(StarkexSigner::new(edgex_keys, nonce_mode));

        let chain_id = venues.paradex.chain_id.as_deref().ok_or_else(|| {
            ArbitrageError::Config("venues.paradex.chain_id is required".to_string())
        })?;
        let paradex_keys = SigningKeyMaterial::load(
            Venue::Paradex,
            &venues.paradex.account,
            &venues.paradex.private_key,
            venues.paradex.public_key.as_deref(),
        )
        .map_err(ArbitrageError::Signing)?;
        let paradex = RequestSigner::TypedData(
            TypedDataSigner::new(paradex_keys, chain_id).map_err(ArbitrageError::Signing)?,
        );

        let set = Self { edgex, paradex };
        set.self_check()?;
        Ok(set)
    }

    /// The signer for a venue
    pub fn for_venue(&self, venue: Venue) -> &RequestSigner {
        match venue {
            Venue::Edgex => &self.edgex,
            Venue::Paradex => &self.paradex,
        }
    }

    /// Run both signers' sign-and-verify smoke tests
    pub fn self_check(&self) -> Result<()> {
        self.edgex.self_check().map_err(ArbitrageError::Signing)?;
        self.paradex.self_check().map_err(ArbitrageError::Signing)?;
        Ok(())
    }
}

/// Drives the full observe → decide → sign → submit loop for one
/// managed pair
pub struct EngineRunner {
    engine: ArbitrageStateMachine,
    calc: SpreadCalculator,
    signers: SignerSet,
    executor: Arc<dyn OrderExecutor>,
    symbol: String,
    edgex_order_path: String,
    paradex_order_path: String,
    order_timeout: Duration,
    /// exposure reported by the venues at startup, seeded into the ledger
    /// once the first fresh spread arrives
    pending_resume: Option<(PairSide, f64)>,
}

impl EngineRunner {
    /// Wire a runner from configuration; builds and self-checks both
    /// venue signers
    pub fn new(config: &ArbitrageConfig, executor: Arc<dyn OrderExecutor>) -> Result<Self> {
        let signers = SignerSet::from_config(&config.venues)?;
        Ok(Self {
            engine: ArbitrageStateMachine::new(config.engine_params()),
            calc: SpreadCalculator::new(config.execution.quote_staleness_ms),
            signers,
            executor,
            symbol: config.strategy.symbol.clone(),
            edgex_order_path: config.venues.edgex.order_path.clone(),
            paradex_order_path: config.venues.paradex.order_path.clone(),
            order_timeout: Duration::from_millis(config.execution.order_timeout_ms),
            pending_resume: None,
        })
    }

    /// Current decision state
    pub fn state(&self) -> ArbState {
        self.engine.state()
    }

    /// Engine counters snapshot
    pub fn statistics(&self) -> EngineStatistics {
        self.engine.statistics()
    }

    /// Run until the feed closes or `shutdown` flips to `true`.
    ///
    /// On shutdown no new intents are emitted; because submission is
    /// awaited inline, any in-flight pending transition has already
    /// resolved by the time the loop exits.
    pub async fn run(
        &mut self,
        feed: &dyn QuoteFeed,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        self.reconcile_startup().await?;

        let mut edgex_rx = feed.subscribe(Venue::Edgex).await?;
        let mut paradex_rx = feed.subscribe(Venue::Paradex).await?;
        info!(symbol = %self.symbol, "engine loop started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                maybe = edgex_rx.recv() => match maybe {
                    Some(quote) => self.process_quote(quote).await?,
                    None => break,
                },
                maybe = paradex_rx.recv() => match maybe {
                    Some(quote) => self.process_quote(quote).await?,
                    None => break,
                },
            }
        }

        info!(state = ?self.engine.state(), "engine loop stopped");
        Ok(())
    }

    async fn process_quote(&mut self, quote: Quote) -> Result<()> {
        let now_ms = Utc::now().timestamp_millis();
        self.calc.update(quote);
        let view = self.calc.current(now_ms);

        if let Some(view_ref) = view.as_ref() {
            if let Some((side, size)) = self.pending_resume.take() {
                // resumed exposure starts flat against the current spread
                self.engine
                    .resume_with_position(side, size, view_ref.spread.value, now_ms)?;
            }
            crate::log_spread!(debug, self.symbol, view_ref.spread.value,
                view_ref.spread.direction, "spread updated");
        }

        if let Some(intent) = self.engine.on_spread(view.as_ref(), now_ms) {
            crate::log_intent!(info, intent.kind, intent.side, intent.size, "intent emitted");
            self.execute_intent(&intent, now_ms).await?;
        }
        Ok(())
    }

    async fn execute_intent(&mut self, intent: &OrderIntent, now_ms: i64) -> Result<()> {
        let legs = leg_sides(intent.kind, intent.side);
        let first = self.build_request(legs[0].0, legs[0].1, intent.size, now_ms)?;
        let second = self.build_request(legs[1].0, legs[1].1, intent.size, now_ms)?;

        let (first_result, second_result) =
            tokio::join!(self.submit_leg(first), self.submit_leg(second));
        let (edgex_result, paradex_result) = if legs[0].0 == Venue::Edgex {
            (first_result, second_result)
        } else {
            (second_result, first_result)
        };

        match (edgex_result, paradex_result) {
            (Ok(edgex_fill), Ok(paradex_fill)) => {
                let fill = PairFill {
                    size: edgex_fill.size.min(paradex_fill.size),
                    price: edgex_fill.price - paradex_fill.price,
                    timestamp_ms: now_ms,
                };
                self.engine.on_fill(fill)?;
            }
            (Err(edgex_err), Err(paradex_err))
                if !edgex_err.outcome_unknown() && !paradex_err.outcome_unknown() =>
            {
                warn!(edgex = %edgex_err, paradex = %paradex_err, "pair rejected");
                self.engine.on_rejected(now_ms);
            }
            (edgex_result, paradex_result) => {
                // unknown outcome on at least one leg, or one-legged fill:
                // exposure must be reconciled before any further action
                error!(
                    edgex_filled = edgex_result.is_ok(),
                    paradex_filled = paradex_result.is_ok(),
                    "pair submission unresolved"
                );
                if self.engine.on_timeout(now_ms) {
                    self.reconcile().await;
                }
            }
        }
        Ok(())
    }

    async fn submit_leg(&self, request: SignedRequest) -> std::result::Result<FillResult, SubmissionError> {
        let venue = request.venue;
        match tokio::time::timeout(self.order_timeout, self.executor.submit(&request)).await {
            Ok(result) => result,
            Err(_) => Err(SubmissionError::Timeout { venue }),
        }
    }

    fn build_request(
        &self,
        venue: Venue,
        side: OrderSide,
        size: f64,
        now_ms: i64,
    ) -> Result<SignedRequest> {
        let quote = self.calc.latest_quote(venue).ok_or_else(|| {
            ArbitrageError::StaleData(format!("no quote stored for {}", venue))
        })?;
        let price = match side {
            OrderSide::Buy => quote.ask,
            OrderSide::Sell => quote.bid,
        };

        let payload = OrderPayload {
            market: self.symbol.clone(),
            side,
            size,
            price,
            client_order_id: format!("arb-{}", Uuid::new_v4()),
        };
        let body = serde_json::to_string(&payload)
            .map_err(|e| ArbitrageError::Config(format!("payload serialization: {}", e)))?;
        let query = vec![
            ("client_order_id".to_string(), payload.client_order_id.clone()),
            ("market".to_string(), payload.market.clone()),
            ("price".to_string(), payload.price.to_string()),
            ("side".to_string(), payload.side.to_string()),
            ("size".to_string(), payload.size.to_string()),
        ];

        let request = OutboundRequest {
            venue,
            method: "POST".to_string(),
            path: self.order_path(venue).to_string(),
            query,
            body,
            timestamp_ms: now_ms,
        };
        let signed = self
            .signers
            .for_venue(venue)
            .sign_request(&request)
            .map_err(ArbitrageError::Signing)?;
        Ok(signed)
    }

    fn order_path(&self, venue: Venue) -> &str {
        match venue {
            Venue::Edgex => &self.edgex_order_path,
            Venue::Paradex => &self.paradex_order_path,
        }
    }

    /// Rebuild exposure from the venues before the machine resumes.
    ///
    /// Local state is not durable across restarts; the venues' own
    /// reported positions are authoritative. Unbalanced exposure is
    /// refused outright rather than guessed at.
    async fn reconcile_startup(&mut self) -> Result<()> {
        let (edgex_pos, paradex_pos) = tokio::join!(
            self.executor.position(Venue::Edgex),
            self.executor.position(Venue::Paradex)
        );
        let edgex_pos = edgex_pos.map_err(ArbitrageError::Submission)?;
        let paradex_pos = paradex_pos.map_err(ArbitrageError::Submission)?;

        if edgex_pos.abs() <= SIZE_EPS && paradex_pos.abs() <= SIZE_EPS {
            info!("no venue exposure at startup");
            return Ok(());
        }

        if (edgex_pos + paradex_pos).abs() <= RECONCILE_EPS {
            let side = if edgex_pos < 0.0 {
                PairSide::ShortEdgex
            } else {
                PairSide::ShortParadex
            };
            warn!(
                size = edgex_pos.abs(),
                side = ?side,
                "venue-reported exposure found; resuming once a fresh spread arrives"
            );
            self.pending_resume = Some((side, edgex_pos.abs()));
            return Ok(());
        }

        Err(ArbitrageError::StateMachine(format!(
            "unbalanced venue exposure at startup (edgex {}, paradex {}); manual intervention required",
            edgex_pos, paradex_pos
        ))
        .into())
    }

    /// Post-timeout reconciliation: compare venue-reported exposure with
    /// the ledger and surface any divergence to the operator
    async fn reconcile(&mut self) {
        let (edgex_pos, paradex_pos) = tokio::join!(
            self.executor.position(Venue::Edgex),
            self.executor.position(Venue::Paradex)
        );
        match (edgex_pos, paradex_pos) {
            (Ok(edgex_pos), Ok(paradex_pos)) => {
                let (expected_edgex, expected_paradex) = match self.engine.ledger().position() {
                    Some(pos) => match pos.side {
                        PairSide::ShortEdgex => (-pos.total_size, pos.total_size),
                        PairSide::ShortParadex => (pos.total_size, -pos.total_size),
                    },
                    None => (0.0, 0.0),
                };
                if (edgex_pos - expected_edgex).abs() > RECONCILE_EPS
                    || (paradex_pos - expected_paradex).abs() > RECONCILE_EPS
                {
                    error!(
                        edgex_pos,
                        expected_edgex,
                        paradex_pos,
                        expected_paradex,
                        "venue exposure diverges from ledger; manual intervention required"
                    );
                } else {
                    info!("exposure reconciled against both venues");
                }
            }
            (edgex_result, paradex_result) => {
                error!(
                    edgex_ok = edgex_result.is_ok(),
                    paradex_ok = paradex_result.is_ok(),
                    "reconciliation query failed"
                );
            }
        }
    }
}

/// Venue/side assignment for the two legs of an intent.
///
/// Opens and adds sell the short venue and buy the long venue; closes
/// invert both legs.
fn leg_sides(kind: IntentKind, side: PairSide) -> [(Venue, OrderSide); 2] {
    let short_venue = side.short_venue();
    let long_venue = side.long_venue();
    match kind {
        IntentKind::Open | IntentKind::Add => {
            [(short_venue, OrderSide::Sell), (long_venue, OrderSide::Buy)]
        }
        IntentKind::Close => [(short_venue, OrderSide::Buy), (long_venue, OrderSide::Sell)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    mockall::mock! {
        Exec {}

        #[async_trait]
        impl OrderExecutor for Exec {
            async fn submit(&self, request: &SignedRequest) -> std::result::Result<FillResult, SubmissionError>;
            async fn position(&self, venue: Venue) -> std::result::Result<f64, SubmissionError>;
        }
    }

    #[test]
    fn test_leg_sides_open_sells_the_short_venue() {
        let legs = leg_sides(IntentKind::Open, PairSide::ShortEdgex);
        assert_eq!(legs[0], (Venue::Edgex, OrderSide::Sell));
        assert_eq!(legs[1], (Venue::Paradex, OrderSide::Buy));

        let legs = leg_sides(IntentKind::Add, PairSide::ShortParadex);
        assert_eq!(legs[0], (Venue::Paradex, OrderSide::Sell));
        assert_eq!(legs[1], (Venue::Edgex, OrderSide::Buy));
    }

    #[test]
    fn test_leg_sides_close_inverts_both_legs() {
        let legs = leg_sides(IntentKind::Close, PairSide::ShortEdgex);
        assert_eq!(legs[0], (Venue::Edgex, OrderSide::Buy));
        assert_eq!(legs[1], (Venue::Paradex, OrderSide::Sell));
    }

    #[test]
    fn test_signer_set_from_default_config() {
        let config = ArbitrageConfig::default();
        let signers = SignerSet::from_config(&config.venues).unwrap();
        assert_eq!(signers.for_venue(Venue::Edgex).venue(), Venue::Edgex);
        assert_eq!(signers.for_venue(Venue::Paradex).venue(), Venue::Paradex);
    }

    #[tokio::test]
    async fn test_startup_reconciliation_seeds_offsetting_exposure() {
        let mut exec = MockExec::new();
        exec.expect_position()
            .returning(|venue| match venue {
                Venue::Edgex => Ok(-0.2),
                Venue::Paradex => Ok(0.2),
            });

        let config = ArbitrageConfig::default();
        let mut runner = EngineRunner::new(&config, Arc::new(exec)).unwrap();
        runner.reconcile_startup().await.unwrap();
        assert_eq!(runner.pending_resume, Some((PairSide::ShortEdgex, 0.2)));
    }

    #[tokio::test]
    async fn test_startup_reconciliation_refuses_unbalanced_exposure() {
        let mut exec = MockExec::new();
        exec.expect_position()
            .returning(|venue| match venue {
                Venue::Edgex => Ok(-0.2),
                Venue::Paradex => Ok(0.05),
            });

        let config = ArbitrageConfig::default();
        let mut runner = EngineRunner::new(&config, Arc::new(exec)).unwrap();
        assert!(runner.reconcile_startup().await.is_err());
    }

    #[tokio::test]
    async fn test_startup_reconciliation_with_flat_venues() {
        let mut exec = MockExec::new();
        exec.expect_position().returning(|_| Ok(0.0));

        let config = ArbitrageConfig::default();
        let mut runner = EngineRunner::new(&config, Arc::new(exec)).unwrap();
        runner.reconcile_startup().await.unwrap();
        assert!(runner.pending_resume.is_none());
    }
}

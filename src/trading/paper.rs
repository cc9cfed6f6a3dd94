//! Paper trading: an in-process executor with simulated fills and a
//! simulated two-venue quote feed
//!
//! Exercises the full request → sign → submit path without touching a
//! venue. Fills are simulated with configurable slippage, fees, and a
//! rejection probability.

use super::{FillResult, OrderExecutor, OrderPayload, OrderSide, SubmissionError};
use crate::{
    config::ExecutionConfig,
    market::{Quote, QuoteFeed},
    signing::SignedRequest,
    venues::Venue,
    Result,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Fill simulation parameters
#[derive(Debug, Clone, Copy)]
pub struct PaperParams {
    /// Slippage applied against the order, basis points
    pub slippage_bps: f64,
    /// Fee rate as a fraction of notional
    pub fee_rate: f64,
    /// Probability an order is rejected (0.0 to 1.0)
    pub rejection_probability: f64,
}

#[derive(Debug, Default)]
struct PaperState {
    positions: HashMap<Venue, f64>,
    orders: u64,
    fees_paid: f64,
}

/// Aggregate paper-trading results
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PaperResults {
    /// Orders filled
    pub orders: u64,
    /// Total simulated fees, quote currency units
    pub fees_paid: f64,
    /// Net signed position at edgeX
    pub edgex_position: f64,
    /// Net signed position at Paradex
    pub paradex_position: f64,
}

/// Simulated order executor
pub struct PaperExecutor {
    params: PaperParams,
    state: Mutex<PaperState>,
}

impl PaperExecutor {
    /// Create an executor with explicit simulation parameters
    pub fn new(params: PaperParams) -> Self {
        Self {
            params,
            state: Mutex::new(PaperState::default()),
        }
    }

    /// Create an executor from the execution config section
    pub fn from_config(execution: &ExecutionConfig) -> Self {
        Self::new(PaperParams {
            slippage_bps: execution.paper_slippage_bps,
            fee_rate: execution.paper_fee_rate,
            rejection_probability: execution.paper_rejection_probability,
        })
    }

    /// Snapshot of fills, fees, and net positions
    pub async fn results(&self) -> PaperResults {
        let state = self.state.lock().await;
        PaperResults {
            orders: state.orders,
            fees_paid: state.fees_paid,
            edgex_position: state.positions.get(&Venue::Edgex).copied().unwrap_or(0.0),
            paradex_position: state.positions.get(&Venue::Paradex).copied().unwrap_or(0.0),
        }
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    async fn submit(&self, request: &SignedRequest) -> std::result::Result<FillResult, SubmissionError> {
        let payload: OrderPayload =
            serde_json::from_str(&request.body).map_err(|e| SubmissionError::Transport {
                venue: request.venue,
                reason: format!("unparseable order body: {}", e),
            })?;

        if self.params.rejection_probability > 0.0
            && rand::random::<f64>() < self.params.rejection_probability
        {
            return Err(SubmissionError::Rejected {
                venue: request.venue,
                reason: "simulated rejection".to_string(),
            });
        }

        // slippage always works against the order
        let slip = payload.price * self.params.slippage_bps / 10_000.0;
        let price = match payload.side {
            OrderSide::Buy => payload.price + slip,
            OrderSide::Sell => payload.price - slip,
        };
        let signed_size = match payload.side {
            OrderSide::Buy => payload.size,
            OrderSide::Sell => -payload.size,
        };

        let mut state = self.state.lock().await;
        *state.positions.entry(request.venue).or_insert(0.0) += signed_size;
        state.fees_paid += price * payload.size * self.params.fee_rate;
        state.orders += 1;
        let order_id = format!("paper-{}", state.orders);

        debug!(venue = %request.venue, side = %payload.side, size = payload.size,
            price, "paper fill");

        Ok(FillResult {
            venue: request.venue,
            order_id,
            size: payload.size,
            price,
            timestamp_ms: Utc::now().timestamp_millis(),
        })
    }

    async fn position(&self, venue: Venue) -> std::result::Result<f64, SubmissionError> {
        let state = self.state.lock().await;
        Ok(state.positions.get(&venue).copied().unwrap_or(0.0))
    }
}

/// Simulated two-venue quote feed.
///
/// Quotes random-walk around a shared base price; the edgeX side carries a
/// premium that opens and decays on a minute cadence, so spreads widen
/// past entry thresholds and then converge.
pub struct SimulatedFeed {
    base_price: f64,
    tick_interval: Duration,
    divergence: f64,
    half_spread: f64,
}

impl SimulatedFeed {
    /// Create a feed around `base_price` with the given peak divergence
    pub fn new(base_price: f64, tick_interval_ms: u64, divergence: f64) -> Self {
        Self {
            base_price,
            tick_interval: Duration::from_millis(tick_interval_ms),
            divergence,
            half_spread: base_price * 0.0001,
        }
    }
}

#[async_trait]
impl QuoteFeed for SimulatedFeed {
    async fn subscribe(&self, venue: Venue) -> Result<mpsc::Receiver<Quote>> {
        let (tx, rx) = mpsc::channel(64);
        let base_price = self.base_price;
        let tick_interval = self.tick_interval;
        let divergence = self.divergence;
        let half_spread = self.half_spread;

        tokio::spawn(async move {
            loop {
                let now_ms = Utc::now().timestamp_millis();
                let wobble = (rand::random::<f64>() - 0.5) * base_price * 0.0002;
                // premium alternates on a minute cadence: spread opens, then converges
                let premium = if venue == Venue::Edgex {
                    if (now_ms / 60_000) % 2 == 0 {
                        divergence
                    } else {
                        divergence * 0.1
                    }
                } else {
                    0.0
                };

                let mid = base_price + wobble + premium;
                let quote = Quote::new(venue, mid - half_spread, mid + half_spread, now_ms);
                if tx.send(quote).await.is_err() {
                    break;
                }
                tokio::time::sleep(tick_interval).await;
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_request(venue: Venue, payload: &OrderPayload) -> SignedRequest {
        SignedRequest {
            venue,
            message: String::new(),
            signature: String::new(),
            timestamp_ms: 0,
            headers: vec![],
            body: serde_json::to_string(payload).unwrap(),
        }
    }

    fn payload(side: OrderSide, size: f64, price: f64) -> OrderPayload {
        OrderPayload {
            market: "BTC-USD-PERP".to_string(),
            side,
            size,
            price,
            client_order_id: "arb-test".to_string(),
        }
    }

    fn executor(rejection_probability: f64) -> PaperExecutor {
        PaperExecutor::new(PaperParams {
            slippage_bps: 10.0,
            fee_rate: 0.001,
            rejection_probability,
        })
    }

    #[tokio::test]
    async fn test_buy_fill_slips_upward() {
        let exec = executor(0.0);
        let request = signed_request(Venue::Edgex, &payload(OrderSide::Buy, 0.1, 40_000.0));
        let fill = exec.submit(&request).await.unwrap();

        assert_eq!(fill.venue, Venue::Edgex);
        assert!((fill.price - 40_040.0).abs() < 1e-9);
        assert_eq!(fill.size, 0.1);
    }

    #[tokio::test]
    async fn test_sell_fill_slips_downward() {
        let exec = executor(0.0);
        let request = signed_request(Venue::Paradex, &payload(OrderSide::Sell, 0.1, 40_000.0));
        let fill = exec.submit(&request).await.unwrap();
        assert!((fill.price - 39_960.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_positions_and_fees_accumulate() {
        let exec = executor(0.0);
        exec.submit(&signed_request(Venue::Edgex, &payload(OrderSide::Sell, 0.2, 40_000.0)))
            .await
            .unwrap();
        exec.submit(&signed_request(Venue::Paradex, &payload(OrderSide::Buy, 0.2, 39_900.0)))
            .await
            .unwrap();

        assert_eq!(exec.position(Venue::Edgex).await.unwrap(), -0.2);
        assert_eq!(exec.position(Venue::Paradex).await.unwrap(), 0.2);

        let results = exec.results().await;
        assert_eq!(results.orders, 2);
        assert!(results.fees_paid > 0.0);
    }

    #[tokio::test]
    async fn test_certain_rejection() {
        let exec = executor(1.0);
        let request = signed_request(Venue::Edgex, &payload(OrderSide::Buy, 0.1, 40_000.0));
        let err = exec.submit(&request).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Rejected { .. }));
        assert_eq!(exec.position(Venue::Edgex).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_unparseable_body_is_transport_error() {
        let exec = executor(0.0);
        let mut request = signed_request(Venue::Edgex, &payload(OrderSide::Buy, 0.1, 1.0));
        request.body = "not json".to_string();
        let err = exec.submit(&request).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_simulated_feed_emits_quotes() {
        let feed = SimulatedFeed::new(40_000.0, 10, 100.0);
        let mut rx = feed.subscribe(Venue::Edgex).await.unwrap();
        let quote = rx.recv().await.unwrap();
        assert_eq!(quote.venue, Venue::Edgex);
        assert!(quote.bid < quote.ask);
    }
}

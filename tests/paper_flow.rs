//! Full-loop test: scripted quotes drive the runner through an open and a
//! close, with every order signed and filled by the paper executor

use async_trait::async_trait;
use chrono::Utc;
use cross_venue_arbitrage::{
    config::ArbitrageConfig,
    market::{Quote, QuoteFeed},
    strategy::ArbState,
    trading::{EngineRunner, PaperExecutor, PaperParams},
    venues::Venue,
    Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Replays a per-venue script of (delay, mid) pairs with wall-clock
/// timestamps, then holds the channel open briefly so in-flight
/// evaluation finishes before the runner sees the stream end.
struct ScriptedFeed {
    scripts: Mutex<HashMap<Venue, Vec<(u64, f64)>>>,
}

impl ScriptedFeed {
    fn new(edgex: Vec<(u64, f64)>, paradex: Vec<(u64, f64)>) -> Self {
        let mut scripts = HashMap::new();
        scripts.insert(Venue::Edgex, edgex);
        scripts.insert(Venue::Paradex, paradex);
        Self {
            scripts: Mutex::new(scripts),
        }
    }
}

#[async_trait]
impl QuoteFeed for ScriptedFeed {
    async fn subscribe(&self, venue: Venue) -> Result<mpsc::Receiver<Quote>> {
        let script = self
            .scripts
            .lock()
            .expect("script lock")
            .remove(&venue)
            .unwrap_or_default();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            for (delay_ms, mid) in script {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                let now_ms = Utc::now().timestamp_millis();
                let quote = Quote::new(venue, mid - 0.5, mid + 0.5, now_ms);
                if tx.send(quote).await.is_err() {
                    return;
                }
            }
            // keep the stream open long enough for the last evaluation
            tokio::time::sleep(Duration::from_millis(500)).await;
        });

        Ok(rx)
    }
}

fn test_config() -> ArbitrageConfig {
    let mut config = ArbitrageConfig::default();
    config.strategy.trade_amount = 0.01;
    config.strategy.max_position_size = 0.05;
    config.strategy.arb_threshold = 80.0;
    config.strategy.close_diff = 20.0;
    config.strategy.trade_interval_ms = 1;
    config.strategy.close_lock_ms = 60_000;
    config.execution.paper_rejection_probability = 0.0;
    config.execution.paper_slippage_bps = 0.0;
    config
}

#[tokio::test]
async fn open_and_close_through_the_full_loop() {
    let config = test_config();
    let executor = Arc::new(PaperExecutor::from_config(&config.execution));
    let mut runner = EngineRunner::new(&config, executor.clone()).unwrap();

    // edgeX trades 100 above Paradex, then converges to 5
    let feed = ScriptedFeed::new(
        vec![(0, 40_100.0), (400, 40_005.0)],
        vec![(100, 40_000.0), (500, 40_000.0)],
    );
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    runner.run(&feed, shutdown_rx).await.unwrap();

    let stats = runner.statistics();
    assert_eq!(stats.opens, 1, "expected exactly one open");
    assert_eq!(stats.closes, 1, "expected exactly one close");
    assert_eq!(stats.rejections, 0);
    assert_eq!(stats.timeouts, 0);
    assert_eq!(runner.state(), ArbState::Cooldown);

    // two legs per open and per close
    let results = executor.results().await;
    assert_eq!(results.orders, 4);
    assert!(results.edgex_position.abs() < 1e-9, "residual edgex exposure");
    assert!(results.paradex_position.abs() < 1e-9, "residual paradex exposure");

    // short the expensive venue, long the cheap one, profit on convergence
    assert!(stats.realized_pnl > 0.0, "convergence should realize profit");
}

#[tokio::test]
async fn rejected_orders_leave_the_machine_idle() {
    let mut config = test_config();
    config.execution.paper_rejection_probability = 1.0;
    let executor = Arc::new(PaperExecutor::new(PaperParams {
        slippage_bps: 0.0,
        fee_rate: 0.0,
        rejection_probability: 1.0,
    }));
    let mut runner = EngineRunner::new(&config, executor.clone()).unwrap();

    let feed = ScriptedFeed::new(vec![(0, 40_100.0)], vec![(100, 40_000.0)]);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    runner.run(&feed, shutdown_rx).await.unwrap();

    let stats = runner.statistics();
    assert_eq!(stats.opens, 0);
    assert_eq!(stats.rejections, 1);
    assert_eq!(runner.state(), ArbState::Idle);
    assert_eq!(executor.results().await.orders, 0);
}

#[tokio::test]
async fn shutdown_stops_the_loop() {
    let config = test_config();
    let executor = Arc::new(PaperExecutor::from_config(&config.execution));
    let mut runner = EngineRunner::new(&config, executor).unwrap();

    // a long script that would keep running without the shutdown signal
    let script: Vec<(u64, f64)> = (0..100).map(|_| (50u64, 40_000.0)).collect();
    let feed = ScriptedFeed::new(script.clone(), script);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = shutdown_tx.send(true);
    });

    tokio::time::timeout(Duration::from_secs(2), runner.run(&feed, shutdown_rx))
        .await
        .expect("runner did not stop on shutdown")
        .unwrap();
    assert_eq!(runner.state(), ArbState::Idle);
}

//! Arbitrage decision strategy

pub mod engine;

pub use engine::{
    ArbState, ArbitrageStateMachine, EngineParams, EngineStatistics, IntentKind, IntentReason,
    OrderIntent, PairFill,
};

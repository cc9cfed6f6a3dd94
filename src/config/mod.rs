//! Configuration management module
//!
//! Every threshold the decision core compares against is supplied here as
//! a plain numeric or duration value with documented units; the state
//! machine itself holds no hardcoded business constants.

pub mod settings;

pub use settings::*;

use crate::{strategy::EngineParams, ArbitrageError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for the arbitrage engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageConfig {
    /// Strategy thresholds and time-locks
    pub strategy: StrategyConfig,
    /// Risk limits
    pub risk: RiskConfig,
    /// Execution settings
    pub execution: ExecutionConfig,
    /// Per-venue authentication
    pub venues: VenuesConfig,
}

/// Strategy thresholds and time-locks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Trading symbol
    pub symbol: String,
    /// Base trade amount per open/add, base units
    pub trade_amount: f64,
    /// Entry threshold on |spread|, quote currency units
    pub arb_threshold: f64,
    /// Convergence close threshold on |spread|, quote currency units
    pub close_diff: f64,
    /// Spread growth beyond the last anchor required for an add, quote units
    pub add_position_spread: f64,
    /// Maximum add-on fills per position
    pub max_add_positions: u32,
    /// Maximum total position size, base units
    pub max_position_size: f64,
    /// Spread sanity ceiling, quote units
    pub max_spread: f64,
    /// Minimum interval between entry evaluations, milliseconds
    pub trade_interval_ms: i64,
    /// Lock after open/add before the next add, milliseconds
    pub open_lock_ms: i64,
    /// Lock after a close before re-entry, milliseconds
    pub close_lock_ms: i64,
    /// Hard force-close deadline after open, milliseconds
    pub force_close_ms: i64,
}

/// Risk limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Unrealized profit target, quote currency units
    pub profit_diff_limit: f64,
    /// Loss limit as a fraction of position notional
    pub loss_limit: f64,
    /// Unrealized profit that arms the trailing stop, quote units
    pub trailing_profit: f64,
    /// Retracement fraction of peak profit that fires the trailing stop
    pub trailing_callback_rate: f64,
    /// Rolling daily realized-loss ceiling, quote currency units
    pub daily_loss_limit: f64,
}

/// Execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Order submission timeout, milliseconds
    pub order_timeout_ms: u64,
    /// Quote staleness window, milliseconds
    pub quote_staleness_ms: i64,
    /// Paper-mode slippage in basis points
    pub paper_slippage_bps: f64,
    /// Paper-mode fee rate (fraction of notional)
    pub paper_fee_rate: f64,
    /// Paper-mode order rejection probability (0.0 to 1.0)
    pub paper_rejection_probability: f64,
}

/// Per-venue authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenuesConfig {
    /// edgeX credentials
    pub edgex: VenueAuthConfig,
    /// Paradex credentials
    pub paradex: VenueAuthConfig,
}

/// One venue's authentication configuration.
///
/// `private_key` supports `${VAR}` environment references so keys stay out
/// of config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueAuthConfig {
    /// Account id or StarkNet account address
    pub account: String,
    /// Stark-curve private key, hex
    pub private_key: String,
    /// On-record public key, hex; when set, must match the key derived
    /// from the private key
    pub public_key: Option<String>,
    /// Order submission path
    pub order_path: String,
    /// Chain id short string (typed-data venues)
    pub chain_id: Option<String>,
    /// ECDSA nonce mode: `deterministic` (default) or `randomized`
    pub nonce_mode: Option<String>,
}

impl ArbitrageConfig {
    /// Load configuration from a TOML file and expand environment
    /// references in the venue credential fields
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ArbitrageError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: ArbitrageConfig = toml::from_str(&content)
            .map_err(|e| ArbitrageError::Config(format!("Failed to parse config: {}", e)))?;

        config.venues.edgex.expand_env_vars()?;
        config.venues.paradex.expand_env_vars()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        ConfigValidator::validate_symbol(&self.strategy.symbol)?;
        ConfigValidator::validate_positive(self.strategy.trade_amount, "trade_amount")?;
        ConfigValidator::validate_positive(self.strategy.arb_threshold, "arb_threshold")?;
        ConfigValidator::validate_positive(self.strategy.max_position_size, "max_position_size")?;
        ConfigValidator::validate_positive(self.strategy.add_position_spread, "add_position_spread")?;
        ConfigValidator::validate_non_negative(self.strategy.close_diff, "close_diff")?;
        ConfigValidator::validate_positive(self.strategy.max_spread, "max_spread")?;
        ConfigValidator::validate_positive(self.strategy.trade_interval_ms as f64, "trade_interval_ms")?;
        ConfigValidator::validate_positive(self.strategy.force_close_ms as f64, "force_close_ms")?;

        if self.strategy.trade_amount > self.strategy.max_position_size {
            return Err(ArbitrageError::Config(
                "trade_amount cannot exceed max_position_size".to_string(),
            )
            .into());
        }
        if self.strategy.close_diff >= self.strategy.arb_threshold {
            return Err(ArbitrageError::Config(
                "close_diff must be below arb_threshold".to_string(),
            )
            .into());
        }
        if self.strategy.max_spread <= self.strategy.arb_threshold {
            return Err(ArbitrageError::Config(
                "max_spread must be above arb_threshold".to_string(),
            )
            .into());
        }

        ConfigValidator::validate_fraction(self.risk.loss_limit, "loss_limit")?;
        ConfigValidator::validate_fraction(
            self.risk.trailing_callback_rate,
            "trailing_callback_rate",
        )?;
        ConfigValidator::validate_positive(self.risk.daily_loss_limit, "daily_loss_limit")?;
        ConfigValidator::validate_positive(self.risk.profit_diff_limit, "profit_diff_limit")?;

        ConfigValidator::validate_positive(
            self.execution.order_timeout_ms as f64,
            "order_timeout_ms",
        )?;
        ConfigValidator::validate_positive(
            self.execution.quote_staleness_ms as f64,
            "quote_staleness_ms",
        )?;
        ConfigValidator::validate_fraction(
            self.execution.paper_rejection_probability,
            "paper_rejection_probability",
        )?;

        self.venues.edgex.validate("venues.edgex")?;
        self.venues.paradex.validate("venues.paradex")?;

        Ok(())
    }

    /// The immutable threshold set handed to the state machine
    pub fn engine_params(&self) -> EngineParams {
        EngineParams {
            trade_amount: self.strategy.trade_amount,
            max_position_size: self.strategy.max_position_size,
            max_add_positions: self.strategy.max_add_positions,
            add_position_spread: self.strategy.add_position_spread,
            arb_threshold: self.strategy.arb_threshold,
            close_diff: self.strategy.close_diff,
            profit_diff_limit: self.risk.profit_diff_limit,
            loss_limit: self.risk.loss_limit,
            max_spread: self.strategy.max_spread,
            trade_interval_ms: self.strategy.trade_interval_ms,
            daily_loss_limit: self.risk.daily_loss_limit,
            force_close_ms: self.strategy.force_close_ms,
            open_lock_ms: self.strategy.open_lock_ms,
            close_lock_ms: self.strategy.close_lock_ms,
            trailing_profit: self.risk.trailing_profit,
            trailing_callback_rate: self.risk.trailing_callback_rate,
        }
    }
}

impl VenueAuthConfig {
    /// Expand `${VAR}` references in the credential fields
    pub fn expand_env_vars(&mut self) -> Result<()> {
        self.account = EnvExpander::expand(&self.account)?;
        self.private_key = EnvExpander::expand(&self.private_key)?;
        if let Some(public_key) = &self.public_key {
            self.public_key = Some(EnvExpander::expand(public_key)?);
        }
        Ok(())
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.account.is_empty() {
            return Err(
                ArbitrageError::Config(format!("{}.account cannot be empty", section)).into(),
            );
        }
        if self.private_key.is_empty() {
            return Err(
                ArbitrageError::Config(format!("{}.private_key cannot be empty", section)).into(),
            );
        }
        if self.order_path.is_empty() || !self.order_path.starts_with('/') {
            return Err(ArbitrageError::Config(format!(
                "{}.order_path must start with '/'",
                section
            ))
            .into());
        }
        Ok(())
    }
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyConfig {
                symbol: "BTC-USD-PERP".to_string(),
                trade_amount: 0.01,
                arb_threshold: 80.0,
                close_diff: 20.0,
                add_position_spread: 5.0,
                max_add_positions: 3,
                max_position_size: 0.05,
                max_spread: 500.0,
                trade_interval_ms: 1_000,
                open_lock_ms: 30_000,
                close_lock_ms: 300_000,
                force_close_ms: 14_400_000,
            },
            risk: RiskConfig {
                profit_diff_limit: 60.0,
                loss_limit: 0.01,
                trailing_profit: 30.0,
                trailing_callback_rate: 0.3,
                daily_loss_limit: 500.0,
            },
            execution: ExecutionConfig {
                order_timeout_ms: 5_000,
                quote_staleness_ms: 5_000,
                paper_slippage_bps: 1.0,
                paper_fee_rate: 0.0005,
                paper_rejection_probability: 0.0,
            },
            venues: VenuesConfig {
                edgex: VenueAuthConfig {
                    account: "dev-account".to_string(),
                    private_key:
                        "0x3c1e9550e66958296d11b60f8e8e7a7ad990d07fa65d5f7652c4a6c87d4e3cc"
                            .to_string(),
                    public_key: None,
                    order_path: "/api/v1/private/order".to_string(),
                    chain_id: None,
                    nonce_mode: Some("deterministic".to_string()),
                },
                paradex: VenueAuthConfig {
                    account:
                        "0x129f6e9a19b4a6b6b06fb9c85bf22bf5c25bfbb1195e3fcd8e0b3f96b3f7dee"
                            .to_string(),
                    private_key:
                        "0x57c2d22f9a8f387b6bfdfd9e3b431e22ab6503056b10e828b4fe8cbe2dbb53b"
                            .to_string(),
                    public_key: None,
                    order_path: "/orders".to_string(),
                    chain_id: Some("PRIVATE_SN_PARACLEAR_MAINNET".to_string()),
                    nonce_mode: None,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_validation() {
        let config = ArbitrageConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config_validation() {
        let mut config = ArbitrageConfig::default();
        config.strategy.arb_threshold = 0.0;
        assert!(config.validate().is_err());

        let mut config = ArbitrageConfig::default();
        config.strategy.close_diff = config.strategy.arb_threshold;
        assert!(config.validate().is_err());

        let mut config = ArbitrageConfig::default();
        config.risk.loss_limit = 1.5;
        assert!(config.validate().is_err());

        let mut config = ArbitrageConfig::default();
        config.strategy.trade_amount = config.strategy.max_position_size * 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = ArbitrageConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(!toml_str.is_empty());

        let parsed: ArbitrageConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.strategy.symbol, parsed.strategy.symbol);
        assert_eq!(config.venues.paradex.chain_id, parsed.venues.paradex.chain_id);
    }

    #[test]
    fn test_config_from_file_expands_env() {
        std::env::set_var("TEST_ARB_PRIVATE_KEY", "0xabc123");
        let mut config = ArbitrageConfig::default();
        config.venues.edgex.private_key = "${TEST_ARB_PRIVATE_KEY}".to_string();
        let toml_content = toml::to_string(&config).unwrap();

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let loaded = ArbitrageConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(loaded.venues.edgex.private_key, "0xabc123");
    }

    #[test]
    fn test_engine_params_mirror_config() {
        let config = ArbitrageConfig::default();
        let params = config.engine_params();
        assert_eq!(params.arb_threshold, config.strategy.arb_threshold);
        assert_eq!(params.daily_loss_limit, config.risk.daily_loss_limit);
        assert_eq!(params.close_lock_ms, config.strategy.close_lock_ms);
    }
}

//! Settings management utilities

use crate::{ArbitrageError, Result};
use std::env;

/// Environment variable expansion utility
pub struct EnvExpander;

impl EnvExpander {
    /// Expand environment variables in a string.
    /// Supports the `${VAR_NAME}` pattern.
    pub fn expand(input: &str) -> Result<String> {
        let mut result = input.to_string();

        while let Some(start) = result.find("${") {
            if let Some(end) = result[start..].find('}') {
                let var_name = &result[start + 2..start + end];
                let var_value = env::var(var_name).map_err(|_| {
                    ArbitrageError::Config(format!(
                        "Environment variable '{}' not found",
                        var_name
                    ))
                })?;

                result.replace_range(start..start + end + 1, &var_value);
            } else {
                return Err(ArbitrageError::Config(
                    "Unclosed environment variable reference".to_string(),
                )
                .into());
            }
        }

        Ok(result)
    }
}

/// Configuration validation utilities
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a symbol format
    pub fn validate_symbol(symbol: &str) -> Result<()> {
        if symbol.is_empty() {
            return Err(ArbitrageError::Config("Symbol cannot be empty".to_string()).into());
        }

        if !symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ArbitrageError::Config(
                "Symbol must contain only alphanumeric characters and dashes".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// Validate a fraction value (0.0 to 1.0)
    pub fn validate_fraction(value: f64, name: &str) -> Result<()> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ArbitrageError::Config(format!(
                "{} must be between 0.0 and 1.0",
                name
            ))
            .into());
        }
        Ok(())
    }

    /// Validate a strictly positive value
    pub fn validate_positive(value: f64, name: &str) -> Result<()> {
        if value <= 0.0 {
            return Err(ArbitrageError::Config(format!("{} must be positive", name)).into());
        }
        Ok(())
    }

    /// Validate a non-negative value
    pub fn validate_non_negative(value: f64, name: &str) -> Result<()> {
        if value < 0.0 {
            return Err(
                ArbitrageError::Config(format!("{} must not be negative", name)).into(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_expansion() {
        env::set_var("TEST_EXPAND_VAR", "expanded");
        assert_eq!(
            EnvExpander::expand("prefix-${TEST_EXPAND_VAR}-suffix").unwrap(),
            "prefix-expanded-suffix"
        );
        assert_eq!(EnvExpander::expand("no-vars").unwrap(), "no-vars");
    }

    #[test]
    fn test_env_expansion_missing_var() {
        assert!(EnvExpander::expand("${DEFINITELY_NOT_SET_12345}").is_err());
    }

    #[test]
    fn test_env_expansion_unclosed() {
        assert!(EnvExpander::expand("${UNCLOSED").is_err());
    }

    #[test]
    fn test_validate_symbol() {
        assert!(ConfigValidator::validate_symbol("BTC-USD-PERP").is_ok());
        assert!(ConfigValidator::validate_symbol("BTCUSDT").is_ok());
        assert!(ConfigValidator::validate_symbol("").is_err());
        assert!(ConfigValidator::validate_symbol("BTC/USD").is_err());
    }

    #[test]
    fn test_validate_fraction() {
        assert!(ConfigValidator::validate_fraction(0.0, "f").is_ok());
        assert!(ConfigValidator::validate_fraction(1.0, "f").is_ok());
        assert!(ConfigValidator::validate_fraction(-0.1, "f").is_err());
        assert!(ConfigValidator::validate_fraction(1.1, "f").is_err());
    }

    #[test]
    fn test_validate_positive() {
        assert!(ConfigValidator::validate_positive(0.1, "p").is_ok());
        assert!(ConfigValidator::validate_positive(0.0, "p").is_err());
        assert!(ConfigValidator::validate_non_negative(0.0, "n").is_ok());
        assert!(ConfigValidator::validate_non_negative(-0.1, "n").is_err());
    }
}

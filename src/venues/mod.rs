//! Venue identities

use crate::ArbitrageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported trading venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    /// edgeX perpetual futures (StarkEx-style request signing)
    Edgex,
    /// Paradex perpetual futures (StarkNet typed-data signing)
    Paradex,
}

impl Venue {
    /// The opposite venue of the managed pair
    pub fn other(&self) -> Venue {
        match self {
            Venue::Edgex => Venue::Paradex,
            Venue::Paradex => Venue::Edgex,
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::Edgex => write!(f, "edgex"),
            Venue::Paradex => write!(f, "paradex"),
        }
    }
}

impl std::str::FromStr for Venue {
    type Err = ArbitrageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "edgex" => Ok(Venue::Edgex),
            "paradex" => Ok(Venue::Paradex),
            _ => Err(ArbitrageError::Config(format!("Unknown venue: {}", s))),
        }
    }
}

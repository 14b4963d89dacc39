//! Engine Configuration
//!
//! Search budgets, parallelism axes (tree replicas, playouts per step), the
//! playout variant, and the device memory budget. All parameters are
//! validated eagerly when an engine is constructed, before any GPU
//! allocation takes place.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EngineError, Result};

/// Largest supported board shape (rows, columns)
pub const MAX_BOARD_SHAPE: (usize, usize) = (32, 32);
/// Largest supported per-state extra-info size in bytes
pub const MAX_EXTRA_INFO_SIZE: usize = 4096;
/// Largest supported branching factor
pub const MAX_ACTIONS_LIMIT: usize = 512;
/// Largest supported number of independent tree replicas
pub const MAX_TREES: usize = 512;
/// Largest supported number of playouts per step
pub const MAX_PLAYOUTS: usize = 4096;

/// Playout scheduling variant.
///
/// The OCP/ACP axis decides how many freshly expanded children receive
/// rollouts in a step: one child picked uniformly at random, or every legal
/// child. The thrifty/prodigal axis trades device occupancy against the
/// transient rollout memory footprint: thrifty keeps few resident threads
/// that loop over rollouts, prodigal schedules one thread per rollout up
/// front. Both profiles draw from identical random streams, so within a
/// variant family they produce the same statistics and differ only in
/// timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    OcpThrifty,
    OcpProdigal,
    AcpThrifty,
    AcpProdigal,
}

impl Variant {
    /// True when every legal child of the expanded leaf receives rollouts
    pub fn is_acp(self) -> bool {
        matches!(self, Variant::AcpThrifty | Variant::AcpProdigal)
    }

    /// True when one physical thread is scheduled per rollout
    pub fn is_prodigal(self) -> bool {
        matches!(self, Variant::OcpProdigal | Variant::AcpProdigal)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Variant::OcpThrifty => "ocp_thrifty",
            Variant::OcpProdigal => "ocp_prodigal",
            Variant::AcpThrifty => "acp_thrifty",
            Variant::AcpProdigal => "acp_prodigal",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ocp_thrifty" => Ok(Variant::OcpThrifty),
            "ocp_prodigal" => Ok(Variant::OcpProdigal),
            "acp_thrifty" => Ok(Variant::AcpThrifty),
            "acp_prodigal" => Ok(Variant::AcpProdigal),
            other => Err(format!(
                "unknown variant '{}' (expected one of: ocp_thrifty, ocp_prodigal, acp_thrifty, acp_prodigal)",
                other
            )),
        }
    }
}

/// Configuration of a GPU search engine instance
#[derive(Debug, Clone)]
pub struct MctsConfig {
    /// Wall-clock budget per decision; `None` means unbounded
    pub search_time_limit: Option<Duration>,
    /// Step budget per decision; `None` means unbounded
    pub search_steps_limit: Option<u64>,
    /// Number of independent tree replicas grown in parallel
    pub n_trees: usize,
    /// Rollouts per playout target per step; must be a power of two
    pub n_playouts: usize,
    /// Playout scheduling variant
    pub variant: Variant,
    /// Exploration constant of the UCB1 selection formula
    pub ucb_c: f64,
    /// Seed for all random streams (device rollouts included)
    pub seed: u64,
    /// Device memory budget in bytes for the tree arena
    pub device_memory: u64,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            search_time_limit: Some(Duration::from_secs_f64(5.0)),
            search_steps_limit: None,
            n_trees: 8,
            n_playouts: 128,
            variant: Variant::AcpProdigal,
            ucb_c: 2.0,
            seed: 0,
            device_memory: 2 * 1024 * 1024 * 1024,
        }
    }
}

impl MctsConfig {
    /// Validates the game-independent parameters.
    ///
    /// Board-shape and action-count checks live in [`validate_game`] since
    /// they depend on the game the engine is instantiated for.
    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.search_time_limit {
            if t <= Duration::ZERO {
                return Err(EngineError::Configuration(
                    "search_time_limit must be positive or unbounded".to_string(),
                ));
            }
        }
        if let Some(s) = self.search_steps_limit {
            if s == 0 {
                return Err(EngineError::Configuration(
                    "search_steps_limit must be positive or unbounded".to_string(),
                ));
            }
        }
        if self.n_trees == 0 || self.n_trees > MAX_TREES {
            return Err(EngineError::Configuration(format!(
                "n_trees must be in 1..={}, got {}",
                MAX_TREES, self.n_trees
            )));
        }
        if self.n_playouts == 0 || !self.n_playouts.is_power_of_two() {
            return Err(EngineError::Configuration(format!(
                "n_playouts must be a power of two, got {}",
                self.n_playouts
            )));
        }
        if self.n_playouts > MAX_PLAYOUTS {
            return Err(EngineError::Configuration(format!(
                "n_playouts must be at most {}, got {}",
                MAX_PLAYOUTS, self.n_playouts
            )));
        }
        if !self.ucb_c.is_finite() || self.ucb_c < 0.0 {
            return Err(EngineError::Configuration(format!(
                "ucb_c must be a finite non-negative number, got {}",
                self.ucb_c
            )));
        }
        if self.device_memory == 0 {
            return Err(EngineError::Configuration(
                "device_memory must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Validates the game-dependent dimensions against the supported bounds
    pub fn validate_game(
        &self,
        board_shape: (usize, usize),
        extra_info_size: usize,
        max_actions: usize,
    ) -> Result<()> {
        let (m, n) = board_shape;
        if m == 0 || n == 0 || m > MAX_BOARD_SHAPE.0 || n > MAX_BOARD_SHAPE.1 {
            return Err(EngineError::Configuration(format!(
                "board shape ({}, {}) outside supported bounds (1, 1)..=({}, {})",
                m, n, MAX_BOARD_SHAPE.0, MAX_BOARD_SHAPE.1
            )));
        }
        if extra_info_size > MAX_EXTRA_INFO_SIZE {
            return Err(EngineError::Configuration(format!(
                "extra info size {} exceeds supported maximum {}",
                extra_info_size, MAX_EXTRA_INFO_SIZE
            )));
        }
        if max_actions == 0 || max_actions > MAX_ACTIONS_LIMIT {
            return Err(EngineError::Configuration(format!(
                "max actions {} outside supported bounds 1..={}",
                max_actions, MAX_ACTIONS_LIMIT
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(MctsConfig::default().validate().is_ok());
    }

    #[test]
    fn playout_count_must_be_power_of_two() {
        let mut config = MctsConfig::default();
        config.n_playouts = 100;
        assert!(matches!(
            config.validate(),
            Err(EngineError::Configuration(_))
        ));
        config.n_playouts = 128;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn board_shape_bounds() {
        let config = MctsConfig::default();
        assert!(config.validate_game((33, 10), 0, 7).is_err());
        assert!(config.validate_game((32, 32), 0, 7).is_ok());
        assert!(config.validate_game((0, 7), 0, 7).is_err());
    }

    #[test]
    fn action_and_extra_bounds() {
        let config = MctsConfig::default();
        assert!(config.validate_game((6, 7), 4097, 7).is_err());
        assert!(config.validate_game((6, 7), 4096, 513).is_err());
        assert!(config.validate_game((6, 7), 4096, 512).is_ok());
    }

    #[test]
    fn budgets_must_be_positive_or_unbounded() {
        let mut config = MctsConfig::default();
        config.search_time_limit = Some(Duration::ZERO);
        assert!(config.validate().is_err());
        config.search_time_limit = None;
        config.search_steps_limit = Some(0);
        assert!(config.validate().is_err());
        config.search_steps_limit = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn variant_round_trip() {
        for s in ["ocp_thrifty", "ocp_prodigal", "acp_thrifty", "acp_prodigal"] {
            let v: Variant = s.parse().unwrap();
            assert_eq!(v.to_string(), s);
        }
        assert!("acp".parse::<Variant>().is_err());
    }
}

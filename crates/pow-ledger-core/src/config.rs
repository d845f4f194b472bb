//! Per-ledger configuration.

use crate::constants::{DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD, HASH_HEX_SIZE};
use crate::ConfigError;
use serde::{Deserialize, Serialize};

/// Fixed for the lifetime of a [`crate::Ledger`].
///
/// `difficulty` is the number of leading zero hex digits a mined hash needs;
/// each extra digit multiplies expected mining work by 16. `mining_reward` is
/// the amount minted to the miner after every mined block. `parallel` selects
/// the multi-threaded nonce search for every mining call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
    #[serde(default = "default_mining_reward")]
    pub mining_reward: u64,
    #[serde(default)]
    pub parallel: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            mining_reward: default_mining_reward(),
            parallel: false,
        }
    }
}

impl LedgerConfig {
    pub fn with_difficulty(mut self, difficulty: usize) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_mining_reward(mut self, mining_reward: u64) -> Self {
        self.mining_reward = mining_reward;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.difficulty == 0 {
            return Err(ConfigError::ZeroDifficulty);
        }
        if self.difficulty > HASH_HEX_SIZE {
            return Err(ConfigError::DifficultyTooHigh {
                difficulty: self.difficulty,
                max: HASH_HEX_SIZE,
            });
        }
        if self.mining_reward == 0 {
            return Err(ConfigError::ZeroReward);
        }
        Ok(())
    }

    /// Parse and validate. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: LedgerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

fn default_difficulty() -> usize {
    DEFAULT_DIFFICULTY
}

fn default_mining_reward() -> u64 {
    DEFAULT_MINING_REWARD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.difficulty, 4);
        assert_eq!(config.mining_reward, 100);
        assert!(!config.parallel);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = LedgerConfig::from_toml_str("").unwrap();
        assert_eq!(config, LedgerConfig::default());
    }

    #[test]
    fn toml_overrides() {
        let config = LedgerConfig::from_toml_str("difficulty = 2\nparallel = true\n").unwrap();
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.mining_reward, 100);
        assert!(config.parallel);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(
            LedgerConfig::default().with_difficulty(0).validate(),
            Err(ConfigError::ZeroDifficulty)
        ));
        assert!(matches!(
            LedgerConfig::default().with_difficulty(65).validate(),
            Err(ConfigError::DifficultyTooHigh { difficulty: 65, max: 64 })
        ));
        assert!(matches!(
            LedgerConfig::default().with_mining_reward(0).validate(),
            Err(ConfigError::ZeroReward)
        ));
        assert!(matches!(
            LedgerConfig::from_toml_str("mining_reward = 0"),
            Err(ConfigError::ZeroReward)
        ));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            LedgerConfig::from_toml_str("difficulty = \"four\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            LedgerConfig::from_toml_str("difficulty = -1"),
            Err(ConfigError::Parse(_))
        ));
    }
}

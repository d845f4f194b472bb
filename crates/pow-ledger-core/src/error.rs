//! Error types for the ledger core.

use thiserror::Error;

/// Rejected at transaction construction (and deserialization).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("transaction recipient address is empty")]
    EmptyRecipient,
    #[error("transaction sender address is present but empty")]
    EmptySender,
}

/// First integrity failure found while walking the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainFault {
    #[error("block {index}: stored hash {stored} does not match recomputed hash {computed}")]
    HashMismatch {
        index: usize,
        stored: String,
        computed: String,
    },
    #[error("block {index}: previous hash {found} does not match predecessor hash {expected}")]
    LinkMismatch {
        index: usize,
        expected: String,
        found: String,
    },
}

impl ChainFault {
    pub fn index(&self) -> usize {
        match self {
            ChainFault::HashMismatch { index, .. } | ChainFault::LinkMismatch { index, .. } => {
                *index
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MineError {
    #[error("mining cancelled")]
    Cancelled,
    #[error("mining deadline reached")]
    TimedOut,
    #[error("difficulty {difficulty} exceeds the hash length")]
    DifficultyOutOfRange { difficulty: usize },
    #[error("nonce space exhausted")]
    NonceSpaceExhausted,
    #[error("chain head moved from {expected} to {found} while mining")]
    StaleTip { expected: String, found: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("difficulty must be at least 1")]
    ZeroDifficulty,
    #[error("difficulty {difficulty} is above the maximum of {max}")]
    DifficultyTooHigh { difficulty: usize, max: usize },
    #[error("mining reward must be positive")]
    ZeroReward,
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("a chain needs at least a genesis block")]
    EmptyChain,
    #[error("first block links to {previous_hash:?}, expected a genesis block")]
    NotGenesis { previous_hash: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

//! Core types for a hash-linked proof-of-work ledger.
//!
//! A [`Block`] carries a batch of [`Transaction`]s, links to its predecessor by
//! hash and is sealed by a nonce search (see [`pow`] and [`mine`]). The
//! [`Ledger`] owns the chain and the pending pool; [`SharedLedger`] wraps it
//! for use from several threads.

pub mod chain;
pub mod config;
pub mod constants;
pub mod control;
pub mod error;
pub mod mine;
pub mod shared;

pub use chain::Ledger;
pub use config::LedgerConfig;
pub use control::MiningControl;
pub use error::{ChainFault, ConfigError, LedgerError, MineError, TransactionError};
pub use shared::{MinedBlock, SharedLedger};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, 0 if the clock is set before it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A value transfer. A transaction without a source mints value (mining reward).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    to_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_address: Option<String>,
    amount: u64,
}

impl Transaction {
    /// Validated constructor. The recipient must be non-blank, and a source, when
    /// present, must be non-blank too.
    pub fn new(
        to_address: impl Into<String>,
        from_address: Option<String>,
        amount: u64,
    ) -> Result<Self, TransactionError> {
        let tx = Self {
            to_address: to_address.into(),
            from_address,
            amount,
        };
        tx.validate()?;
        Ok(tx)
    }

    /// Deserialized transactions are not checked (a recorded chain holds the
    /// genesis placeholder), so the ledger runs this again on submission.
    pub fn validate(&self) -> Result<(), TransactionError> {
        if self.to_address.trim().is_empty() {
            return Err(TransactionError::EmptyRecipient);
        }
        if self
            .from_address
            .as_deref()
            .is_some_and(|from| from.trim().is_empty())
        {
            return Err(TransactionError::EmptySender);
        }
        Ok(())
    }

    pub fn transfer(
        from: impl Into<String>,
        to: impl Into<String>,
        amount: u64,
    ) -> Result<Self, TransactionError> {
        Self::new(to, Some(from.into()), amount)
    }

    pub fn minted(to: impl Into<String>, amount: u64) -> Result<Self, TransactionError> {
        Self::new(to, None, amount)
    }

    /// Miner reward. Unchecked: whatever address the miner names is paid.
    pub(crate) fn reward(to: &str, amount: u64) -> Self {
        Self {
            to_address: to.to_owned(),
            from_address: None,
            amount,
        }
    }

    pub(crate) fn genesis_placeholder() -> Self {
        Self {
            to_address: String::new(),
            from_address: None,
            amount: 0,
        }
    }

    pub fn to_address(&self) -> &str {
        &self.to_address
    }

    pub fn from_address(&self) -> Option<&str> {
        self.from_address.as_deref()
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn is_minted(&self) -> bool {
        self.from_address.is_none()
    }

    /// Signed effect of this transaction on `address`.
    pub fn balance_delta(&self, address: &str) -> i128 {
        let mut delta = 0i128;
        if self.from_address() == Some(address) {
            delta -= i128::from(self.amount);
        }
        if self.to_address == address {
            delta += i128::from(self.amount);
        }
        delta
    }
}

/// One unit of chain data. Fields are read-only outside this crate; the only
/// ways to obtain a block are [`Block::new`], mining, or deserialization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    timestamp: u64,
    transactions: Vec<Transaction>,
    previous_hash: String,
    hash: String,
    nonce: u64,
}

impl Block {
    /// Unmined block at nonce 0 with its hash already computed.
    pub fn new(
        timestamp: u64,
        transactions: Vec<Transaction>,
        previous_hash: impl Into<String>,
    ) -> Self {
        let mut block = Self {
            timestamp,
            transactions,
            previous_hash: previous_hash.into(),
            hash: String::new(),
            nonce: 0,
        };
        block.hash = block.compute_hash();
        block
    }

    /// SHA-256 over timestamp, transaction JSON, previous hash and nonce, as hex.
    pub fn compute_hash(&self) -> String {
        self.hash_with_nonce(self.nonce)
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        Self::finish_hash(&self.hash_prefix(), nonce)
    }

    /// Hasher primed with everything but the nonce, so a nonce search only
    /// serializes the transactions once.
    pub(crate) fn hash_prefix(&self) -> Sha256 {
        let txs = serde_json::to_string(&self.transactions)
            .expect("transactions hold only strings and integers");
        let mut hasher = Sha256::new();
        hasher.update(self.timestamp.to_string());
        hasher.update(txs);
        hasher.update(&self.previous_hash);
        hasher
    }

    pub(crate) fn finish_hash(prefix: &Sha256, nonce: u64) -> String {
        let mut hasher = prefix.clone();
        hasher.update(nonce.to_string());
        hex::encode(hasher.finalize())
    }

    pub(crate) fn sealed(mut self, nonce: u64, hash: String) -> Self {
        self.nonce = nonce;
        self.hash = hash;
        self
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash == constants::GENESIS_PREVIOUS_HASH
    }

    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        pow::count_leading_zero_hex(&self.hash) >= difficulty
    }
}

pub mod pow {
    use super::Block;
    use crate::constants::{CANCEL_CHECK_INTERVAL, HASH_HEX_SIZE};
    use crate::{MineError, MiningControl};
    use tracing::info;

    /// Mine the block by incrementing the nonce until the hex hash starts with
    /// `difficulty` zeros.
    ///
    /// There is no iteration bound: expected work is 16^difficulty hashes and a
    /// difficulty above 64 never terminates. Use [`mine_with`] when the
    /// difficulty is not trusted or the caller needs to stop the search.
    pub fn mine(block: Block, difficulty: usize) -> Block {
        let mut block = block;
        let prefix = block.hash_prefix();
        while !block.meets_difficulty(difficulty) {
            block.nonce = block.nonce.wrapping_add(1);
            block.hash = Block::finish_hash(&prefix, block.nonce);
        }
        info!(nonce = block.nonce, hash = %block.hash, "mined block");
        block
    }

    /// Cancellable form of [`mine`]. The control is polled every
    /// `CANCEL_CHECK_INTERVAL` nonces.
    pub fn mine_with(
        block: Block,
        difficulty: usize,
        control: &MiningControl,
    ) -> Result<Block, MineError> {
        if difficulty > HASH_HEX_SIZE {
            return Err(MineError::DifficultyOutOfRange { difficulty });
        }
        control.check()?;
        let mut block = block;
        let prefix = block.hash_prefix();
        while !block.meets_difficulty(difficulty) {
            block.nonce = block
                .nonce
                .checked_add(1)
                .ok_or(MineError::NonceSpaceExhausted)?;
            block.hash = Block::finish_hash(&prefix, block.nonce);
            if block.nonce % CANCEL_CHECK_INTERVAL == 0 {
                control.check()?;
            }
        }
        info!(nonce = block.nonce, hash = %block.hash, "mined block");
        Ok(block)
    }

    pub fn count_leading_zero_hex(hash: &str) -> usize {
        hash.bytes().take_while(|b| *b == b'0').count()
    }
}

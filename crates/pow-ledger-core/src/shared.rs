//! Thread-safe ledger handle.
//!
//! Mining runs outside the lock: the pool is snapshotted and cleared in one
//! write-locked step, the nonce search runs unlocked, and the append happens
//! under a second write lock. Transactions submitted while a search is in
//! flight stay queued behind the miner's reward.

use crate::{
    chain::mine_block, Block, ChainFault, Ledger, MineError, MiningControl, Transaction,
    TransactionError,
};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Summary of a block appended by [`SharedLedger::mine_pending`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MinedBlock {
    pub height: usize,
    pub hash: String,
    pub previous_hash: String,
    pub nonce: u64,
    pub transactions: usize,
}

impl MinedBlock {
    fn new(height: usize, block: &Block) -> Self {
        Self {
            height,
            hash: block.hash().to_owned(),
            previous_hash: block.previous_hash().to_owned(),
            nonce: block.nonce(),
            transactions: block.transactions().len(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SharedLedger {
    inner: Arc<RwLock<Ledger>>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ledger)),
        }
    }

    // A panic while holding the lock cannot leave the ledger half-updated:
    // every mutation is a single push, take or swap.
    fn read(&self) -> RwLockReadGuard<'_, Ledger> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Ledger> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn submit(&self, transaction: Transaction) -> Result<(), TransactionError> {
        self.write().create_transaction(transaction)
    }

    /// Mine every transaction pending at call time on the calling thread.
    ///
    /// On cancel, timeout or a head that moved during the search, the
    /// snapshot goes back to the front of the pool.
    pub fn mine_pending(
        &self,
        miner_address: &str,
        control: &MiningControl,
    ) -> Result<MinedBlock, MineError> {
        let (template, config) = {
            let mut ledger = self.write();
            (ledger.next_block_template(), ledger.config().clone())
        };
        let snapshot = template.transactions().to_vec();
        debug!(transactions = snapshot.len(), "mining snapshot taken");

        let result = mine_block(template, &config, control).and_then(|mined| {
            let mut ledger = self.write();
            let height = ledger.len();
            let block = ledger.try_commit(mined, miner_address)?;
            Ok(MinedBlock::new(height, block))
        });

        if let Err(err) = &result {
            warn!(%err, "mining aborted, restoring pending transactions");
            self.write().restore_pending(snapshot);
        }
        result
    }

    /// Run [`SharedLedger::mine_pending`] on a dedicated thread.
    pub fn spawn_miner(
        &self,
        miner_address: impl Into<String>,
        control: MiningControl,
    ) -> JoinHandle<Result<MinedBlock, MineError>> {
        let ledger = self.clone();
        let miner_address = miner_address.into();
        thread::spawn(move || ledger.mine_pending(&miner_address, &control))
    }

    pub fn check_balance(&self, address: &str) -> i128 {
        self.read().check_balance(address)
    }

    pub fn projected_balance(&self, address: &str) -> i128 {
        self.read().projected_balance(address)
    }

    pub fn chain_validate(&self) -> bool {
        self.read().chain_validate()
    }

    pub fn verify_chain(&self) -> Result<(), ChainFault> {
        self.read().verify_chain()
    }

    pub fn height(&self) -> usize {
        self.read().len()
    }

    pub fn snapshot(&self) -> Vec<Block> {
        self.read().chain().to_vec()
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.read().pending_transactions().to_vec()
    }
}

impl From<Ledger> for SharedLedger {
    fn from(ledger: Ledger) -> Self {
        Self::new(ledger)
    }
}

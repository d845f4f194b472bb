//! Chain manager: owns the blocks and the pending pool.

use crate::{
    mine::mine_parallel, now_millis, pow, Block, ChainFault, ConfigError, LedgerConfig,
    LedgerError, MineError, MiningControl, Transaction, TransactionError,
};
use tracing::{debug, info, warn};

/// Genesis block: empty previous hash and one zero-value placeholder
/// transaction. Never mined.
pub fn genesis_block(timestamp: u64) -> Block {
    Block::new(
        timestamp,
        vec![Transaction::genesis_placeholder()],
        crate::constants::GENESIS_PREVIOUS_HASH,
    )
}

/// An ordered, never empty chain of blocks plus the pool of transactions
/// waiting for the next block.
#[derive(Clone, Debug)]
pub struct Ledger {
    chain: Vec<Block>,
    pending_transactions: Vec<Transaction>,
    config: LedgerConfig,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Ledger with the default difficulty (4) and mining reward (100).
    pub fn new() -> Self {
        Self::build(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: LedgerConfig) -> Self {
        Self {
            chain: vec![genesis_block(now_millis())],
            pending_transactions: Vec::new(),
            config,
        }
    }

    /// Adopt blocks from elsewhere, e.g. a JSON dump. Integrity is not checked
    /// here; call [`Ledger::verify_chain`] before trusting the result.
    pub fn from_blocks(config: LedgerConfig, blocks: Vec<Block>) -> Result<Self, LedgerError> {
        config.validate()?;
        let first = blocks.first().ok_or(LedgerError::EmptyChain)?;
        if !first.is_genesis() {
            return Err(LedgerError::NotGenesis {
                previous_hash: first.previous_hash().to_owned(),
            });
        }
        Ok(Self {
            chain: blocks,
            pending_transactions: Vec::new(),
            config,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn difficulty(&self) -> usize {
        self.config.difficulty
    }

    pub fn mining_reward(&self) -> u64 {
        self.config.mining_reward
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    pub fn recent_block(&self) -> &Block {
        self.chain
            .last()
            .expect("chain always holds the genesis block")
    }

    /// Queue a transaction for the next block. Malformed transactions are
    /// rejected; there is no balance or signature check.
    pub fn create_transaction(
        &mut self,
        transaction: Transaction,
    ) -> Result<(), TransactionError> {
        transaction.validate()?;
        debug!(
            to = transaction.to_address(),
            from = ?transaction.from_address(),
            amount = transaction.amount(),
            "queued transaction"
        );
        self.pending_transactions.push(transaction);
        Ok(())
    }

    /// Package the whole pool into a block, mine it, append it and leave the
    /// miner's reward as the only pending transaction.
    ///
    /// Blocks the calling thread until a nonce is found. Uses the rayon search
    /// when the config asks for it.
    pub fn mine_pending_transactions(&mut self, miner_address: &str) -> &Block {
        let template = self.next_block_template();
        let mined = mine_block(template, &self.config, &MiningControl::new())
            .expect("validated difficulty with no stop signal always yields a nonce");
        self.commit(mined, miner_address)
    }

    /// Like [`Ledger::mine_pending_transactions`], but stops when `control` is
    /// cancelled or expires. On error the chain and the pool are unchanged.
    pub fn mine_pending_transactions_with(
        &mut self,
        miner_address: &str,
        control: &MiningControl,
    ) -> Result<&Block, MineError> {
        let template = self.next_block_template();
        let snapshot = template.transactions().to_vec();
        match mine_block(template, &self.config, control) {
            Ok(mined) => Ok(self.commit(mined, miner_address)),
            Err(err) => {
                self.restore_pending(snapshot);
                Err(err)
            }
        }
    }

    /// Empties the pool into an unmined block on top of the current head.
    pub(crate) fn next_block_template(&mut self) -> Block {
        let transactions = std::mem::take(&mut self.pending_transactions);
        Block::new(now_millis(), transactions, self.recent_block().hash())
    }

    /// Puts transactions taken by [`Ledger::next_block_template`] back in front
    /// of anything queued since.
    pub(crate) fn restore_pending(&mut self, mut transactions: Vec<Transaction>) {
        transactions.append(&mut self.pending_transactions);
        self.pending_transactions = transactions;
    }

    /// Append a block mined on the current head. Fails with `StaleTip` when the
    /// head has moved since the template was taken.
    pub(crate) fn try_commit(
        &mut self,
        block: Block,
        miner_address: &str,
    ) -> Result<&Block, MineError> {
        let head = self.recent_block().hash();
        if block.previous_hash() != head {
            return Err(MineError::StaleTip {
                expected: block.previous_hash().to_owned(),
                found: head.to_owned(),
            });
        }
        Ok(self.commit(block, miner_address))
    }

    fn commit(&mut self, block: Block, miner_address: &str) -> &Block {
        info!(
            height = self.chain.len(),
            tries = block.nonce(),
            transactions = block.transactions().len(),
            hash = block.hash(),
            "block appended"
        );
        self.chain.push(block);
        let reward = Transaction::reward(miner_address, self.config.mining_reward);
        let late = std::mem::take(&mut self.pending_transactions);
        self.pending_transactions = vec![reward];
        self.pending_transactions.extend(late);
        self.recent_block()
    }

    /// Net confirmed value of `address`: credits minus debits over every block.
    pub fn check_balance(&self, address: &str) -> i128 {
        self.chain
            .iter()
            .flat_map(Block::transactions)
            .map(|tx| tx.balance_delta(address))
            .sum()
    }

    /// Confirmed balance plus the effect of the pending pool, including a
    /// reward that will only be confirmed by the next mined block.
    pub fn projected_balance(&self, address: &str) -> i128 {
        let pending: i128 = self
            .pending_transactions
            .iter()
            .map(|tx| tx.balance_delta(address))
            .sum();
        self.check_balance(address) + pending
    }

    /// Walks blocks 1.. and reports the first hash or link mismatch. The
    /// genesis block's own hash is not checked.
    pub fn verify_chain(&self) -> Result<(), ChainFault> {
        for (offset, pair) in self.chain.windows(2).enumerate() {
            let (previous, current) = (&pair[0], &pair[1]);
            let index = offset + 1;
            let computed = current.compute_hash();
            if current.hash() != computed {
                return Err(ChainFault::HashMismatch {
                    index,
                    stored: current.hash().to_owned(),
                    computed,
                });
            }
            if current.previous_hash() != previous.hash() {
                return Err(ChainFault::LinkMismatch {
                    index,
                    expected: previous.hash().to_owned(),
                    found: current.previous_hash().to_owned(),
                });
            }
        }
        Ok(())
    }

    pub fn chain_validate(&self) -> bool {
        match self.verify_chain() {
            Ok(()) => true,
            Err(fault) => {
                warn!(index = fault.index(), %fault, "chain validation failed");
                false
            }
        }
    }
}

pub(crate) fn mine_block(
    template: Block,
    config: &LedgerConfig,
    control: &MiningControl,
) -> Result<Block, MineError> {
    if config.parallel {
        mine_parallel(template, config.difficulty, control)
    } else {
        pow::mine_with(template, config.difficulty, control)
    }
}

use crate::{
    constants::{CANCEL_CHECK_INTERVAL, HASH_HEX_SIZE},
    pow::count_leading_zero_hex,
    Block, MineError, MiningControl,
};
use rayon::prelude::*;
use tracing::info;

/// Mines a block by searching nonces in parallel until the hex hash has at least
/// `difficulty` leading zeros.
///
/// Any qualifying nonce may win, not necessarily the smallest. Every worker
/// polls `control` every `CANCEL_CHECK_INTERVAL` nonces.
pub fn mine_parallel(
    block: Block,
    difficulty: usize,
    control: &MiningControl,
) -> Result<Block, MineError> {
    if difficulty > HASH_HEX_SIZE {
        return Err(MineError::DifficultyOutOfRange { difficulty });
    }
    control.check()?;
    if block.meets_difficulty(difficulty) {
        return Ok(block);
    }

    // Everything but the nonce is fixed, so hash it once and clone per attempt.
    let prefix = block.hash_prefix();
    let start = block
        .nonce()
        .checked_add(1)
        .ok_or(MineError::NonceSpaceExhausted)?;

    let found = (start..=u64::MAX).into_par_iter().find_map_any(|nonce| {
        if nonce % CANCEL_CHECK_INTERVAL == 0 {
            if let Err(err) = control.check() {
                return Some(Err(err));
            }
        }
        let hash = Block::finish_hash(&prefix, nonce);
        (count_leading_zero_hex(&hash) >= difficulty).then_some(Ok((nonce, hash)))
    });

    match found {
        Some(Ok((nonce, hash))) => {
            info!(nonce, hash = %hash, "mined block in parallel");
            Ok(block.sealed(nonce, hash))
        }
        Some(Err(err)) => Err(err),
        None => Err(MineError::NonceSpaceExhausted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transaction;
    use std::time::Duration;

    fn template() -> Block {
        let txs = vec![Transaction::transfer("Alice", "Bob", 10).unwrap()];
        Block::new(1_600_000_000_000, txs, "abc")
    }

    #[test]
    fn parallel_mining_meets_difficulty() {
        for difficulty in 0..=4 {
            let mined = mine_parallel(template(), difficulty, &MiningControl::new()).unwrap();
            assert!(mined.meets_difficulty(difficulty));
            assert_eq!(mined.hash(), mined.compute_hash());
            assert_eq!(mined.previous_hash(), "abc");
        }
    }

    #[test]
    fn parallel_mining_zero_difficulty_is_a_no_op() {
        let block = template();
        let mined = mine_parallel(block.clone(), 0, &MiningControl::new()).unwrap();
        assert_eq!(mined, block);
    }

    #[test]
    fn parallel_mining_honours_cancel() {
        let control = MiningControl::new();
        control.cancel();
        assert_eq!(
            mine_parallel(template(), 64, &control).unwrap_err(),
            MineError::Cancelled
        );
    }

    #[test]
    fn parallel_mining_honours_deadline() {
        let control = MiningControl::with_timeout(Duration::from_millis(50));
        assert_eq!(
            mine_parallel(template(), 64, &control).unwrap_err(),
            MineError::TimedOut
        );
    }

    #[test]
    fn parallel_mining_rejects_unreachable_difficulty() {
        assert_eq!(
            mine_parallel(template(), 65, &MiningControl::new()).unwrap_err(),
            MineError::DifficultyOutOfRange { difficulty: 65 }
        );
    }
}

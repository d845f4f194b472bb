use pow_ledger_core::{
    Block, ChainFault, Ledger, LedgerConfig, MineError, MiningControl, SharedLedger, Transaction,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::Duration;

fn fast_config() -> LedgerConfig {
    LedgerConfig::default().with_difficulty(1)
}

fn random_transfers(rng: &mut StdRng, count: usize) -> Vec<Transaction> {
    (0..count)
        .map(|_| {
            let from = format!("user-{}", rng.gen_range(0..5));
            let to = format!("user-{}", rng.gen_range(0..5));
            Transaction::transfer(from, to, rng.gen_range(1..50)).expect("valid transfer")
        })
        .collect()
}

#[test]
fn demonstration_scenario() -> anyhow::Result<()> {
    let mut ledger = Ledger::with_config(fast_config())?;
    ledger.create_transaction(Transaction::transfer("address2", "address1", 20)?)?;
    ledger.create_transaction(Transaction::transfer("address1", "address2", 20)?)?;

    ledger.mine_pending_transactions("jhon-andrew");
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger.check_balance("address1"), 0);
    assert_eq!(ledger.check_balance("address2"), 0);
    assert_eq!(ledger.projected_balance("jhon-andrew"), 100);

    ledger.mine_pending_transactions("jhon-andrew");
    assert_eq!(ledger.len(), 3);
    assert_eq!(ledger.check_balance("jhon-andrew"), 100);
    assert_eq!(ledger.projected_balance("jhon-andrew"), 200);
    assert!(ledger.chain_validate());
    Ok(())
}

#[test]
fn random_workload_conserves_value() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut ledger = Ledger::with_config(fast_config().with_mining_reward(10))?;
    let rounds = 5;
    for _ in 0..rounds {
        for tx in random_transfers(&mut rng, 8) {
            ledger.create_transaction(tx)?;
        }
        ledger.mine_pending_transactions("miner");
    }
    assert_eq!(ledger.len(), rounds + 1);
    assert!(ledger.chain_validate());

    // transfers net to zero; only confirmed rewards create value
    let users: i128 = (0..5)
        .map(|i| ledger.check_balance(&format!("user-{i}")))
        .sum();
    assert_eq!(users, 0);
    assert_eq!(ledger.check_balance("miner"), 10 * (rounds as i128 - 1));
    Ok(())
}

#[test]
fn imported_chain_faults_are_localized() -> anyhow::Result<()> {
    let mut ledger = Ledger::with_config(fast_config())?;
    for round in 1..=3u64 {
        ledger.create_transaction(Transaction::transfer("A", "B", round)?)?;
        ledger.mine_pending_transactions("M");
    }
    let mut value = serde_json::to_value(ledger.chain())?;

    value[2]["previousHash"] = serde_json::json!("ffff");
    let blocks: Vec<Block> = serde_json::from_value(value.clone())?;
    let imported = Ledger::from_blocks(fast_config(), blocks)?;
    // the stored hash no longer covers the edited link
    assert!(matches!(
        imported.verify_chain(),
        Err(ChainFault::HashMismatch { index: 2, .. })
    ));

    value[2]["hash"] = serde_json::json!(imported.chain()[2].compute_hash());
    let blocks: Vec<Block> = serde_json::from_value(value)?;
    let imported = Ledger::from_blocks(fast_config(), blocks)?;
    assert!(matches!(
        imported.verify_chain(),
        Err(ChainFault::LinkMismatch { index: 2, .. })
    ));
    assert!(!imported.chain_validate());
    Ok(())
}

#[test]
fn invalid_transactions_are_rejected_at_the_boundary() -> anyhow::Result<()> {
    let mut ledger = Ledger::with_config(fast_config())?;
    let bad: Vec<Transaction> = serde_json::from_str(r#"[{"toAddress":"","amount":5}]"#)?;
    for tx in bad {
        assert!(ledger.create_transaction(tx).is_err());
    }
    assert!(ledger.pending_transactions().is_empty());
    assert!(Transaction::minted(" ", 5).is_err());
    let negative = r#"[{"toAddress":"B","amount":-5}]"#;
    assert!(serde_json::from_str::<Vec<Transaction>>(negative).is_err());
    Ok(())
}

#[tokio::test]
async fn concurrent_submitters_and_miner() -> anyhow::Result<()> {
    let ledger = SharedLedger::new(Ledger::with_config(fast_config())?);
    let submitters = 8;
    let per_submitter = 25u64;

    let mut handles = Vec::new();
    for i in 0..submitters {
        let ledger = ledger.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            for n in 0..per_submitter {
                let tx = Transaction::transfer(format!("src-{i}"), "sink", n + 1)
                    .expect("valid transfer");
                ledger.submit(tx).expect("valid transfer");
            }
        }));
    }
    let miner = {
        let ledger = ledger.clone();
        tokio::task::spawn_blocking(move || {
            (0..4)
                .map(|_| ledger.mine_pending("M", &MiningControl::new()))
                .collect::<Result<Vec<_>, MineError>>()
        })
    };
    for handle in handles {
        handle.await?;
    }
    let mined = miner.await??;
    assert_eq!(mined.len(), 4);

    // flush whatever arrived after the last round
    ledger.mine_pending("M", &MiningControl::new())?;

    let expected: i128 = (1..=per_submitter as i128).sum::<i128>() * submitters as i128;
    assert_eq!(ledger.check_balance("sink"), expected);
    assert_eq!(ledger.height(), 6);
    assert!(ledger.chain_validate());
    Ok(())
}

#[tokio::test]
async fn miner_offloaded_with_timeout() -> anyhow::Result<()> {
    let ledger = SharedLedger::new(Ledger::with_config(
        LedgerConfig::default().with_difficulty(64),
    )?);
    ledger.submit(Transaction::transfer("A", "B", 1)?)?;
    let control = MiningControl::with_timeout(Duration::from_millis(100));
    let worker = {
        let ledger = ledger.clone();
        tokio::task::spawn_blocking(move || ledger.mine_pending("M", &control))
    };
    assert_eq!(worker.await?, Err(MineError::TimedOut));
    assert_eq!(ledger.height(), 1);
    assert_eq!(ledger.pending().len(), 1);
    Ok(())
}

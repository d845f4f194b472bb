use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pow_ledger_core::{Ledger, LedgerConfig, MiningControl, SharedLedger, Transaction};
use serde::Serialize;
use std::{path::PathBuf, str::FromStr, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pow-ledger")]
#[command(about = "Drive an in-memory proof-of-work ledger")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args, Debug)]
struct LedgerArgs {
    /// TOML file with `difficulty`, `mining_reward` and `parallel`
    #[arg(long)]
    config: Option<PathBuf>,
    /// Leading zero hex digits required in a mined hash
    #[arg(long)]
    difficulty: Option<usize>,
    /// Amount minted to the miner per block
    #[arg(long)]
    reward: Option<u64>,
    /// Search nonces on all cores
    #[arg(long)]
    parallel: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Two opposite transfers, two mining rounds, balances and validity
    Demo {
        #[command(flatten)]
        ledger: LedgerArgs,
        /// Address credited with mining rewards
        #[arg(long, default_value = "jhon-andrew")]
        miner: String,
    },
    /// Submit transfers and mine blocks; Ctrl-C cancels the running search
    Mine {
        #[command(flatten)]
        ledger: LedgerArgs,
        /// Address credited with mining rewards
        #[arg(long, default_value = "miner")]
        miner: String,
        /// Number of blocks to mine
        #[arg(long, default_value_t = 1)]
        blocks: usize,
        /// Transfer as FROM:TO:AMOUNT, repeatable
        #[arg(long = "tx")]
        txs: Vec<Transfer>,
        /// Give up on a block after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Print the chain as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Debug)]
struct Transfer {
    from: String,
    to: String,
    amount: u64,
}

impl FromStr for Transfer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [from, to, amount] = parts.as_slice() else {
            return Err(format!("expected FROM:TO:AMOUNT, got {s:?}"));
        };
        let amount = amount
            .parse()
            .map_err(|e| format!("bad amount {amount:?}: {e}"))?;
        Ok(Self {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        })
    }
}

#[derive(Serialize)]
struct Report<'a> {
    height: usize,
    valid: bool,
    chain: &'a [pow_ledger_core::Block],
}

fn load_config(args: &LedgerArgs) -> Result<LedgerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            LedgerConfig::from_toml_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => LedgerConfig::default(),
    };
    if let Some(difficulty) = args.difficulty {
        config.difficulty = difficulty;
    }
    if let Some(reward) = args.reward {
        config.mining_reward = reward;
    }
    if args.parallel {
        config.parallel = true;
    }
    config.validate()?;
    Ok(config)
}

fn run_demo(config: LedgerConfig, miner: &str) -> Result<()> {
    let mut ledger = Ledger::with_config(config)?;
    ledger.create_transaction(Transaction::transfer("address2", "address1", 20)?)?;
    ledger.create_transaction(Transaction::transfer("address1", "address2", 20)?)?;

    info!("starting miner");
    let block = ledger.mine_pending_transactions(miner);
    println!("mined block {} after {} tries", block.hash(), block.nonce());
    println!("balance of {miner}: {}", ledger.check_balance(miner));

    info!("restarting miner");
    let block = ledger.mine_pending_transactions(miner);
    println!("mined block {} after {} tries", block.hash(), block.nonce());
    println!("balance of {miner}: {}", ledger.check_balance(miner));

    println!("chain valid: {}", ledger.chain_validate());
    Ok(())
}

/// Each round gets its own deadline but shares the interrupt flag.
fn round_control(interrupt: &MiningControl, timeout: Option<Duration>) -> MiningControl {
    match timeout {
        Some(timeout) => interrupt.expiring_in(timeout),
        None => interrupt.clone(),
    }
}

async fn run_mine(
    config: LedgerConfig,
    miner: String,
    blocks: usize,
    txs: Vec<Transfer>,
    timeout: Option<Duration>,
    json: bool,
) -> Result<()> {
    let ledger = SharedLedger::new(Ledger::with_config(config)?);
    for Transfer { from, to, amount } in txs {
        ledger.submit(Transaction::transfer(from, to, amount)?)?;
    }

    let interrupt = MiningControl::new();
    let listener = tokio::spawn({
        let interrupt = interrupt.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling search");
                interrupt.cancel();
            }
        }
    });

    for round in 1..=blocks {
        let control = round_control(&interrupt, timeout);
        let worker = {
            let ledger = ledger.clone();
            let miner = miner.clone();
            tokio::task::spawn_blocking(move || ledger.mine_pending(&miner, &control))
        };
        let outcome = worker.await.context("mining worker panicked")?;
        let mined = outcome.with_context(|| format!("mining block {round} of {blocks}"))?;
        info!(height = mined.height, nonce = mined.nonce, "mined {}", mined.hash);
    }

    let chain = ledger.snapshot();
    let valid = ledger.chain_validate();
    if json {
        let report = Report {
            height: chain.len(),
            valid,
            chain: &chain,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (height, block) in chain.iter().enumerate() {
            println!(
                "#{height} {} nonce={} txs={}",
                block.hash(),
                block.nonce(),
                block.transactions().len()
            );
        }
        println!("balance of {miner}: {}", ledger.check_balance(&miner));
        println!("chain valid: {valid}");
    }
    listener.abort();
    if interrupt.is_cancelled() {
        bail!("interrupted");
    }
    if !valid {
        bail!("chain failed validation");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Demo { ledger, miner } => {
            let config = load_config(&ledger)?;
            tokio::task::spawn_blocking(move || run_demo(config, &miner))
                .await
                .context("demo worker panicked")??;
        }
        Command::Mine {
            ledger,
            miner,
            blocks,
            txs,
            timeout_secs,
            json,
        } => {
            let config = load_config(&ledger)?;
            run_mine(
                config,
                miner,
                blocks,
                txs,
                timeout_secs.map(Duration::from_secs),
                json,
            )
            .await?;
        }
    }
    Ok(())
}

//! Keel daemon: runs the operation scheduler against an in-process registry.
//!
//! Candidates arrive as JSON lines on stdin and are executed through a local
//! substrate (token book, staking ledger, treasury guard, operation registry).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use keel_governance::{CallError, ExternalCollaborator, OperationKind, OperationRegistry, Substrate};
use keel_scheduler::{
    Candidate, ChannelSource, FixedGasOracle, GasOracle, OperationScheduler, RegistryDispatcher,
    RpcGasOracle, SchedulerConfig, ShutdownController, GWEI,
};
use keel_stake::StakeLedger;
use keel_treasury::TreasuryGuard;
use keel_types::amount::TOKEN_UNIT;
use keel_types::{Address, Amount, SystemClock, Timestamp, TokenBook};
use keel_utils::{init_logging, LogFormat};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Candidates buffered between the stdin reader and the monitoring loop.
const INTAKE_CAPACITY: usize = 1024;

/// Gas price reported when no RPC endpoint is configured.
const DEV_GAS_PRICE_GWEI: u128 = 1;

#[derive(Parser)]
#[command(name = "keel-daemon", about = "Keel operation scheduler daemon")]
struct Cli {
    /// Multisig that proposes and controls emergency pause.
    #[arg(long, env = "SAFE_ADDRESS")]
    safe_address: Option<Address>,

    /// Operation registry address.
    #[arg(long, env = "SAFE_MANAGER_ADDRESS")]
    safe_manager_address: Option<Address>,

    /// Execution loop period in milliseconds.
    #[arg(long, env = "EXECUTION_INTERVAL")]
    execution_interval: Option<u64>,

    /// Operations taken per execution tick.
    #[arg(long, env = "MAX_BATCH_SIZE")]
    max_batch_size: Option<usize>,

    /// Monitoring loop period in milliseconds.
    #[arg(long, env = "MONITOR_INTERVAL")]
    monitor_interval: Option<u64>,

    /// Status log period in milliseconds.
    #[arg(long, env = "STATUS_INTERVAL")]
    status_interval: Option<u64>,

    /// Base retry backoff in milliseconds.
    #[arg(long, env = "RETRY_BACKOFF")]
    retry_backoff: Option<u64>,

    /// JSON-RPC endpoint queried for `eth_gasPrice`.
    #[arg(long, env = "GAS_RPC_URL")]
    gas_rpc_url: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "KEEL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "KEEL_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Tokens minted to the registry in the local substrate.
    #[arg(long, default_value_t = 1_000_000, env = "KEEL_DEV_FUNDS")]
    dev_funds: u128,

    /// APY of the local staking ledger, in basis points.
    #[arg(long, default_value_t = 1_000, env = "KEEL_DEV_APY_BPS")]
    dev_apy_bps: u32,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the scheduler until SIGINT/SIGTERM.
    Run,
    /// Print the effective configuration as TOML and exit.
    PrintConfig,
}

impl Cli {
    /// Layer CLI/env values over the file config (or defaults).
    fn scheduler_config(&self) -> anyhow::Result<SchedulerConfig> {
        let mut config = match &self.config {
            Some(path) => SchedulerConfig::from_toml_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => SchedulerConfig::default(),
        };
        if let Some(safe) = self.safe_address {
            config.safe_address = Some(safe);
        }
        if let Some(manager) = self.safe_manager_address {
            config.safe_manager_address = Some(manager);
        }
        if let Some(ms) = self.execution_interval {
            config.execution_interval_ms = ms;
        }
        if let Some(size) = self.max_batch_size {
            config.max_batch_size = size;
        }
        if let Some(ms) = self.monitor_interval {
            config.monitor_interval_ms = ms;
        }
        if let Some(ms) = self.status_interval {
            config.status_interval_ms = ms;
        }
        if let Some(ms) = self.retry_backoff {
            config.retry_backoff_ms = ms;
        }
        if let Some(url) = &self.gas_rpc_url {
            config.gas_rpc_url = Some(url.clone());
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        Ok(config)
    }
}

/// Stands in for the mesh and reward contracts: logs each call and returns
/// no data.
struct LoggingCollaborator;

impl ExternalCollaborator for LoggingCollaborator {
    fn call(
        &mut self,
        caller: &Address,
        target: &Address,
        kind: &OperationKind,
        now: Timestamp,
    ) -> Result<Vec<u8>, CallError> {
        tracing::info!(
            %caller,
            %target,
            op_type = %kind.op_type(),
            at = %now,
            "external call: {}",
            kind.describe()
        );
        Ok(Vec::new())
    }
}

/// Addresses for the local ledger, treasury and treasury owner, derived from
/// the registry so they never collide with it.
fn local_address(registry: &Address, tag: u8) -> Address {
    let mut bytes = *registry.as_bytes();
    bytes[0] ^= tag;
    bytes[19] ^= tag;
    Address::new(bytes)
}

fn local_substrate(
    safe: Address,
    registry: Address,
    funds: u128,
    apy_bps: u32,
) -> anyhow::Result<Substrate> {
    let ledger = local_address(&registry, 0x5e);
    let treasury = local_address(&registry, 0x7e);
    let foundation = local_address(&registry, 0xfd);

    let funding = funds
        .checked_mul(TOKEN_UNIT)
        .map(Amount::new)
        .with_context(|| format!("--dev-funds {funds} overflows the token unit"))?;
    let mut tokens = TokenBook::new();
    tokens
        .mint(&registry, funding)
        .context("funding the registry")?;
    tracing::info!(%registry, %ledger, %treasury, funds, "local substrate ready");

    Ok(Substrate::new(
        tokens,
        StakeLedger::new(ledger, foundation, safe, apy_bps),
        TreasuryGuard::new(treasury, safe, safe),
        OperationRegistry::new(registry, safe),
        Box::new(LoggingCollaborator),
    ))
}

/// Forward JSON-line candidates from stdin until EOF.
async fn read_candidates(tx: mpsc::Sender<Candidate>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed, intake stopped");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Candidate>(line) {
            Ok(candidate) => {
                if tx.send(candidate).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "ignoring unparseable candidate line"),
        }
    }
    tracing::info!("candidate intake closed");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.scheduler_config()?;

    if let Command::PrintConfig = cli.command {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    init_logging(config.log_format, &config.log_level)
        .map_err(|e| anyhow::anyhow!("initialising logging: {e}"))?;

    let addresses = config.validate().context("invalid scheduler configuration")?;
    let clock = Arc::new(SystemClock);
    let substrate = local_substrate(
        addresses.safe,
        addresses.safe_manager,
        cli.dev_funds,
        cli.dev_apy_bps,
    )?;
    let dispatcher = Arc::new(RegistryDispatcher::new(
        Arc::new(tokio::sync::Mutex::new(substrate)),
        addresses.safe,
        clock.clone(),
    ));

    let oracle: Arc<dyn GasOracle> = match &config.gas_rpc_url {
        Some(url) => {
            tracing::info!(url = %url, "querying gas price over JSON-RPC");
            Arc::new(RpcGasOracle::new(url.clone()))
        }
        None => {
            tracing::info!(gwei = DEV_GAS_PRICE_GWEI, "no gas RPC configured, using a fixed price");
            Arc::new(FixedGasOracle::new(DEV_GAS_PRICE_GWEI * GWEI))
        }
    };

    let (tx, source) = ChannelSource::new(INTAKE_CAPACITY);
    let intake = tokio::spawn(read_candidates(tx));

    let mut scheduler =
        OperationScheduler::new(config, Arc::new(source), oracle, dispatcher, clock)?;
    scheduler.start()?;

    let shutdown = ShutdownController::new();
    shutdown.wait_for_signal().await;

    intake.abort();
    scheduler.stop().await?;
    let status = scheduler.status().await;
    tracing::info!(
        queue_length = status.queue_length,
        history_size = status.history_size,
        "keel daemon exited cleanly"
    );
    Ok(())
}

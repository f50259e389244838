//! Demo driver: runs the keyless backup flows end-to-end against the
//! in-memory simulated collaborators.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recovery_engine::collab::simulated::{
    FixedBalanceChain, MemoryBackupStore, MemoryWallet, SealedBackupCodec, ShareMixCombiner,
};
use recovery_engine::{
    FlowKind, Keyshare, Origin, RecoveryOrchestrator, RecoveryState, RecoveryTrigger, UserChoice,
    init_logging,
};

const DEMO_MNEMONIC: &str =
    "test test test test test test test test test test test junk";
const DEMO_WALLET_ADDRESS: &str = "0x000000000000000000000000000000000000d001";
const DEMO_AUTH_TOKEN: &str = "demo-identity-proof";
const DEMO_IDENTITY_SHARE: &str =
    "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const DEMO_PHONE_SHARE: &str =
    "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

#[derive(Parser)]
#[command(name = "recovery", version, about = "Keyless account-recovery demo")]
struct Cli {
    /// Identity keyshare as hex
    #[arg(long, default_value = DEMO_IDENTITY_SHARE)]
    identity_share: String,

    /// Phone keyshare as hex
    #[arg(long, default_value = DEMO_PHONE_SHARE)]
    phone_share: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt the demo wallet's mnemonic and upload it as a backup record
    Setup,
    /// Set up a backup, then restore it into a fresh wallet
    Restore {
        /// Report a funded recovered account instead of a zero balance
        #[arg(long)]
        funded: bool,
        /// Bail at the zero-balance confirmation instead of continuing
        #[arg(long)]
        bail: bool,
    },
    /// Set up a backup, then delete the record again
    Delete,
}

struct Demo {
    orchestrator: Arc<RecoveryOrchestrator>,
    identity: Keyshare,
    phone: Keyshare,
}

impl Demo {
    fn build(cli: &Cli, wallet: MemoryWallet, balance: u128) -> Result<Self> {
        let identity =
            Keyshare::from_hex(&cli.identity_share).context("invalid identity share hex")?;
        let phone = Keyshare::from_hex(&cli.phone_share).context("invalid phone share hex")?;

        let orchestrator = Arc::new(
            RecoveryOrchestrator::new(
                Arc::new(ShareMixCombiner::new()),
                Arc::new(SealedBackupCodec::new()),
                Arc::new(MemoryBackupStore::new()),
                Arc::new(FixedBalanceChain::new(balance)),
                Arc::new(wallet),
            )
            .with_wait_params(Duration::from_secs(5), Duration::from_millis(100)),
        );

        Ok(Self { orchestrator, identity, phone })
    }

    /// Drive one flow to its terminal state, answering the zero-balance
    /// checkpoint with `choice` if the flow stops there.
    async fn run_flow(&self, flow: FlowKind, choice: UserChoice) -> Result<()> {
        self.orchestrator.identity_share_issued(self.identity.clone());

        let mut attempt = {
            let orchestrator = Arc::clone(&self.orchestrator);
            let trigger = RecoveryTrigger {
                flow,
                origin: Origin::Settings,
                phone_share: self.phone.clone(),
                auth_token: DEMO_AUTH_TOKEN.to_string(),
            };
            tokio::spawn(async move { orchestrator.handle_phone_share_issued(trigger).await })
        };

        let outcome = loop {
            tokio::select! {
                joined = &mut attempt => break joined?.map_err(anyhow::Error::from)?,
                _ = tokio::time::sleep(Duration::from_millis(20)) => {
                    if self.orchestrator.state() == RecoveryState::AwaitingUserChoice {
                        match choice {
                            UserChoice::Continue => self.orchestrator.accept_zero_balance(),
                            UserChoice::Bail => self.orchestrator.bail(),
                        }
                    }
                }
            }
        };

        let outcome = outcome.context("trigger was dropped")?;
        println!("{}", serde_json::to_string(&outcome)?);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let demo_wallet = || MemoryWallet::with_wallet(DEMO_WALLET_ADDRESS, DEMO_MNEMONIC);

    match cli.command {
        Commands::Setup => {
            let demo = Demo::build(&cli, demo_wallet(), 0)?;
            demo.run_flow(FlowKind::Setup, UserChoice::Continue).await?;
        }
        Commands::Restore { funded, bail } => {
            let balance = if funded { 1_000 } else { 0 };
            let demo = Demo::build(&cli, demo_wallet(), balance)?;
            demo.run_flow(FlowKind::Setup, UserChoice::Continue).await?;

            let choice = if bail { UserChoice::Bail } else { UserChoice::Continue };
            demo.run_flow(FlowKind::Restore, choice).await?;
        }
        Commands::Delete => {
            let demo = Demo::build(&cli, demo_wallet(), 0)?;
            demo.run_flow(FlowKind::Setup, UserChoice::Continue).await?;
            demo.orchestrator.delete_backup().await?;
            println!("backup record deleted");
        }
    }

    Ok(())
}

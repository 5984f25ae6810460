use crate::commands::{self, chains, deposit, interop, withdraw};
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use zks_bridge::config::Config;
use zks_bridge::types::{parse_address, parse_b256, parse_u256};

#[derive(Parser, Debug)]
#[command(
    name = "zks-bridge",
    version,
    about = "Deposits, withdrawals and interop bundles for zkSync chains"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub async fn run(self, config: Config) -> Result<()> {
        let session = commands::Session::new(config, self.json)?;
        match self.command {
            Command::Chains(cmd) => match cmd.command {
                ChainsSubcommand::List => chains::run_list(&session),
            },
            Command::Deposit(cmd) => match cmd.command {
                DepositSubcommand::Quote(args) => deposit::run_quote(args, &session).await,
                DepositSubcommand::Send(args) => deposit::run_send(args, &session).await,
                DepositSubcommand::Status(args) => deposit::run_status(args, &session).await,
                DepositSubcommand::Wait(args) => deposit::run_wait(args, &session).await,
            },
            Command::Withdraw(cmd) => match cmd.command {
                WithdrawSubcommand::Quote(args) => withdraw::run_quote(args, &session).await,
                WithdrawSubcommand::Send(args) => withdraw::run_send(args, &session).await,
                WithdrawSubcommand::Status(args) => withdraw::run_status(args, &session).await,
                WithdrawSubcommand::Finalize(args) => withdraw::run_finalize(args, &session).await,
            },
            Command::Interop(cmd) => match cmd.command {
                InteropSubcommand::Quote(args) => interop::run_quote(args, &session).await,
                InteropSubcommand::Send(args) => interop::run_send(args, &session).await,
                InteropSubcommand::Status(args) => interop::run_status(args, &session).await,
                InteropSubcommand::Relay(args) => interop::run_relay(args, &session).await,
            },
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Known chains and their contract addresses.
    Chains(ChainsCommand),
    /// Settlement layer -> rollup deposits.
    Deposit(DepositCommand),
    /// Rollup -> settlement layer withdrawals.
    Withdraw(WithdrawCommand),
    /// Rollup -> rollup bundles.
    Interop(InteropCommand),
}

#[derive(Parser, Debug)]
pub struct ChainsCommand {
    #[command(subcommand)]
    pub command: ChainsSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ChainsSubcommand {
    List,
}

#[derive(Parser, Debug)]
pub struct DepositCommand {
    #[command(subcommand)]
    pub command: DepositSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum DepositSubcommand {
    Quote(DepositArgs),
    Send(DepositSendArgs),
    Status(TrackArgs),
    Wait(DepositWaitArgs),
}

#[derive(Parser, Debug)]
pub struct WithdrawCommand {
    #[command(subcommand)]
    pub command: WithdrawSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum WithdrawSubcommand {
    Quote(TransferArgs),
    Send(WithdrawSendArgs),
    Status(TrackArgs),
    Finalize(FinalizeArgs),
}

#[derive(Parser, Debug)]
pub struct InteropCommand {
    #[command(subcommand)]
    pub command: InteropSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum InteropSubcommand {
    Quote(BundleArgs),
    Send(InteropSendArgs),
    Status(InteropTrackArgs),
    Relay(RelayArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SignerArgs {
    #[arg(long)]
    pub private_key: Option<String>,

    #[arg(long)]
    pub private_key_env: Option<String>,

    /// Plan only; print the sender address the plan was built for.
    #[arg(long, value_parser = parse_address)]
    pub from: Option<Address>,
}

#[derive(Args, Debug, Clone)]
pub struct WaitArgs {
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    #[arg(long)]
    pub poll_ms: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct TransferArgs {
    /// Rollup key or chain id.
    #[arg(long)]
    pub chain: String,

    /// Token address; any ETH alias selects the ETH route.
    #[arg(
        long,
        value_parser = parse_address,
        default_value = "0x0000000000000000000000000000000000000000"
    )]
    pub token: Address,

    #[arg(long, value_parser = parse_u256)]
    pub amount: U256,

    #[arg(long, value_parser = parse_address)]
    pub to: Option<Address>,

    #[command(flatten)]
    pub signer: SignerArgs,
}

#[derive(Args, Debug, Clone)]
pub struct DepositArgs {
    #[command(flatten)]
    pub transfer: TransferArgs,

    #[arg(long, value_parser = parse_u256)]
    pub operator_tip: Option<U256>,

    #[arg(long, value_parser = parse_u256)]
    pub l2_gas_limit: Option<U256>,

    #[arg(long, value_parser = parse_address)]
    pub refund_recipient: Option<Address>,
}

#[derive(Args, Debug)]
pub struct DepositSendArgs {
    #[command(flatten)]
    pub deposit: DepositArgs,

    /// Wait for the rollup execution after sending.
    #[arg(long)]
    pub wait: bool,

    #[command(flatten)]
    pub wait_args: WaitArgs,
}

#[derive(Args, Debug)]
pub struct WithdrawSendArgs {
    #[command(flatten)]
    pub transfer: TransferArgs,

    #[command(flatten)]
    pub wait_args: WaitArgs,
}

#[derive(Args, Debug)]
pub struct TrackArgs {
    #[arg(long)]
    pub chain: String,

    /// Hash of the originating transaction.
    #[arg(long, value_parser = parse_b256)]
    pub tx: B256,
}

#[derive(Args, Debug)]
pub struct DepositWaitArgs {
    #[command(flatten)]
    pub track: TrackArgs,

    /// `l1` or `l2`.
    #[arg(long, default_value = "l2")]
    pub until: String,

    #[command(flatten)]
    pub wait_args: WaitArgs,
}

#[derive(Args, Debug)]
pub struct FinalizeArgs {
    #[command(flatten)]
    pub track: TrackArgs,

    /// Wait for the proof before finalizing.
    #[arg(long)]
    pub wait: bool,

    #[command(flatten)]
    pub signer: SignerArgs,

    #[command(flatten)]
    pub wait_args: WaitArgs,
}

#[derive(Args, Debug, Clone)]
pub struct BundleArgs {
    /// Source rollup.
    #[arg(long = "src")]
    pub source: String,

    /// Destination rollup.
    #[arg(long = "dst")]
    pub destination: String,

    /// Inline JSON array of items or a path to a file holding one.
    #[arg(long)]
    pub items: String,

    #[arg(long, value_parser = parse_address)]
    pub execution_address: Option<Address>,

    #[arg(long, value_parser = parse_address)]
    pub unbundler: Option<Address>,

    /// `sum-always` or `same-native-asset-only`; the config value otherwise.
    #[arg(long)]
    pub value_policy: Option<String>,

    #[command(flatten)]
    pub signer: SignerArgs,
}

#[derive(Args, Debug)]
pub struct InteropSendArgs {
    #[command(flatten)]
    pub bundle: BundleArgs,

    #[command(flatten)]
    pub wait_args: WaitArgs,
}

#[derive(Args, Debug)]
pub struct InteropTrackArgs {
    #[arg(long = "src")]
    pub source: String,

    #[arg(long = "dst")]
    pub destination: String,

    /// Source transaction that sent the bundle.
    #[arg(long, value_parser = parse_b256)]
    pub tx: B256,

    /// Also read per-call statuses for this many calls.
    #[arg(long)]
    pub calls: Option<usize>,

    /// Block until `sent`, `verified` or `executed`.
    #[arg(long)]
    pub until: Option<String>,

    #[command(flatten)]
    pub wait_args: WaitArgs,
}

#[derive(Args, Debug)]
pub struct RelayArgs {
    #[arg(long = "src")]
    pub source: String,

    #[arg(long = "dst")]
    pub destination: String,

    #[arg(long, value_parser = parse_b256)]
    pub tx: B256,

    /// `verify` or `execute`.
    #[arg(long, default_value = "execute")]
    pub mode: String,

    /// Build and print the handler call without sending it.
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub signer: SignerArgs,

    #[command(flatten)]
    pub wait_args: WaitArgs,
}

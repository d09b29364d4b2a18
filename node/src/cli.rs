//! # CLI Interface
//!
//! Defines the command-line argument structure for `crowdx-node` using
//! `clap` derive. Every contract call has a subcommand that runs against the
//! local data directory; `serve` exposes the same calls over HTTP.
//!
//! Account arguments accept either a `0x`-prefixed hex address or a plain
//! label such as `alice`, which maps to a deterministic development address.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crowdx_protocol::config::{DEFAULT_API_PORT, DEFAULT_DATA_DIR, DEFAULT_METRICS_PORT};

/// CrowdX campaign host.
///
/// Runs goal-based crowdfunding campaigns with escrowed contributions: the
/// owner is paid if the goal is met by the deadline, contributors are
/// refunded otherwise.
#[derive(Parser, Debug)]
#[command(
    name = "crowdx-node",
    about = "CrowdX crowdfunding campaign host",
    version,
    propagate_version = true
)]
pub struct CrowdxCli {
    /// Directory holding the campaign database.
    #[arg(long, short = 'd', env = "CROWDX_DATA_DIR", default_value = DEFAULT_DATA_DIR, global = true)]
    pub data_dir: PathBuf,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "CROWDX_LOG_FORMAT", default_value = "pretty", global = true)]
    pub log_format: String,

    /// Print command results as JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory and an empty database.
    Init,
    /// Mint devnet funds into an account.
    Faucet(FaucetArgs),
    /// Show an account's balance.
    Balance(BalanceArgs),
    /// Register a new campaign.
    Create(CreateArgs),
    /// Contribute to an active campaign.
    Contribute(ContributeArgs),
    /// Resolve a campaign whose deadline has passed.
    Finalize(CallerArgs),
    /// Pay a successful campaign's funds to its owner.
    Withdraw(CallerArgs),
    /// Reclaim a contribution from a failed campaign.
    Refund(CallerArgs),
    /// List campaigns in creation order.
    List(ListArgs),
    /// Show one campaign in detail.
    Show(ShowArgs),
    /// Print the notification journal.
    Events(EventsArgs),
    /// Move the devnet ledger clock forward.
    AdvanceTime(AdvanceTimeArgs),
    /// Summarize the host state and run consistency checks.
    Status,
    /// Serve the HTTP/WebSocket API and Prometheus metrics.
    Serve(ServeArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for `faucet`.
#[derive(Args, Debug)]
pub struct FaucetArgs {
    /// Account to credit.
    #[arg(long)]
    pub to: String,

    /// Amount to mint, in the smallest currency unit.
    #[arg(long)]
    pub amount: u64,
}

/// Arguments for `balance`.
#[derive(Args, Debug)]
pub struct BalanceArgs {
    /// Account to inspect.
    #[arg(long)]
    pub account: String,
}

/// Arguments for `create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Campaign owner; receives the funds if the goal is met.
    #[arg(long)]
    pub owner: String,

    /// Short title.
    #[arg(long)]
    pub title: String,

    /// Free-form description.
    #[arg(long, default_value = "")]
    pub description: String,

    /// Target amount.
    #[arg(long)]
    pub goal: u64,

    /// Duration in whole days.
    #[arg(long, conflicts_with = "duration_secs", required_unless_present = "duration_secs")]
    pub duration_days: Option<u64>,

    /// Duration in seconds.
    #[arg(long)]
    pub duration_secs: Option<u64>,
}

/// Arguments for `contribute`.
#[derive(Args, Debug)]
pub struct ContributeArgs {
    /// Campaign handle.
    #[arg(long)]
    pub campaign: String,

    /// Contributing account.
    #[arg(long)]
    pub from: String,

    /// Amount to contribute.
    #[arg(long)]
    pub amount: u64,
}

/// Arguments for `finalize`, `withdraw` and `refund`.
#[derive(Args, Debug)]
pub struct CallerArgs {
    /// Campaign handle.
    #[arg(long)]
    pub campaign: String,

    /// Account making the call.
    #[arg(long)]
    pub caller: String,
}

/// Arguments for `list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only campaigns owned by this account.
    #[arg(long)]
    pub owner: Option<String>,

    /// Only campaigns this account has contributed to.
    #[arg(long, conflicts_with = "owner")]
    pub backer: Option<String>,
}

/// Arguments for `show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Campaign handle.
    #[arg(long)]
    pub campaign: String,
}

/// Arguments for `events`.
#[derive(Args, Debug)]
pub struct EventsArgs {
    /// First sequence number to print.
    #[arg(long, default_value_t = 0)]
    pub since: u64,
}

/// Arguments for `advance-time`.
#[derive(Args, Debug)]
pub struct AdvanceTimeArgs {
    /// Seconds to move forward.
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
    pub secs: i64,
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind both listeners to.
    #[arg(long, env = "CROWDX_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port for the HTTP/WebSocket API.
    #[arg(long, env = "CROWDX_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "CROWDX_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,
}

// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # CrowdX Node
//!
//! Entry point for the `crowdx-node` binary. Parses CLI arguments,
//! initializes logging, opens the campaign database and either runs a
//! single contract call or serves the HTTP/WS API and metrics.
//!
//! Every contract call is available both as a subcommand (`create`,
//! `contribute`, `finalize`, `withdraw`, `refund`) and as an HTTP endpoint
//! under `serve`. Inspection commands (`list`, `show`, `events`, `balance`,
//! `status`) read the same database.

mod api;
mod cli;
mod host;
mod logging;
mod metrics;
mod store;

use anyhow::{bail, Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use serde::Serialize;
use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{broadcast, watch};

use crowdx_contracts::{CampaignId, CampaignParams};
use crowdx_protocol::config::{days_to_secs, EVENT_CHANNEL_CAPACITY, PROTOCOL_VERSION, SHUTDOWN_GRACE};
use crowdx_protocol::Address;

use cli::{Commands, CrowdxCli};
use host::{CampaignView, Host};
use logging::LogFormat;
use metrics::NodeMetrics;
use store::CrowdStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CrowdxCli::parse();
    logging::init_logging(
        logging::DEFAULT_FILTER,
        LogFormat::from_str_lossy(&cli.log_format),
    );

    let json = cli.json;
    let data_dir = cli.data_dir;

    match cli.command {
        Commands::Init => init_node(&data_dir, json),
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::Serve(args) => run_server(&data_dir, args).await,
        command => run_command(&data_dir, command, json),
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn db_path(data_dir: &Path) -> std::path::PathBuf {
    data_dir.join("db")
}

/// Creates the data directory and stamps an empty database.
fn init_node(data_dir: &Path, json: bool) -> Result<()> {
    let path = db_path(data_dir);
    std::fs::create_dir_all(&path)
        .with_context(|| format!("failed to create data directory: {}", path.display()))?;

    let store = CrowdStore::open(&path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    let existing = store.protocol_version()?;
    if existing.is_none() {
        store.initialize()?;
    }
    tracing::info!(
        data_dir = %data_dir.display(),
        fresh = existing.is_none(),
        "data directory initialized"
    );

    if json {
        return print_json(&serde_json::json!({
            "data_dir": data_dir.display().to_string(),
            "protocol_version": PROTOCOL_VERSION,
            "fresh": existing.is_none(),
        }));
    }
    match existing {
        None => println!("Node initialized successfully."),
        Some(version) => println!("Already initialized (protocol {})", version),
    }
    println!("  Data directory : {}", data_dir.display());
    println!("  Protocol       : {}", PROTOCOL_VERSION);
    Ok(())
}

/// Opens the host over an initialized data directory.
fn open_host(data_dir: &Path) -> Result<Host> {
    let path = db_path(data_dir);
    if !path.exists() {
        bail!(
            "no database at {}; run `crowdx-node init` first",
            path.display()
        );
    }
    let store = CrowdStore::open(&path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    Host::open(store).context("failed to load host state")
}

fn parse_campaign(raw: &str) -> Result<CampaignId> {
    raw.parse()
        .with_context(|| format!("invalid campaign handle: {raw}"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// One-shot commands
// ---------------------------------------------------------------------------

/// Runs one contract call or query against the local database.
fn run_command(data_dir: &Path, command: Commands, json: bool) -> Result<()> {
    let mut host = open_host(data_dir)?;

    match command {
        Commands::Faucet(args) => {
            let to = Address::parse_or_label(&args.to);
            let balance = host.faucet(&to, args.amount)?;
            if json {
                return print_json(&serde_json::json!({ "address": to, "balance": balance }));
            }
            println!("Minted {} to {} (balance {})", args.amount, to, balance);
        }

        Commands::Balance(args) => {
            let address = Address::parse_or_label(&args.account);
            let account = host.ledger().account(&address).cloned().unwrap_or_default();
            if json {
                return print_json(&serde_json::json!({
                    "address": address,
                    "balance": account.balance,
                    "frozen": account.frozen,
                }));
            }
            println!(
                "{}  balance {}{}",
                address,
                account.balance,
                if account.frozen { " (frozen)" } else { "" }
            );
        }

        Commands::Create(args) => {
            let duration_secs = match (args.duration_secs, args.duration_days) {
                (Some(secs), _) => secs,
                (None, Some(days)) => {
                    days_to_secs(days).context("duration in days is too large")?
                }
                (None, None) => bail!("a duration is required"),
            };
            let owner = Address::parse_or_label(&args.owner);
            let id = host.create_campaign(
                owner,
                CampaignParams {
                    title: args.title,
                    description: args.description,
                    goal: args.goal,
                    duration_secs,
                },
            )?;
            let view = host.view(&id)?;
            if json {
                return print_json(&view);
            }
            println!("Created campaign {}", id);
            print_campaign(&view);
        }

        Commands::Contribute(args) => {
            let id = parse_campaign(&args.campaign)?;
            let from = Address::parse_or_label(&args.from);
            host.contribute(&id, &from, args.amount)?;
            let view = host.view(&id)?;
            if json {
                return print_json(&view);
            }
            println!(
                "{} contributed {} (raised {} of {})",
                from, args.amount, view.total_raised, view.goal
            );
        }

        Commands::Finalize(args) => {
            let id = parse_campaign(&args.campaign)?;
            let caller = Address::parse_or_label(&args.caller);
            let state = host.finalize(&id, &caller)?;
            if json {
                return print_json(&host.view(&id)?);
            }
            println!("Campaign {} finalized: {}", id, state);
        }

        Commands::Withdraw(args) => {
            let id = parse_campaign(&args.campaign)?;
            let caller = Address::parse_or_label(&args.caller);
            let amount = host.withdraw(&id, &caller)?;
            if json {
                return print_json(&serde_json::json!({
                    "campaign": id, "recipient": caller, "amount": amount,
                }));
            }
            println!("Withdrew {} to {}", amount, caller);
        }

        Commands::Refund(args) => {
            let id = parse_campaign(&args.campaign)?;
            let caller = Address::parse_or_label(&args.caller);
            let amount = host.refund(&id, &caller)?;
            if json {
                return print_json(&serde_json::json!({
                    "campaign": id, "recipient": caller, "amount": amount,
                }));
            }
            println!("Refunded {} to {}", amount, caller);
        }

        Commands::List(args) => {
            let views: Vec<CampaignView> = match (&args.owner, &args.backer) {
                (_, Some(backer)) => {
                    let backer = Address::parse_or_label(backer);
                    host.registry()
                        .campaigns_backed_by(&backer)
                        .iter()
                        .map(|id| host.view(id))
                        .collect::<Result<_, _>>()?
                }
                (Some(owner), None) => host.list(Some(&Address::parse_or_label(owner))),
                (None, None) => host.list(None),
            };
            if json {
                return print_json(&views);
            }
            if views.is_empty() {
                println!("No campaigns.");
            }
            for view in &views {
                println!(
                    "{}  {:<10}  {:>3}%  {} / {}  {}",
                    view.id,
                    view.state,
                    view.progress_percent,
                    view.total_raised,
                    view.goal,
                    view.title
                );
            }
        }

        Commands::Show(args) => {
            let id = parse_campaign(&args.campaign)?;
            let view = host.view(&id)?;
            if json {
                return print_json(&view);
            }
            print_campaign(&view);
            let campaign = host.registry().campaign(&id)?;
            for (who, amount) in campaign.contributors() {
                println!("    {}  {}", who, amount);
            }
        }

        Commands::Events(args) => {
            let records = host.events_since(args.since);
            if json {
                return print_json(&records);
            }
            for record in records {
                println!(
                    "#{:<5} {}  {}  {}  {}",
                    record.sequence,
                    record.timestamp.to_rfc3339(),
                    record.campaign,
                    record.event.kind(),
                    serde_json::to_string(&record.event)?
                );
            }
        }

        Commands::AdvanceTime(args) => {
            let now = host.advance_time(args.secs)?;
            if json {
                return print_json(&serde_json::json!({ "ledger_time": now }));
            }
            println!("Ledger time is now {}", now.to_rfc3339());
        }

        Commands::Status => {
            let status = host.status();
            let audit = host.audit();
            if json {
                return print_json(&serde_json::json!({
                    "status": status,
                    "audit": audit.as_ref().err().map(ToString::to_string),
                }));
            }
            println!("crowdx-node {} (protocol {})", status.version, status.protocol_version);
            println!("  Campaigns      : {}", status.campaigns);
            println!("  Events         : {}", status.events);
            println!("  Accounts       : {}", status.accounts);
            println!("  Custody        : {}", status.custody);
            println!("  Total supply   : {}", status.total_supply);
            println!("  Ledger time    : {}", status.ledger_time.to_rfc3339());
            println!("  Clock offset   : {}s", status.clock_offset_secs);
            match audit {
                Ok(()) => println!("  Audit          : ok"),
                Err(reason) => println!("  Audit          : FAILED ({})", reason),
            }
        }

        other @ (Commands::Init | Commands::Version | Commands::Serve(_)) => {
            bail!("{:?} does not run against an open host", other)
        }
    }

    Ok(())
}

fn print_campaign(view: &CampaignView) {
    println!("  {} [{}]", view.title, view.state);
    if !view.description.is_empty() {
        println!("  {}", view.description);
    }
    println!("  Owner          : {}", view.owner);
    println!(
        "  Raised         : {} of {} ({}%)",
        view.total_raised, view.goal, view.progress_percent
    );
    println!("  Escrow         : {}", view.escrow_balance);
    println!("  Deadline       : {}", view.deadline.to_rfc3339());
    if view.seconds_remaining > 0 {
        println!("  Time left      : {}s", view.seconds_remaining);
    } else if view.finalizable {
        println!("  Time left      : ended, ready to finalize");
    }
    if view.withdrawn {
        println!("  Withdrawn      : yes");
    }
    println!("  Contributors   : {}", view.contributors);
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Serves the API and metrics until a shutdown signal arrives.
async fn run_server(data_dir: &Path, args: cli::ServeArgs) -> Result<()> {
    let host = open_host(data_dir)?;
    tracing::info!(
        api_port = args.port,
        metrics_port = args.metrics_port,
        data_dir = %data_dir.display(),
        "starting crowdx-node"
    );

    let node_metrics = Arc::new(NodeMetrics::new().context("failed to create metrics registry")?);
    if let Some(escrowed) = host.registry().total_escrowed() {
        node_metrics.set_escrow(escrowed);
    }

    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            PROTOCOL_VERSION
        ),
        host: Arc::new(Mutex::new(host)),
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.bind, args.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut api_task = tokio::spawn(
        axum::serve(api_listener, api_router)
            .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()))
            .into_future(),
    );
    let mut metrics_task = tokio::spawn(
        axum::serve(metrics_listener, metrics_router)
            .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
            .into_future(),
    );

    let drained = tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
            true
        }
        res = &mut api_task => {
            tracing::error!("API server exited: {:?}", res);
            false
        }
        res = &mut metrics_task => {
            tracing::error!("Metrics server exited: {:?}", res);
            false
        }
    };

    let _ = shutdown_tx.send(true);
    if drained {
        let drain = async {
            let _ = api_task.await;
            let _ = metrics_task.await;
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            tracing::warn!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "connections still open after grace period, closing"
            );
        }
    } else {
        api_task.abort();
        metrics_task.abort();
    }

    tracing::info!("crowdx-node stopped");
    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    // An error means the sender is gone, which is also a shutdown.
    let _ = rx.changed().await;
}

/// Prints version information to stdout.
fn print_version() {
    println!("crowdx-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", PROTOCOL_VERSION);
    println!("rustc       {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that signal is never delivered.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

//! # AutoReg: unattended class registration
//!
//! Watches a gym's class schedule and books each matching class the moment
//! its registration window opens.
//!
//! Usage:
//!   autoreg                      # Run the scheduler loop (same as `autoreg run`)
//!   autoreg run --once           # One refresh/evaluate cycle, then exit
//!   autoreg login                # Check credentials
//!   autoreg schedule             # Print the filtered schedule with open times
//!   autoreg ledger               # Print processed events

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use autoreg_channels::{DiscordNotifier, SmsGatewayNotifier};
use autoreg_core::AutoRegConfig;
use autoreg_core::traits::{Authenticator, ScheduleSource};
use autoreg_providers::{LifetimeAuth, LifetimeClient, LifetimeRegistration, LifetimeSchedule};
use autoreg_scheduler::{
    Collaborators, Ledger, NotifyRouter, SchedulerEngine, SchedulerSettings, SystemClock,
    WindowPolicy,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "autoreg",
    version,
    about = "🏓 AutoReg: books classes the moment registration opens"
)]
struct Cli {
    /// Config file (default: ~/.autoreg/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduling loop until Ctrl-C
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Log in once and report the result
    Login,
    /// Fetch and print the filtered schedule
    Schedule,
    /// Print the processed-event ledger
    Ledger,
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        "autoreg=debug,autoreg_scheduler=debug,autoreg_providers=debug,autoreg_channels=debug"
    } else {
        "autoreg=info,autoreg_scheduler=info,autoreg_providers=info,autoreg_channels=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<AutoRegConfig> {
    let config = match path {
        Some(path) => {
            let mut config = AutoRegConfig::load_from(path)?;
            config.apply_env();
            config
        }
        None => AutoRegConfig::load()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let config = load_config(cli.config.as_ref()).context("loading configuration")?;

    match cli.command.unwrap_or(Command::Run { once: false }) {
        Command::Run { once } => run(config, once).await,
        Command::Login => login(&config).await,
        Command::Schedule => schedule(&config).await,
        Command::Ledger => ledger(&config),
    }
}

async fn run(config: AutoRegConfig, once: bool) -> Result<()> {
    config.validate()?;
    let client = LifetimeClient::new(&config.api, config.timing.request_timeout_secs)?;

    let mut router = NotifyRouter::new();
    if config.notify.sms.is_enabled() {
        router.register(Box::new(SmsGatewayNotifier::new(config.notify.sms.clone())));
    } else {
        tracing::warn!("📵 SMS notifications disabled (recipient, sender or password missing)");
    }
    if config.notify.discord.is_enabled() {
        router.register(Box::new(DiscordNotifier::new(&config.notify.discord)));
    }

    let collaborators = Collaborators {
        auth: Box::new(LifetimeAuth::new(client.clone())),
        source: Box::new(LifetimeSchedule::new(client.clone(), &config.schedule)),
        transport: Box::new(LifetimeRegistration::new(client)),
    };
    let ledger = Ledger::load(&config.ledger_path());
    let mut engine = SchedulerEngine::new(
        SchedulerSettings::from_config(&config),
        collaborators,
        ledger,
        router,
        Arc::new(SystemClock),
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("❌ Ctrl-C handler failed: {e}");
            std::future::pending::<()>().await;
        }
    };
    engine.run(shutdown, once).await?;
    Ok(())
}

async fn login(config: &AutoRegConfig) -> Result<()> {
    let client = LifetimeClient::new(&config.api, config.timing.request_timeout_secs)?;
    let tokens = LifetimeAuth::new(client)
        .login(&config.credentials())
        .await?;
    println!("✅ Login OK for {} (ssoId {})", config.account.username, tokens.ssoid);
    Ok(())
}

async fn schedule(config: &AutoRegConfig) -> Result<()> {
    let client = LifetimeClient::new(&config.api, config.timing.request_timeout_secs)?;
    let tokens = LifetimeAuth::new(client.clone())
        .login(&config.credentials())
        .await?;
    let mut events = LifetimeSchedule::new(client, &config.schedule)
        .fetch(&tokens)
        .await?;
    events.sort_by_key(|e| e.start_time);

    let policy = WindowPolicy::from_timing(&config.timing);
    let ledger = Ledger::load(&config.ledger_path());
    println!("🗓️ {} classes match the filters\n", events.len());
    for e in &events {
        let mark = if ledger.contains(&e.id) { "✔" } else { " " };
        println!(
            "{mark} {:<40} {:<10} {:<20} opens {}  [{}]",
            e.class_name,
            e.day_of_week,
            e.when(),
            policy.official_open(e.start_time).format("%Y-%m-%d %H:%M UTC"),
            e.id
        );
    }
    Ok(())
}

fn ledger(config: &AutoRegConfig) -> Result<()> {
    let ledger = Ledger::load(&config.ledger_path());
    println!("📒 {} processed events ({})\n", ledger.len(), ledger.path().display());
    for r in ledger.records() {
        println!(
            "{:<28} {:<40} {:<26} attempts={} at {}",
            r.event_id,
            r.class_name.as_deref().unwrap_or("-"),
            r.status.to_string(),
            r.attempts_made,
            r.processed_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if !r.message.is_empty() {
            println!("    {}", r.message);
        }
    }
    Ok(())
}

//! # CertWatch — compliance record expiry tracker
//!
//! Sweeps every tenant's compliance records against its notification rules
//! and sends reminder/escalation emails for records approaching expiry.
//!
//! Usage:
//!   certwatch run                        # Sweep all active tenants for today
//!   certwatch run --tenant <id>          # Sweep one tenant
//!   certwatch run --date 2026-03-03      # Sweep as-of a specific date
//!   certwatch run --dry-run              # Log sends instead of dispatching
//!   certwatch init                       # Write default config, create DB

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use certwatch_core::CertWatchConfig;
use certwatch_engine::{run_for_tenant, RunSummary};
use certwatch_mailer::{DryRunMailer, Mailer, SmtpMailer};
use certwatch_store::Store;

#[derive(Parser)]
#[command(
    name = "certwatch",
    version,
    about = "📋 CertWatch — compliance record expiry tracker"
)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the notification sweep
    Run {
        /// Sweep a single tenant instead of all active tenants
        #[arg(long)]
        tenant: Option<String>,

        /// Run date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Database path (overrides config)
        #[arg(long)]
        db: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<String>,

        /// Log what would be sent without dispatching
        #[arg(long)]
        dry_run: bool,
    },
    /// Write a default config file and initialize the database
    Init {
        /// Config file path
        #[arg(long)]
        config: Option<String>,

        /// Database path (overrides config)
        #[arg(long)]
        db: Option<String>,
    },
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

fn load_config(path: Option<&str>) -> Result<CertWatchConfig> {
    let config = match path {
        Some(p) => CertWatchConfig::load_from(Path::new(&expand_path(p)))?,
        None => CertWatchConfig::load()?,
    };
    Ok(config)
}

fn open_store(db_path: &str) -> Result<Store> {
    let db_path = expand_path(db_path);
    if let Some(parent) = Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Store::open(Path::new(&db_path))?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "certwatch=debug,certwatch_engine=debug,certwatch_store=debug,certwatch_mailer=debug"
    } else {
        "certwatch=info,certwatch_engine=info,certwatch_store=info,certwatch_mailer=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    match cli.command {
        Command::Init { config, db } => cmd_init(config.as_deref(), db.as_deref()),
        Command::Run {
            tenant,
            date,
            db,
            config,
            dry_run,
        } => cmd_run(tenant.as_deref(), date, db.as_deref(), config.as_deref(), dry_run).await,
    }
}

fn cmd_init(config_path: Option<&str>, db: Option<&str>) -> Result<()> {
    println!("📋 CertWatch v{} — Setup\n", env!("CARGO_PKG_VERSION"));

    let default_path = CertWatchConfig::default_path();
    let target = config_path.map(|p| PathBuf::from(expand_path(p))).unwrap_or(default_path);

    if target.exists() {
        println!("⚠️  Config already exists: {}", target.display());
    } else {
        let config = CertWatchConfig::default();
        if config_path.is_none() {
            config.save()?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, toml::to_string_pretty(&config)?)?;
        }
        println!("✅ Config written: {}", target.display());
    }

    let config = CertWatchConfig::load_from(&target)?;
    let db_path = db.unwrap_or(&config.db_path);
    open_store(db_path)?;
    println!("✅ Database ready: {}", expand_path(db_path));
    println!("\nEdit [mail] in the config before running without --dry-run.");
    Ok(())
}

async fn cmd_run(
    tenant: Option<&str>,
    date: Option<NaiveDate>,
    db: Option<&str>,
    config_path: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let db_path = db.unwrap_or(&config.db_path);
    let store = open_store(db_path)?;
    let run_date = date.unwrap_or_else(|| chrono::Local::now().date_naive());

    let mailer: Box<dyn Mailer> = if dry_run {
        tracing::info!("Dry run: no email will be dispatched");
        Box::new(DryRunMailer)
    } else {
        Box::new(SmtpMailer::new(config.mail.clone())?)
    };

    println!("📋 CertWatch v{}", env!("CARGO_PKG_VERSION"));
    println!("   🗄️  Database: {}", expand_path(db_path));
    println!("   📅 Run date: {run_date}");
    println!();

    let tenants = match tenant {
        Some(id) => {
            let t = store.get_tenant(id)?;
            if !t.is_active {
                println!("   {} — inactive, nothing to do", t.name);
                Vec::new()
            } else {
                vec![t]
            }
        }
        None => store.list_active_tenants()?,
    };

    let mut summaries: Vec<RunSummary> = Vec::new();
    for t in &tenants {
        // Roll statuses forward first so escalation suppression sees
        // today's truth, not yesterday's. A store failure here aborts this
        // tenant only, like a failure inside the sweep itself.
        let result = match store.refresh_expired_statuses(&t.id, run_date) {
            Ok(_) => run_for_tenant(&store, mailer.as_ref(), &config.notify, &t.id, run_date).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(summary) => {
                println!(
                    "   {} — created {}, sent {}, failed {}, skipped {}",
                    t.name, summary.created, summary.sent, summary.failed, summary.skipped
                );
                store
                    .log_event(
                        "sweep_completed",
                        "certwatch-cli",
                        Some(&format!(
                            "tenant={} date={} created={} sent={} failed={} skipped={}",
                            t.id, run_date, summary.created, summary.sent, summary.failed,
                            summary.skipped
                        )),
                    )
                    .ok();
                summaries.push(summary);
            }
            Err(e) => {
                tracing::error!("Sweep aborted for tenant '{}': {e}", t.name);
                println!("   {} — aborted: {e}", t.name);
            }
        }
    }

    let (created, sent, failed, skipped) = summaries.iter().fold((0, 0, 0, 0), |acc, s| {
        (acc.0 + s.created, acc.1 + s.sent, acc.2 + s.failed, acc.3 + s.skipped)
    });
    println!();
    println!("   TOTAL — created {created}, sent {sent}, failed {failed}, skipped {skipped}");
    Ok(())
}

//! `inventory` operator binary: migrations, code allocation, asset
//! collection and login throttle maintenance.
//!
//! Settings come from `INVENTORY_*` environment variables (see
//! [`inventory::config::InventorySettings`]). Every subcommand prints a plain
//! `key=value` report on stdout; logs go to stderr as JSON.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result, eyre};
use diesel::Connection;
use diesel::pg::PgConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use mockable::DefaultClock;
use ortho_config::OrthoConfig as _;
use tokio::runtime::Builder;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use inventory::config::InventorySettings;
use inventory::domain::{AssetGarbageCollector, IdentifierAllocator, LoginThrottle, format_size};
use inventory::outbound::assets::DirectoryAssetStore;
use inventory::outbound::persistence::{
    DbPool, DieselCatalogRepository, DieselLoginAttemptRepository,
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// `inventory` command arguments.
#[derive(Debug, Parser)]
#[command(name = "inventory", about = "Catalog maintenance tasks", version)]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
enum Command {
    /// Apply pending database migrations.
    Migrate,
    /// Print the inventory code the next record would receive.
    NextCode,
    /// List orphaned assets without deleting anything.
    Scan,
    /// Delete orphaned assets.
    Collect,
    /// Remove stale, unlocked login attempt counters.
    Prune {
        /// Retention in days; defaults to the configured retention.
        #[arg(long)]
        days: Option<u32>,
    },
    /// Show every login attempt counter, newest first.
    Status,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let args = CliArgs::parse();
    let settings = InventorySettings::load_from_iter([OsString::from("inventory")])
        .map_err(|err| eyre!("failed to load settings: {err}"))?;

    if args.command == Command::Migrate {
        return migrate(&settings);
    }

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("failed to build Tokio runtime")?;
    runtime.block_on(run(args.command, settings))
}

fn migrate(settings: &InventorySettings) -> Result<()> {
    let mut conn = PgConnection::establish(settings.database_url()?)
        .wrap_err("failed to connect for migrations")?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| eyre!("failed to run migrations: {err}"))?;
    info!(count = applied.len(), "migrations applied");
    println!("applied={}", applied.len());
    for version in applied {
        println!("migration={version}");
    }
    Ok(())
}

async fn run(command: Command, settings: InventorySettings) -> Result<()> {
    let pool = DbPool::new(settings.pool_config()?)
        .await
        .wrap_err("failed to create database pool")?;

    match command {
        Command::Migrate => Err(eyre!("migrate runs outside the async runtime")),
        Command::NextCode => {
            let repository = Arc::new(DieselCatalogRepository::new(pool));
            let allocator = IdentifierAllocator::new(repository, settings.code_format()?);
            let code = allocator.allocate_next().await?;
            println!("next_code={code}");
            Ok(())
        }
        Command::Scan => {
            let collector = collector(pool, &settings)?;
            let report = collector.scan().await?;
            println!("files_in_store={}", report.files_in_store.len());
            println!("files_referenced={}", report.files_referenced.len());
            println!("orphans={}", report.orphans.len());
            println!("orphan_bytes={}", report.orphan_bytes());
            println!("orphan_size={}", format_size(report.orphan_bytes()));
            for orphan in &report.orphans {
                println!("orphan={} ({})", orphan.name, format_size(orphan.size_bytes));
            }
            Ok(())
        }
        Command::Collect => {
            let collector = collector(pool, &settings)?;
            let report = collector.collect().await;
            println!("deleted={}", report.deleted.len());
            println!("bytes_freed={}", report.bytes_freed);
            println!("freed={}", format_size(report.bytes_freed));
            println!("skipped={}", report.skipped.len());
            println!("errors={}", report.errors.len());
            for failure in &report.errors {
                println!("error={}: {}", failure.name, failure.message);
            }
            Ok(())
        }
        Command::Prune { days } => {
            let throttle = throttle(pool, &settings);
            let days = days.unwrap_or_else(|| throttle.policy().retention_days());
            let removed = throttle.prune(days).await?;
            println!("retention_days={days}");
            println!("removed={removed}");
            Ok(())
        }
        Command::Status => {
            let rows = throttle(pool, &settings).status().await?;
            println!("count={}", rows.len());
            for row in rows {
                println!(
                    "identity={} origin={} attempts={} locked={} remaining_minutes={} last_attempt={}",
                    row.identity,
                    row.origin,
                    row.attempts,
                    row.is_locked,
                    row.remaining_minutes,
                    row.last_attempt.to_rfc3339()
                );
            }
            Ok(())
        }
    }
}

fn collector(
    pool: DbPool,
    settings: &InventorySettings,
) -> Result<AssetGarbageCollector<DieselCatalogRepository, DirectoryAssetStore>> {
    let store = DirectoryAssetStore::open(settings.asset_dir()).wrap_err_with(|| {
        format!("failed to open asset directory {}", settings.asset_dir().display())
    })?;
    Ok(AssetGarbageCollector::new(
        Arc::new(DieselCatalogRepository::new(pool)),
        Arc::new(store),
        settings.allowed_extensions(),
    ))
}

fn throttle(pool: DbPool, settings: &InventorySettings) -> LoginThrottle<DieselLoginAttemptRepository> {
    LoginThrottle::new(
        Arc::new(DieselLoginAttemptRepository::new(pool)),
        settings.throttle_policy(),
        Arc::new(DefaultClock),
    )
}

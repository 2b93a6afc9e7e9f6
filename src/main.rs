mod cli;
mod config;
mod database;
mod error;
mod filesystem;
mod models;
mod services;

use chrono::{Duration, Utc};
use clap::Parser;
use cli::{Cli, Commands};
use error::AppError;
use filesystem::AppPaths;
use models::Client;
use photo_vault::{PersistedDeviceIdentity, PhotoRef, PhotoVault, SqliteLedger};
use rusqlite::Connection;
use std::sync::Arc;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        log::error!("{}", e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

#[cfg(target_os = "android")]
fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(level)
            .with_tag("coachbook"),
    );
}

#[cfg(not(target_os = "android"))]
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

/// Open the database, device identity and photo vault for one data dir
async fn open(paths: &AppPaths) -> Result<(Connection, PhotoVault), AppError> {
    let config = config::load_vault_config(paths)?;

    let conn = database::init_database(&paths.database_file())?;
    let device = PersistedDeviceIdentity::load_or_create(&conn)?;
    let ledger = SqliteLedger::open(&paths.database_file())?;

    let vault = PhotoVault::new(&config, Arc::new(ledger), Arc::new(device)).await?;
    Ok((conn, vault))
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let paths = cli
        .data_dir
        .map(AppPaths::new)
        .unwrap_or_else(AppPaths::platform_default);

    if let Commands::Config = cli.command {
        let config = config::load_vault_config(&paths)?;
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let (conn, vault) = open(&paths).await?;

    match cli.command {
        Commands::AddClient { name } => {
            let client = Client::new(name);
            services::create_client(&conn, &client)?;
            println!("{}", client.uuid);
        }
        Commands::Clients => {
            for client in services::list_clients(&conn)? {
                println!("{}\t{}", client.uuid, client.name);
            }
        }
        Commands::Upload {
            client,
            category,
            file,
            notes,
            date,
        } => {
            let identity =
                services::add_client_photo(&conn, &vault, &client, &file, category, notes, date)
                    .await?;
            println!("{}", identity);
        }
        Commands::Get { identity } => match vault.get_photo(&identity).await? {
            Some(reference) => println!("{}", reference),
            None => return Err(AppError::NotFound(format!("Photo {}", identity))),
        },
        Commands::Fetch { identity, output } => {
            let written = services::export_photo(&vault, &identity, &output).await?;
            println!("{} bytes written to {}", written, output.display());
        }
        Commands::List { client, category } => {
            for listing in services::list_client_photos(&conn, &vault, &client, category).await? {
                let record = &listing.record;
                let location = match &listing.reference {
                    Some(PhotoRef::Local(path)) => format!("local {}", path.display()),
                    Some(PhotoRef::Remote(url)) => format!("remote {}", url),
                    None => "not on this device".to_string(),
                };
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    record.identity,
                    record.category,
                    record.capture_date,
                    record.notes.as_deref().unwrap_or(""),
                    location
                );
            }
        }
        Commands::Delete { identity } => {
            if !vault.delete_photo(&identity).await? {
                return Err(AppError::NotFound(format!("Photo {}", identity)));
            }
        }
        Commands::DeleteClient { client } => {
            let report = services::delete_client(&conn, &vault, &client).await?;
            println!(
                "{} photos deleted ({} remote deletes queued for retry)",
                report.records_deleted, report.remote_queued
            );
        }
        Commands::Replicate { client } => {
            let report = vault.replicate_pending(client.as_deref()).await?;
            println!(
                "{} replicated, {} failed",
                report.replicated, report.failed
            );
        }
        Commands::Sweep { older_than_minutes } => {
            let cutoff = Utc::now() - Duration::minutes(older_than_minutes.max(0));
            let report = vault.sweep(cutoff).await?;
            println!(
                "{} orphans deleted, {} possible leaks, {} of {} queued deletes resolved",
                report.orphans_deleted,
                report.possible_leaks,
                report.deletes_resolved,
                report.deletes_retried
            );
        }
        Commands::DeviceId => println!("{}", vault.device_id()),
        Commands::Config => {}
    }

    Ok(())
}

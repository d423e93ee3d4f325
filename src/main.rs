mod account;
mod booking;
mod config;
mod display;
mod error;
mod export;
mod store;
mod web;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use account::{Role, UserDirectory};
use booking::{default_catalog, local_now, BookingLedger, ResetPolicy};
use config::AppConfig;
use display::{print_sport_grid, write_grid_to_file};
use export::export_history_to_csv;
use store::{FileStore, SessionStore};

const USAGE: &str = "usage: court-booking [web [port] | show [sport] | reset [sport] --yes \
| export <username> <file.csv> | export-all <dir> | write-grids <dir> | promote <username> \
| purge-history <username> --yes]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("web");

    let config = AppConfig::from_env();
    let store: Arc<dyn SessionStore> = Arc::new(
        FileStore::new(&config.data_dir)
            .with_context(|| format!("opening data directory {}", config.data_dir.display()))?,
    );
    let ledger = BookingLedger::new(store.clone(), default_catalog());

    match command {
        "web" => {
            let config = config.with_port_arg(args.get(2));
            let users = UserDirectory::new(store);
            let state = web::AppState::new(ledger, users, config.admin_password.clone())?;
            tracing::info!(
                "serving {} sport(s) from {} at http://localhost:{}",
                state.ledger.sports().len(),
                config.data_dir.display(),
                config.port
            );
            web::start_server(config, state).await?;
        }
        "show" => {
            run_due_reset(&ledger)?;
            let only = args.get(2);
            if let Some(key) = only {
                ledger.sport(key)?;
            }
            for sport in ledger.sports() {
                if only.map_or(true, |key| *key == sport.key) {
                    print_sport_grid(sport, &ledger.grid(&sport.key)?);
                }
            }
        }
        "reset" => {
            let confirmed = args.iter().skip(2).any(|a| a == "--yes");
            match args.get(2).filter(|a| *a != "--yes") {
                Some(sport) => {
                    ledger.sport(sport)?;
                    if !confirmed {
                        bail!("resetting {} requires --yes", sport);
                    }
                    let changed = ledger.apply_reset(sport)?;
                    println!("Reset {}: {}", sport, if changed { "cleared" } else { "already clear" });
                }
                None => {
                    let mut policy = ResetPolicy::load(&ledger)?;
                    let changed = policy.manual_reset(&ledger, local_now(), confirmed)?;
                    println!("Reset {} sport(s)", changed);
                }
            }
        }
        "export" => {
            let (username, path) = match (args.get(2), args.get(3)) {
                (Some(username), Some(path)) => (username, path),
                _ => bail!(USAGE),
            };
            let records = ledger.history(username)?;
            let written = export_history_to_csv(username, &records, Path::new(path))
                .with_context(|| format!("writing {}", path))?;
            println!("Exported {} booking(s) for {} to {}", written, username, path);
        }
        "export-all" => {
            let dir = match args.get(2) {
                Some(dir) => Path::new(dir),
                None => bail!(USAGE),
            };
            std::fs::create_dir_all(dir)?;
            for username in ledger.identities_with_history()? {
                let path = dir.join(format!("{}.csv", username));
                let written = export_history_to_csv(&username, &ledger.history(&username)?, &path)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("  - {} ({} booking(s))", path.display(), written);
            }
        }
        "purge-history" => {
            let username = match args.get(2) {
                Some(username) => username,
                None => bail!(USAGE),
            };
            if !args.iter().skip(3).any(|a| a == "--yes") {
                bail!("purging the history of {} requires --yes", username);
            }
            let purged = ledger.purge_history(username)?;
            println!("Purged {} booking record(s) of {}", purged, username);
        }
        "write-grids" => {
            let dir = match args.get(2) {
                Some(dir) => Path::new(dir),
                None => bail!(USAGE),
            };
            run_due_reset(&ledger)?;
            std::fs::create_dir_all(dir)?;
            for sport in ledger.sports() {
                let path = dir.join(format!("{}.txt", sport.key));
                write_grid_to_file(sport, &ledger.grid(&sport.key)?, &path)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("  - {}", path.display());
            }
        }
        "promote" => {
            let username = match args.get(2) {
                Some(username) => username,
                None => bail!(USAGE),
            };
            UserDirectory::new(store).set_role(username, Role::Admin)?;
            println!("{} is now an admin", username);
        }
        other => bail!("unknown command {:?}\n{}", other, USAGE),
    }

    Ok(())
}

/// CLI commands observe the same daily schedule as the web routes.
fn run_due_reset(ledger: &BookingLedger) -> anyhow::Result<()> {
    let mut policy = ResetPolicy::load(ledger)?;
    if policy.tick(ledger, local_now())? {
        tracing::info!("applied scheduled reset before reading grids");
    }
    Ok(())
}

//! Trailvault - historical version manager for Trailmakers
//!
//! Installs old Steam builds side by side with the current one, swaps
//! them into the live Steam directory for a play session, and restores
//! everything afterwards while keeping saves and blueprints intact.

mod app;
mod archive;
mod backup;
mod config;
mod download;
mod error;
mod fsops;
mod launch;
mod paths;
mod saves;
mod session;
mod shared;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::app::VaultApp;
use crate::archive::VersionCatalog;
use crate::config::AppConfig;
use crate::download::Credentials;

/// Trailvault - play historical Trailmakers versions
#[derive(Parser, Debug)]
#[command(name = "trailvault")]
#[command(about = "Install and play old Trailmakers builds without losing your current game")]
struct Args {
    /// Launch the game executable directly instead of through Steam
    #[arg(long, global = true)]
    direct: bool,

    /// Log at debug level
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List known versions and whether they are downloaded
    List,
    /// Install a version, launch it, and restore files when it exits
    Play {
        /// Version display name, e.g. "1.0 Release"
        version: String,
    },
    /// Download a version into the archive
    Fetch {
        /// Version display name, e.g. "1.0 Release"
        version: String,
        /// Steam account name
        #[arg(short, long)]
        username: String,
        /// Steam password; prompted for when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Delete a downloaded version and its saves
    Uninstall {
        version: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Restore factory files and delete every downloaded version
    FactoryReset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Put the factory Steam and save directories back right now
    Restore,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_or_create_config();
    let catalog = match config::get_config_dir() {
        Ok(dir) => VersionCatalog::load_or_builtin(&dir),
        Err(_) => VersionCatalog::builtin(),
    };

    match args.command {
        Command::List => {
            // Listing should work even when Steam was not found.
            match VaultApp::new(config, catalog.clone(), args.direct) {
                Ok(app) => app.list(),
                Err(_) => {
                    println!("(Steam installation not found; showing the catalog only)");
                    for version in catalog.versions() {
                        println!("             {}", version.name);
                    }
                }
            }
        }
        Command::Play { version } => {
            let mut app = VaultApp::new(config, catalog, args.direct)?;
            app.play(&version)?;
            app.shutdown()?;
        }
        Command::Fetch {
            version,
            username,
            password,
        } => {
            let app = VaultApp::new(config, catalog, args.direct)?;
            let password = match password {
                Some(p) => p,
                None => prompt("Steam password: ")?,
            };
            app.fetch(&version, &Credentials { username, password })?;
        }
        Command::Uninstall { version, yes } => {
            if !yes && !confirm(&format!("Permanently delete '{version}' and its saves?"))? {
                println!("Uninstall cancelled.");
                return Ok(());
            }
            let app = VaultApp::new(config, catalog, args.direct)?;
            app.uninstall(&version)?;
        }
        Command::FactoryReset { yes } => {
            if !yes
                && !confirm(
                    "Delete all downloaded versions and their saves, and restore the main game?",
                )?
            {
                println!("Factory reset cancelled.");
                return Ok(());
            }
            let app = VaultApp::new(config, catalog, args.direct)?;
            app.factory_reset()?;
        }
        Command::Restore => {
            let app = VaultApp::new(config, catalog, args.direct)?;
            app.restore()?;
        }
    }

    Ok(())
}

/// Load configuration from file or create default
fn load_or_create_config() -> AppConfig {
    if let Ok(config_dir) = config::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            if let Ok(config) = config::load_config(&config_path) {
                info!("Loaded configuration from {:?}", config_path);
                return config;
            }
        } else if let Err(e) = config::save_config(&AppConfig::default(), &config_path) {
            info!("Could not write default configuration: {e}");
        }
    }
    info!("Using default configuration");
    AppConfig::default()
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn confirm(message: &str) -> Result<bool> {
    let answer = prompt(&format!("{message} [y/N] "))?;
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

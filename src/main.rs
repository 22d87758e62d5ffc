//! Binary entrypoint for the onlypoly server.
//!
//! Commands:
//! - `start [--bind <addr>]` - run the game server
//! - `init` - write a starter `config.toml`
//! - `status` - print a summary of the stored session snapshot
//! - `reset` - discard the stored session snapshot
//!
//! See the library crate docs for module-level details: `onlypoly::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::time::Duration;

use onlypoly::config::Config;
use onlypoly::game::{GameSession, SessionSnapshot};
use onlypoly::server::{self, ServerSettings};
use onlypoly::storage::{self, SnapshotStore};

#[derive(Parser)]
#[command(name = "onlypoly")]
#[command(about = "Authoritative server for a multiplayer property-trading board game")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the game server
    Start {
        /// Listen address, overriding `server.bind`
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Write a default configuration file
    Init,
    /// Show the stored session
    Status,
    /// Discard the stored session so the next start opens an empty lobby
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Start { bind } => {
            let config = match config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            info!("Starting onlypoly v{}", env!("CARGO_PKG_VERSION"));
            run_server(config, bind).await?;
        }
        Commands::Init => {
            info!("Initializing new onlypoly configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Status => {
            let config = match config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            let store = SnapshotStore::open(&config.storage.data_dir)?;
            match store.load()? {
                Some(snapshot) => print_status(&snapshot),
                None => println!("No stored session in {}", store.path().display()),
            }
        }
        Commands::Reset => {
            let config = match config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            let store = SnapshotStore::open(&config.storage.data_dir)?;
            if store.clear()? {
                println!("Stored session cleared.");
            } else {
                println!("No stored session to clear.");
            }
        }
    }

    Ok(())
}

async fn run_server(config: Config, bind: Option<String>) -> Result<()> {
    let board = config.game.load_board()?;
    let rules = config.game.rules();

    let store = SnapshotStore::open(&config.storage.data_dir)
        .map_err(|e| anyhow!("Failed to open snapshot store in {}: {}", config.storage.data_dir, e))?;
    if config.storage.fresh_start && store.clear()? {
        info!("fresh_start set; discarded stored session");
    }
    let session = match store.load().map_err(|e| {
        anyhow!(
            "Failed to load stored session: {} (run `onlypoly reset` to discard it)",
            e
        )
    })? {
        Some(snapshot) => {
            info!(
                "Restored session with {} players (started: {})",
                snapshot.players.len(),
                snapshot.started
            );
            GameSession::restore(board, rules, snapshot)
        }
        None => {
            info!("No stored session; opening an empty lobby");
            GameSession::new(board, rules)
        }
    };

    let writer = storage::start_writer(store);
    let settings = ServerSettings {
        auction: config.auction.rules(),
        roll_cooldown: Duration::from_millis(config.server.roll_cooldown_ms),
    };
    let handle = server::start_server(session, settings, Some(writer.clone()));

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    };
    let result = server::ws::serve(&bind, handle.clone(), shutdown).await;

    handle.shutdown().await;
    if let Some(stats) = writer.stats().await {
        info!(
            "Snapshot writer: {} written, {} coalesced, {} failed",
            stats.written, stats.coalesced, stats.failed
        );
    }
    writer.shutdown().await;
    result
}

fn print_status(snapshot: &SessionSnapshot) {
    println!(
        "Session saved at {} ({})",
        snapshot.saved_at.format("%Y-%m-%d %H:%M:%S UTC"),
        if snapshot.started { "in progress" } else { "lobby" }
    );
    let current = snapshot.turn_order.get(snapshot.current_turn_index);
    for id in &snapshot.turn_order {
        if let Some(p) = snapshot.players.get(id) {
            println!(
                "{} {:<16} ${:<6} tile {:<2} {} properties{}",
                if Some(id) == current { ">" } else { " " },
                p.name,
                p.money,
                p.position,
                p.property_count(),
                if p.in_jail { " (in jail)" } else { "" }
            );
        }
    }
    let bankrupt: Vec<&str> = snapshot
        .players
        .values()
        .filter(|p| p.bankrupt)
        .map(|p| p.name.as_str())
        .collect();
    if !bankrupt.is_empty() {
        println!("Bankrupt: {}", bankrupt.join(", "));
    }
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    // sled is chatty at debug
    builder.filter_module("sled", log::LevelFilter::Warn);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Mirror to the console only when attached to a terminal
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}

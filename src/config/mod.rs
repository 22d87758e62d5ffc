//! # Configuration Management Module
//!
//! Server configuration, loaded from a TOML file with defaults for every field so a
//! partial file (or none at all, via `onlypoly init`) is enough to get going.
//!
//! ## Configuration Structure
//!
//! - [`ServerConfig`] - WebSocket bind address and roll cooldown
//! - [`GameConfig`] - economy and lobby constants, optional board file
//! - [`AuctionConfig`] - auction duration, timer grace and bid steps
//! - [`StorageConfig`] - snapshot store location
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use onlypoly::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Listening on {}", config.server.bind);
//!
//!     Config::create_default("config.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:3000"
//!
//! [game]
//! starting_money = 1500
//! board_file = "board.json"
//!
//! [auction]
//! duration_ms = 30000
//! bid_steps = [10, 50, 100]
//!
//! [storage]
//! data_dir = "./data"
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::game::{AuctionRules, Board, GameRules, Money};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub auction: AuctionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Minimum gap between two accepted dice rolls in the session (ms).
    pub roll_cooldown_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            roll_cooldown_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub starting_money: Money,
    pub max_players: usize,
    pub min_players: usize,
    pub min_ready: usize,
    pub jail_fine: Money,
    pub jail_turns: u8,
    pub rent_cap_percent: Money,
    pub sell_refund_percent: Money,
    pub max_name_chars: usize,
    /// JSON array of tiles replacing the built-in board.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_file: Option<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        let rules = GameRules::default();
        Self {
            starting_money: rules.starting_money,
            max_players: rules.max_players,
            min_players: rules.min_players,
            min_ready: rules.min_ready,
            jail_fine: rules.jail_fine,
            jail_turns: rules.jail_turns,
            rent_cap_percent: rules.rent_cap_percent,
            sell_refund_percent: rules.sell_refund_percent,
            max_name_chars: rules.max_name_chars,
            board_file: None,
        }
    }
}

impl GameConfig {
    pub fn rules(&self) -> GameRules {
        GameRules {
            starting_money: self.starting_money,
            max_players: self.max_players,
            min_players: self.min_players,
            min_ready: self.min_ready,
            jail_fine: self.jail_fine,
            jail_turns: self.jail_turns,
            rent_cap_percent: self.rent_cap_percent,
            sell_refund_percent: self.sell_refund_percent,
            max_name_chars: self.max_name_chars,
        }
    }

    /// The configured board file, or the built-in board.
    pub fn load_board(&self) -> Result<Board> {
        match &self.board_file {
            Some(path) => Board::load_from_json(path)
                .map_err(|e| anyhow!("Failed to load board: {}", e)),
            None => Ok(Board::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuctionConfig {
    pub duration_ms: u64,
    pub grace_ms: u64,
    pub bid_steps: Vec<Money>,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        let rules = AuctionRules::default();
        Self {
            duration_ms: rules.duration.as_millis() as u64,
            grace_ms: rules.grace.as_millis() as u64,
            bid_steps: rules.bid_steps,
        }
    }
}

impl AuctionConfig {
    pub fn rules(&self) -> AuctionRules {
        AuctionRules {
            duration: Duration::from_millis(self.duration_ms),
            grace: Duration::from_millis(self.grace_ms),
            bid_steps: self.bid_steps.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Discard the stored snapshot at startup.
    pub fresh_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            fresh_start: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("onlypoly.log".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let game = &self.game;
        if game.min_players < 2 {
            return Err(anyhow!("game.min_players must be at least 2"));
        }
        if game.max_players < game.min_players {
            return Err(anyhow!("game.max_players must be >= game.min_players"));
        }
        if !(0..=100).contains(&game.rent_cap_percent) {
            return Err(anyhow!("game.rent_cap_percent must be between 0 and 100"));
        }
        if !(0..=100).contains(&game.sell_refund_percent) {
            return Err(anyhow!("game.sell_refund_percent must be between 0 and 100"));
        }
        if game.starting_money < 0 || game.jail_fine < 0 {
            return Err(anyhow!("game money values must not be negative"));
        }
        if self.auction.duration_ms == 0 {
            return Err(anyhow!("auction.duration_ms must be positive"));
        }
        if !self.auction.bid_steps.iter().any(|s| *s > 0) {
            return Err(anyhow!("auction.bid_steps needs at least one positive step"));
        }
        Ok(())
    }
}

//! # Storage Module - Session Snapshot Persistence
//!
//! The game keeps its authoritative state in memory. This module persists serialized
//! [`SessionSnapshot`]s so a restarted process can pick the room back up.
//!
//! ## Layout
//!
//! ```text
//! <data_dir>/
//! └── session/        ← sled database
//!     └── rooms       ← tree: room id → JSON snapshot
//! ```
//!
//! Snapshots are stored as JSON rather than a binary encoding because the game types
//! use internally tagged enums and flattened fields.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use onlypoly::storage::SnapshotStore;
//!
//! # fn main() -> Result<(), onlypoly::storage::StorageError> {
//! let store = SnapshotStore::open("./data")?;
//! if let Some(snapshot) = store.load()? {
//!     println!("{} players saved", snapshot.players.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Writes from the game loop go through the write-behind [`SnapshotWriter`] instead of
//! calling [`SnapshotStore::save`] directly.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::game::snapshot::{SessionSnapshot, SNAPSHOT_VERSION};

pub mod writer;

pub use writer::{start_writer, SnapshotWriter, WriterStats};

/// Room id used while the server hosts a single room.
pub const DEFAULT_ROOM: &str = "default_room";

const SESSION_DIR: &str = "session";
const TREE_ROOMS: &str = "rooms";

#[derive(Debug, Error)]
pub enum StorageError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Snapshot encoding or decoding failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Directory creation and similar filesystem failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when a stored snapshot was written by an incompatible version.
    #[error("schema mismatch for snapshot: expected {expected}, got {found}")]
    SchemaMismatch { expected: u32, found: u32 },
}

/// Builder for [`SnapshotStore`] to allow selecting the room key.
pub struct SnapshotStoreBuilder {
    data_dir: PathBuf,
    room: String,
}

impl SnapshotStoreBuilder {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            room: DEFAULT_ROOM.to_string(),
        }
    }

    pub fn room(mut self, room: &str) -> Self {
        self.room = room.to_string();
        self
    }

    pub fn open(self) -> Result<SnapshotStore, StorageError> {
        SnapshotStore::open_with_room(self.data_dir, self.room)
    }
}

/// Sled-backed store holding the latest snapshot of each room.
#[derive(Clone)]
pub struct SnapshotStore {
    _db: sled::Db,
    rooms: sled::Tree,
    room: String,
    path: PathBuf,
}

impl SnapshotStore {
    /// Open (or create) the store under `<data_dir>/session` for the default room.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, StorageError> {
        Self::open_with_room(data_dir.as_ref().to_path_buf(), DEFAULT_ROOM.to_string())
    }

    pub fn builder<P: AsRef<Path>>(data_dir: P) -> SnapshotStoreBuilder {
        SnapshotStoreBuilder::new(data_dir)
    }

    fn open_with_room(data_dir: PathBuf, room: String) -> Result<Self, StorageError> {
        let path = data_dir.join(SESSION_DIR);
        std::fs::create_dir_all(&path)?;
        let db = sled::open(&path)?;
        let rooms = db.open_tree(TREE_ROOMS)?;
        log::debug!("Opened snapshot store at {} (room {})", path.display(), room);
        Ok(Self {
            _db: db,
            rooms,
            room,
            path,
        })
    }

    /// Handle on the same database keyed by another room.
    pub fn for_room(&self, room: &str) -> Self {
        Self {
            room: room.to_string(),
            ..self.clone()
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    /// Replace the stored snapshot and flush it to disk.
    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(snapshot)?;
        self.rooms.insert(self.room.as_bytes(), bytes)?;
        self.rooms.flush()?;
        Ok(())
    }

    /// Load the last stored snapshot, if any.
    pub fn load(&self) -> Result<Option<SessionSnapshot>, StorageError> {
        let Some(bytes) = self.rooms.get(self.room.as_bytes())? else {
            return Ok(None);
        };
        let snapshot: SessionSnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StorageError::SchemaMismatch {
                expected: SNAPSHOT_VERSION,
                found: snapshot.version,
            });
        }
        Ok(Some(snapshot))
    }

    /// Remove the stored snapshot. Returns true when one existed.
    pub fn clear(&self) -> Result<bool, StorageError> {
        let existed = self.rooms.remove(self.room.as_bytes())?.is_some();
        self.rooms.flush()?;
        Ok(existed)
    }
}

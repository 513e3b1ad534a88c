//! [`PositionStore`] – durable storage for taught named positions.
//!
//! The kernel keeps positions in memory and only touches the store on an
//! explicit save or reload.  Saves replace the whole table so a reload
//! after a save yields exactly the saved table.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use motionsvc_types::{MotionError, PositionTable};
use tracing::debug;

/// Backing store for the device → position-name → coordinates table.
pub trait PositionStore: Send + Sync {
    /// Read the persisted table.  `Ok(None)` means nothing has been saved
    /// yet.
    fn load(&self) -> Result<Option<PositionTable>, MotionError>;

    /// Replace the persisted table.
    fn save(&self, table: &PositionTable) -> Result<(), MotionError>;
}

// ────────────────────────────────────────────────────────────────────────────
// JSON file
// ────────────────────────────────────────────────────────────────────────────

/// Pretty-printed JSON file, written via a sibling temp file and a rename so
/// a crash mid-save leaves the previous table intact.
#[derive(Debug, Clone)]
pub struct JsonPositionStore {
    path: PathBuf,
}

impl JsonPositionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PositionStore for JsonPositionStore {
    fn load(&self) -> Result<Option<PositionTable>, MotionError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            MotionError::Persistence(format!("read {}: {e}", self.path.display()))
        })?;
        let table = serde_json::from_str(&text).map_err(|e| {
            MotionError::Persistence(format!("parse {}: {e}", self.path.display()))
        })?;
        Ok(Some(table))
    }

    fn save(&self, table: &PositionTable) -> Result<(), MotionError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                MotionError::Persistence(format!("create {}: {e}", parent.display()))
            })?;
        }
        let text = serde_json::to_string_pretty(table)
            .map_err(|e| MotionError::Persistence(format!("serialize positions: {e}")))?;

        let temp = self.temp_path();
        std::fs::write(&temp, text)
            .map_err(|e| MotionError::Persistence(format!("write {}: {e}", temp.display())))?;
        std::fs::rename(&temp, &self.path).map_err(|e| {
            MotionError::Persistence(format!("replace {}: {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), devices = table.len(), "positions written");
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory
// ────────────────────────────────────────────────────────────────────────────

/// Process-local store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryPositionStore {
    table: Mutex<Option<PositionTable>>,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `table`, as if it had been saved.
    pub fn with_table(table: PositionTable) -> Self {
        Self {
            table: Mutex::new(Some(table)),
        }
    }
}

impl PositionStore for MemoryPositionStore {
    fn load(&self) -> Result<Option<PositionTable>, MotionError> {
        Ok(self.table.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, table: &PositionTable) -> Result<(), MotionError> {
        *self.table.lock().unwrap_or_else(|e| e.into_inner()) = Some(table.clone());
        Ok(())
    }
}

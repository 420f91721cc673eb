//! Durable engine snapshots for crash recovery
//!
//! A snapshot is written after every committed transition:
//! - reservation approved (position PENDING)
//! - buy acknowledged or failed
//! - sell acknowledged, or exit reverted
//! - engine shutdown
//!
//! It is only ever read back by the startup reconciliation pass.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::Position;
use crate::error::{DeployError, Result};
use crate::ledger::LedgerSnapshot;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub version: u32,
    pub taken_at: DateTime<Utc>,
    pub ledger: LedgerSnapshot,
    pub positions: Vec<Position>,
}

impl EngineSnapshot {
    pub fn new(ledger: LedgerSnapshot, positions: Vec<Position>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            taken_at: Utc::now(),
            ledger,
            positions,
        }
    }

    fn check_version(self) -> Result<Self> {
        if self.version != SNAPSHOT_VERSION {
            return Err(DeployError::Validation(format!(
                "unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            )));
        }
        Ok(self)
    }
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, snapshot: &EngineSnapshot) -> Result<()>;

    /// Latest snapshot, or `None` on first start
    async fn load(&self) -> Result<Option<EngineSnapshot>>;
}

/// JSON file, replaced atomically through a temp file and rename
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &EngineSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(
            path = %self.path.display(),
            positions = snapshot.positions.len(),
            "Snapshot written"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<EngineSnapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No snapshot found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot: EngineSnapshot = serde_json::from_slice(&bytes)?;
        snapshot.check_version().map(Some)
    }
}

/// In-memory store for tests and paper runs without persistence
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    latest: RwLock<Option<EngineSnapshot>>,
    saves: RwLock<u64>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save_count(&self) -> u64 {
        *self.saves.read().await
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &EngineSnapshot) -> Result<()> {
        *self.latest.write().await = Some(snapshot.clone());
        *self.saves.write().await += 1;
        Ok(())
    }

    async fn load(&self) -> Result<Option<EngineSnapshot>> {
        match self.latest.read().await.clone() {
            Some(snapshot) => snapshot.check_version().map(Some),
            None => Ok(None),
        }
    }
}

//! Persistence for crash recovery
//!
//! Versioned engine snapshots (ledger + live positions) behind a store trait.

pub mod snapshot;

pub use snapshot::{
    EngineSnapshot, FileSnapshotStore, MemorySnapshotStore, SnapshotStore, SNAPSHOT_VERSION,
};

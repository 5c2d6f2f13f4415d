pub mod models;
pub mod snapshot_store;

pub use snapshot_store::SnapshotStore;

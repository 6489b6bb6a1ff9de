pub mod blob;
pub mod scheduler;

pub use blob::{BlobStore, FsBlobStore};
pub use scheduler::SnapshotScheduler;

//! Field performance console: transmission workflow, grading, credential
//! registry and replicated key-value persistence for field technicians and
//! their reviewers.

pub mod auth;
pub mod console;
pub mod dashboard;
pub mod db;
pub mod directory;
pub mod error;
pub mod grading;
pub mod models;
pub mod report;
pub mod storage;
pub mod sync;
pub mod telemetry;
pub mod workflow;

pub use console::{Console, Slice};
pub use error::{AuthError, ImportError, PolicyError, StoreError};
pub use storage::{MemoryStorage, Storage, StorageEvent, DEFAULT_NAMESPACE};
pub use sync::Replica;

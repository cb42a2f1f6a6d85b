//! Offline-first sync engine.
//!
//! A pass pulls remote changes, pairs them with locally modified entries,
//! resolves each pair and pushes or applies the result. Entries changed on
//! both sides are flagged for a user decision instead of being overwritten.

mod coordinator;
mod error;
mod http;
pub mod memory;
mod remote;
mod resolver;
mod scheduler;
mod tracker;

pub use coordinator::{RecordFailure, SyncCoordinator, SyncOutcome, SyncReport, SyncTimeouts};
pub use error::{RemoteError, RemoteResult, SyncError, SyncResult};
pub use http::HttpRemoteClient;
pub use remote::{RemoteClient, RemoteRecord};
pub use resolver::{resolve, Decision};
pub use scheduler::{Backoff, NetworkState, SchedulerHandle, SyncScheduler};
pub use tracker::SyncTracker;

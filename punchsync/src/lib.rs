//! # punchsync
//!
//! Keeps attendance records in step with a fleet of networked punch-clock
//! terminals.
//!
//! ## Features
//!
//! - One long-lived TCP link per terminal, reconnected by periodic sweeps
//! - Line-oriented punch decoding that survives split reads
//! - Serialized per-(employee, day) reconciliation with overtime
//! - Pluggable device, employee and attendance collaborators
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use punchsync::{
//!     InMemoryAttendanceStore, InMemoryEmployeeDirectory, Reconciler, StaticDeviceDirectory,
//!     SyncCoordinator,
//! };
//! use punchsync_types::{DeviceDescriptor, Employee};
//!
//! #[tokio::main]
//! async fn main() -> punchsync::Result<()> {
//!     let employees: InMemoryEmployeeDirectory =
//!         [("U7", Employee::new("emp-42"))].into_iter().collect();
//!     let store = Arc::new(InMemoryAttendanceStore::new());
//!     let reconciler = Arc::new(Reconciler::new(Arc::new(employees), store.clone()));
//!
//!     let devices = StaticDeviceDirectory::new(vec![DeviceDescriptor::new("D1", "10.0.0.21", 4370)]);
//!     let coordinator = SyncCoordinator::new(Arc::new(devices), reconciler);
//!
//!     coordinator.start().await?;
//!     coordinator.manual_sync("D1").await;
//!     println!("{:?}", coordinator.status());
//!     coordinator.stop().await;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod link;
pub mod reconciler;
pub mod registry;
pub mod stats;

// Re-exports
pub use config::{CoordinatorOptions, SyncConfig, SyncSettings};
pub use coordinator::{FleetStatus, SyncCoordinator};
pub use directory::{
    AttendanceStore, DeviceDirectory, EmployeeDirectory, InMemoryAttendanceStore,
    InMemoryEmployeeDirectory, StaticDeviceDirectory,
};
pub use error::{Error, Result};
pub use link::DeviceLink;
pub use reconciler::{Anomaly, PunchOutcome, Reconciler};
pub use registry::{LinkHandle, LinkRegistry};
pub use stats::{IngestSnapshot, IngestStats};

// Re-export protocol and domain types
pub use punchsync_core::{Command, ConnectionState};
pub use punchsync_types::{
    AttendanceRecord, DeviceDescriptor, Employee, EmployeeId, Hours, PunchEvent,
};

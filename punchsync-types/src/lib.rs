//! Type definitions for punchsync

pub mod attendance;
pub mod device;
pub mod error;
pub mod hours;
pub mod punch;

pub use attendance::{AttendanceRecord, AttendanceStatus, Employee, EmployeeId};
pub use device::DeviceDescriptor;
pub use error::{Error, Result};
pub use hours::Hours;
pub use punch::{DeviceTimestamp, Direction, PunchEvent};

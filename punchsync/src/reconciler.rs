//! Attendance reconciliation
//!
//! Merges punch events into the (employee, day) attendance record.
//!
//! # Rules
//!
//! ```text
//! in  + no record                 -> create, punch-in set, present
//! in  + record open (in, no out)  -> DuplicatePunchIn, unchanged
//! in  + anything else             -> punch-in set, present, interval reopened
//! out + no record / no punch-in   -> MissingPunchIn, unchanged
//! out + punch-in set              -> punch-out set, hours recomputed
//! ```
//!
//! Load, modify and upsert for one key run under that key's lock, so punches
//! for the same employee and day arriving from different devices never
//! interleave.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use punchsync_types::{AttendanceRecord, Direction, EmployeeId, PunchEvent};

use crate::directory::{AttendanceStore, EmployeeDirectory};
use crate::error::Result;

/// Number of lock stripes guarding (employee, day) keys
const LOCK_STRIPES: usize = 64;

/// Data-quality condition detected while applying a punch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    /// Punch-out precedes punch-in; hours were stored negative
    NegativeWorkingHours,
}

/// Result of applying one punch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PunchOutcome {
    /// Record created or updated and persisted
    Applied {
        record: AttendanceRecord,
        anomaly: Option<Anomaly>,
    },

    /// Employee already punched in and not out
    DuplicatePunchIn,

    /// Punch-out with nothing to pair against
    MissingPunchIn,

    /// Device user id not in the employee directory
    UnknownEmployee,
}

impl PunchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::DuplicatePunchIn => "duplicate_punch_in",
            Self::MissingPunchIn => "missing_punch_in",
            Self::UnknownEmployee => "unknown_employee",
        }
    }
}

impl fmt::Display for PunchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Striped async locks keyed by (employee, day)
struct KeyedLocks {
    stripes: Vec<Mutex<()>>,
}

impl KeyedLocks {
    fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe(&self, employee_id: &EmployeeId, date: NaiveDate) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        (employee_id, date).hash(&mut hasher);
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        &self.stripes[index]
    }
}

/// Applies punches to attendance records
pub struct Reconciler {
    employees: Arc<dyn EmployeeDirectory>,
    store: Arc<dyn AttendanceStore>,
    locks: KeyedLocks,
}

impl Reconciler {
    pub fn new(employees: Arc<dyn EmployeeDirectory>, store: Arc<dyn AttendanceStore>) -> Self {
        Self {
            employees,
            store,
            locks: KeyedLocks::new(LOCK_STRIPES),
        }
    }

    /// Apply one punch event
    ///
    /// Domain outcomes (`DuplicatePunchIn`, `MissingPunchIn`,
    /// `UnknownEmployee`) are terminal for the punch and never an `Err`.
    /// `Err` only reports a failing directory or store.
    pub async fn apply_punch(&self, event: &PunchEvent) -> Result<PunchOutcome> {
        let Some(employee) = self
            .employees
            .find_by_device_user_id(&event.device_user_id)
            .await?
        else {
            warn!(
                "Discarding {}: user {} is not in the employee directory",
                event, event.device_user_id
            );
            return Ok(PunchOutcome::UnknownEmployee);
        };

        let date = event.timestamp.date();
        let _guard = self.locks.stripe(&employee.id, date).lock().await;

        let existing = self.store.get(&employee.id, date).await?;

        match event.direction {
            Direction::In => {
                if existing.as_ref().is_some_and(AttendanceRecord::is_open) {
                    debug!("Ignoring {}: {} already punched in on {}", event, employee.id, date);
                    return Ok(PunchOutcome::DuplicatePunchIn);
                }

                let mut record =
                    existing.unwrap_or_else(|| AttendanceRecord::new(employee.id.clone(), date));
                record.record_punch_in(event.timestamp);
                self.store.upsert(record.clone()).await?;

                debug!("Applied {} -> {}", event, record);
                Ok(PunchOutcome::Applied {
                    record,
                    anomaly: None,
                })
            }
            Direction::Out => {
                let Some(mut record) = existing else {
                    warn!(
                        "Discarding {}: no attendance record for {} on {}",
                        event, employee.id, date
                    );
                    return Ok(PunchOutcome::MissingPunchIn);
                };

                if !record.record_punch_out(event.timestamp) {
                    warn!("Discarding {}: {} has no punch-in on {}", event, employee.id, date);
                    return Ok(PunchOutcome::MissingPunchIn);
                }

                let anomaly = record
                    .has_negative_hours()
                    .then_some(Anomaly::NegativeWorkingHours);
                if anomaly.is_some() {
                    warn!(
                        "Punch-out precedes punch-in for {} on {}: storing {} working hours",
                        employee.id, date, record.working_hours
                    );
                }

                self.store.upsert(record.clone()).await?;

                info!(
                    "{} worked {} h ({} overtime) on {}",
                    employee.id, record.working_hours, record.overtime_hours, date
                );
                Ok(PunchOutcome::Applied { record, anomaly })
            }
        }
    }
}

//! Daily attendance records

use std::fmt;

use chrono::NaiveDate;

use crate::hours::Hours;
use crate::punch::DeviceTimestamp;

/// Regular working day length; time beyond it is overtime
pub const REGULAR_DAY: Hours = Hours::from_whole(8);

/// Employee reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmployeeId(pub String);

impl EmployeeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Employee as known to the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employee {
    pub id: EmployeeId,
}

impl Employee {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: EmployeeId::new(id),
        }
    }
}

/// Attendance status for a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttendanceStatus {
    Present,
    Absent,
    OnLeave,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::OnLeave => "on_leave",
        }
    }
}

/// One record per (employee, calendar day)
///
/// `working_hours` and `overtime_hours` are derived from the punch pair and
/// stay zero while either punch is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    pub punch_in: Option<DeviceTimestamp>,
    pub punch_out: Option<DeviceTimestamp>,
    pub working_hours: Hours,
    pub overtime_hours: Hours,
    pub status: AttendanceStatus,
}

impl AttendanceRecord {
    /// Empty record for a day, before any punch
    pub fn new(employee_id: EmployeeId, date: NaiveDate) -> Self {
        Self {
            employee_id,
            date,
            punch_in: None,
            punch_out: None,
            working_hours: Hours::ZERO,
            overtime_hours: Hours::ZERO,
            status: AttendanceStatus::Absent,
        }
    }

    /// Punched in and not yet out
    pub fn is_open(&self) -> bool {
        self.punch_in.is_some() && self.punch_out.is_none()
    }

    /// Start a new interval at `at`
    pub fn record_punch_in(&mut self, at: DeviceTimestamp) {
        self.punch_in = Some(at);
        self.punch_out = None;
        self.working_hours = Hours::ZERO;
        self.overtime_hours = Hours::ZERO;
        self.status = AttendanceStatus::Present;
    }

    /// Close the interval at `at` and recompute derived hours
    ///
    /// Returns `false` without touching the record when there is no
    /// punch-in to pair with.
    pub fn record_punch_out(&mut self, at: DeviceTimestamp) -> bool {
        let Some(punch_in) = self.punch_in else {
            return false;
        };

        let worked = Hours::from_duration(at.elapsed_since(&punch_in));
        self.punch_out = Some(at);
        self.working_hours = worked;
        self.overtime_hours = (worked - REGULAR_DAY).max(Hours::ZERO);
        true
    }

    /// Punch-out precedes punch-in
    pub fn has_negative_hours(&self) -> bool {
        self.working_hours.is_negative()
    }
}

impl fmt::Display for AttendanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |ts: &Option<DeviceTimestamp>| {
            ts.map(|ts| ts.to_string()).unwrap_or_else(|| "-".to_string())
        };
        write!(
            f,
            "Attendance[{} {} in={} out={} worked={} overtime={} {}]",
            self.employee_id,
            self.date,
            show(&self.punch_in),
            show(&self.punch_out),
            self.working_hours,
            self.overtime_hours,
            self.status.as_str()
        )
    }
}

//! Ingestion counters

use std::sync::atomic::{AtomicU64, Ordering};

use crate::reconciler::PunchOutcome;

/// Running totals of what happened to received punches
#[derive(Debug, Default)]
pub struct IngestStats {
    applied: AtomicU64,
    duplicate_punch_in: AtomicU64,
    missing_punch_in: AtomicU64,
    unknown_employee: AtomicU64,
    anomalies: AtomicU64,
    failed: AtomicU64,
    malformed_records: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSnapshot {
    pub applied: u64,
    pub duplicate_punch_in: u64,
    pub missing_punch_in: u64,
    pub unknown_employee: u64,
    /// Applied punches that produced negative working hours
    pub anomalies: u64,
    /// Punches lost to a failing directory or store
    pub failed: u64,
    pub malformed_records: u64,
}

impl IngestSnapshot {
    /// Punches that reached the reconciler
    pub fn total(&self) -> u64 {
        self.applied
            + self.duplicate_punch_in
            + self.missing_punch_in
            + self.unknown_employee
            + self.failed
    }
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &PunchOutcome) {
        let counter = match outcome {
            PunchOutcome::Applied { anomaly, .. } => {
                if anomaly.is_some() {
                    self.anomalies.fetch_add(1, Ordering::Relaxed);
                }
                &self.applied
            }
            PunchOutcome::DuplicatePunchIn => &self.duplicate_punch_in,
            PunchOutcome::MissingPunchIn => &self.missing_punch_in,
            PunchOutcome::UnknownEmployee => &self.unknown_employee,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self, count: usize) {
        if count > 0 {
            self.malformed_records.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            duplicate_punch_in: self.duplicate_punch_in.load(Ordering::Relaxed),
            missing_punch_in: self.missing_punch_in.load(Ordering::Relaxed),
            unknown_employee: self.unknown_employee.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            malformed_records: self.malformed_records.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::Anomaly;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use punchsync_types::{AttendanceRecord, EmployeeId};

    #[test]
    fn test_record_outcomes() {
        let stats = IngestStats::new();
        let record = AttendanceRecord::new(
            EmployeeId::new("emp-42"),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        );

        stats.record(&PunchOutcome::Applied { record: record.clone(), anomaly: None });
        stats.record(&PunchOutcome::Applied {
            record,
            anomaly: Some(Anomaly::NegativeWorkingHours),
        });
        stats.record(&PunchOutcome::DuplicatePunchIn);
        stats.record(&PunchOutcome::UnknownEmployee);
        stats.record_failure();
        stats.record_malformed(3);
        stats.record_malformed(0);

        let snapshot = stats.snapshot();
        assert_eq!(
            snapshot,
            IngestSnapshot {
                applied: 2,
                duplicate_punch_in: 1,
                missing_punch_in: 0,
                unknown_employee: 1,
                anomalies: 1,
                failed: 1,
                malformed_records: 3,
            }
        );
        assert_eq!(snapshot.total(), 5);
    }
}

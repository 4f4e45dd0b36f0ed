//! External collaborators
//!
//! The engine reads device descriptors and employees from directories owned
//! by the rest of the HR system and writes attendance through a store. Only
//! the contracts live here, plus in-memory implementations used by the
//! daemon binary and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;

use punchsync_types::{AttendanceRecord, DeviceDescriptor, Employee, EmployeeId};

use crate::error::Result;

/// Source of device descriptors
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>>;
}

/// Maps device-local user ids to employees
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn find_by_device_user_id(&self, device_user_id: &str) -> Result<Option<Employee>>;
}

/// Attendance record persistence, keyed by (employee, date)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn get(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>>;

    async fn upsert(&self, record: AttendanceRecord) -> Result<()>;
}

/// Fixed device list
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceDirectory {
    devices: Vec<DeviceDescriptor>,
}

impl StaticDeviceDirectory {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self { devices }
    }
}

#[async_trait]
impl DeviceDirectory for StaticDeviceDirectory {
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(self.devices.clone())
    }
}

/// Employee directory backed by a map
#[derive(Debug, Default)]
pub struct InMemoryEmployeeDirectory {
    employees: RwLock<HashMap<String, Employee>>,
}

impl InMemoryEmployeeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a device user id to an employee
    pub fn insert(&self, device_user_id: impl Into<String>, employee: Employee) {
        self.employees.write().insert(device_user_id.into(), employee);
    }

    pub fn len(&self) -> usize {
        self.employees.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.employees.read().is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Employee)> for InMemoryEmployeeDirectory {
    fn from_iter<I: IntoIterator<Item = (K, Employee)>>(iter: I) -> Self {
        let employees = iter.into_iter().map(|(k, e)| (k.into(), e)).collect();
        Self {
            employees: RwLock::new(employees),
        }
    }
}

#[async_trait]
impl EmployeeDirectory for InMemoryEmployeeDirectory {
    async fn find_by_device_user_id(&self, device_user_id: &str) -> Result<Option<Employee>> {
        Ok(self.employees.read().get(device_user_id).cloned())
    }
}

/// Attendance store backed by a map
#[derive(Debug, Default)]
pub struct InMemoryAttendanceStore {
    records: RwLock<HashMap<(EmployeeId, NaiveDate), AttendanceRecord>>,
}

impl InMemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record, ordered by employee then date
    pub fn records(&self) -> Vec<AttendanceRecord> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| (&a.employee_id, a.date).cmp(&(&b.employee_id, b.date)));
        records
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl AttendanceStore for InMemoryAttendanceStore {
    async fn get(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>> {
        Ok(self.records.read().get(&(employee_id.clone(), date)).cloned())
    }

    async fn upsert(&self, record: AttendanceRecord) -> Result<()> {
        let key = (record.employee_id.clone(), record.date);
        self.records.write().insert(key, record);
        Ok(())
    }
}

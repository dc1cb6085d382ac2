use super::ranges::{expand, PortRange};
use crate::types::PersistenceId;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CPUS: &str = "cpus";
pub const MEM: &str = "mem";
pub const DISK: &str = "disk";
pub const PORTS: &str = "ports";

/// Role that marks a resource as unreserved.
pub const UNRESERVED_ROLE: &str = "*";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceValue {
    Scalar(f64),
    Ranges(Vec<PortRange>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationInfo {
    pub principal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub persistence_id: PersistenceId,
    pub container_path: String,
}

/// One resource fragment as offered by an agent or handed back in an
/// operation. Reservations and volumes are recognised only through the
/// `reservation` and `disk` metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub value: ResourceValue,
    pub role: String,
    #[serde(default)]
    pub reservation: Option<ReservationInfo>,
    #[serde(default)]
    pub disk: Option<DiskInfo>,
}

impl Resource {
    #[must_use]
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: ResourceValue::Scalar(value),
            role: UNRESERVED_ROLE.to_string(),
            reservation: None,
            disk: None,
        }
    }

    #[must_use]
    pub fn ports(ranges: Vec<PortRange>) -> Self {
        Self {
            name: PORTS.to_string(),
            value: ResourceValue::Ranges(ranges),
            role: UNRESERVED_ROLE.to_string(),
            reservation: None,
            disk: None,
        }
    }

    #[must_use]
    pub fn reserved_for(mut self, principal: impl Into<String>, role: impl Into<String>) -> Self {
        self.role = role.into();
        self.reservation = Some(ReservationInfo {
            principal: principal.into(),
        });
        self
    }

    #[must_use]
    pub fn with_volume(mut self, persistence_id: PersistenceId, container_path: impl Into<String>) -> Self {
        self.disk = Some(DiskInfo {
            persistence_id,
            container_path: container_path.into(),
        });
        self
    }

    #[must_use]
    pub fn without_volume(mut self) -> Self {
        self.disk = None;
        self
    }

    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        self.reservation.is_some()
    }

    #[must_use]
    pub fn is_reserved_for(&self, role: &str) -> bool {
        self.is_reserved() && self.role == role
    }

    /// A reserved disk fragment carrying a persistent volume.
    #[must_use]
    pub fn is_volume(&self) -> bool {
        self.name == DISK && self.reservation.is_some() && self.disk.is_some()
    }

    #[must_use]
    pub fn persistence_id(&self) -> Option<&PersistenceId> {
        self.disk.as_ref().map(|disk| &disk.persistence_id)
    }

    #[must_use]
    pub const fn scalar_value(&self) -> Option<f64> {
        match self.value {
            ResourceValue::Scalar(value) => Some(value),
            ResourceValue::Ranges(_) => None,
        }
    }

    #[must_use]
    pub fn port_list(&self) -> Vec<u64> {
        match &self.value {
            ResourceValue::Ranges(ranges) => expand(ranges),
            ResourceValue::Scalar(_) => Vec::new(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            ResourceValue::Scalar(value) => write!(f, "{}({})={value}", self.name, self.role)?,
            ResourceValue::Ranges(ranges) => {
                write!(f, "{}({})=", self.name, self.role)?;
                for range in ranges {
                    write!(f, "{range}")?;
                }
            }
        }
        if let Some(disk) = &self.disk {
            write!(f, " volume={}:{}", disk.persistence_id, disk.container_path)?;
        }
        Ok(())
    }
}

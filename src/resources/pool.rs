use super::ranges::{compress, select};
use super::resource::{Resource, ResourceValue, CPUS, DISK, MEM, PORTS};
use crate::types::PersistenceId;
use serde::{Deserialize, Serialize};

/// Reservation identity attached to granted fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub principal: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRequest {
    pub persistence_id: PersistenceId,
    pub container_path: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub cpus: f64,
    pub mem: f64,
    pub disk: f64,
    pub ports: usize,
    pub reservation: Option<Reservation>,
    pub volume: Option<VolumeRequest>,
}

impl ResourceRequest {
    #[must_use]
    pub const fn new(cpus: f64, mem: f64, disk: f64, ports: usize) -> Self {
        Self {
            cpus,
            mem,
            disk,
            ports,
            reservation: None,
            volume: None,
        }
    }

    #[must_use]
    pub fn reserved_by(mut self, principal: impl Into<String>, role: impl Into<String>) -> Self {
        self.reservation = Some(Reservation {
            principal: principal.into(),
            role: role.into(),
        });
        self
    }

    #[must_use]
    pub fn with_volume(
        mut self,
        persistence_id: PersistenceId,
        container_path: impl Into<String>,
    ) -> Self {
        self.volume = Some(VolumeRequest {
            persistence_id,
            container_path: container_path.into(),
        });
        self
    }

    #[must_use]
    pub fn without_volume(mut self) -> Self {
        self.volume = None;
        self
    }

    #[must_use]
    pub fn without_reservation(mut self) -> Self {
        self.reservation = None;
        self.volume = None;
        self
    }

    fn tag(&self, resource: Resource) -> Resource {
        match &self.reservation {
            Some(reservation) => {
                resource.reserved_for(reservation.principal.clone(), reservation.role.clone())
            }
            None => resource,
        }
    }
}

/// Capacity left in one half (reserved or unreserved) of an offer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourcePool {
    pub cpus: f64,
    pub mem: f64,
    pub disk: f64,
    /// Sorted and deduplicated.
    pub ports: Vec<u64>,
}

impl ResourcePool {
    #[must_use]
    pub fn new(cpus: f64, mem: f64, disk: f64, mut ports: Vec<u64>) -> Self {
        ports.sort_unstable();
        ports.dedup();
        Self {
            cpus,
            mem,
            disk,
            ports,
        }
    }

    /// Sums every fragment accepted by `filter`.
    #[must_use]
    pub fn from_resources<'a, F>(resources: impl IntoIterator<Item = &'a Resource>, filter: F) -> Self
    where
        F: Fn(&Resource) -> bool,
    {
        let (cpus, mem, disk, ports) = resources.into_iter().filter(|r| filter(r)).fold(
            (0.0_f64, 0.0_f64, 0.0_f64, Vec::new()),
            |(cpus, mem, disk, mut ports), resource| match (&resource.value, resource.name.as_str()) {
                (ResourceValue::Scalar(value), CPUS) => (cpus + value, mem, disk, ports),
                (ResourceValue::Scalar(value), MEM) => (cpus, mem + value, disk, ports),
                (ResourceValue::Scalar(value), DISK) => (cpus, mem, disk + value, ports),
                (ResourceValue::Ranges(_), PORTS) => {
                    ports.extend(resource.port_list());
                    (cpus, mem, disk, ports)
                }
                _ => (cpus, mem, disk, ports),
            },
        );
        Self::new(cpus, mem, disk, ports)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cpus <= 0.0 && self.mem <= 0.0 && self.disk <= 0.0 && self.ports.is_empty()
    }

    #[must_use]
    pub fn fits(&self, request: &ResourceRequest) -> bool {
        self.cpus >= request.cpus
            && self.mem >= request.mem
            && self.disk >= request.disk
            && self.ports.len() >= request.ports
    }

    /// Computes the residual pool and the fragments granted for `request`.
    /// Returns `None`, leaving nothing claimed, when the request does not fit.
    #[must_use]
    pub fn apply(&self, request: &ResourceRequest) -> Option<(Self, Vec<Resource>)> {
        if !self.fits(request) {
            return None;
        }

        let taken_ports = select(&self.ports, request.ports)?;
        let mut fragments = Vec::new();

        if request.cpus > 0.0 {
            fragments.push(request.tag(Resource::scalar(CPUS, request.cpus)));
        }
        if request.mem > 0.0 {
            fragments.push(request.tag(Resource::scalar(MEM, request.mem)));
        }
        if request.disk > 0.0 {
            let disk = request.tag(Resource::scalar(DISK, request.disk));
            let disk = match (&request.reservation, &request.volume) {
                (Some(_), Some(volume)) => {
                    disk.with_volume(volume.persistence_id.clone(), volume.container_path.clone())
                }
                _ => disk,
            };
            fragments.push(disk);
        }
        if !taken_ports.is_empty() {
            fragments.push(request.tag(Resource::ports(compress(&taken_ports))));
        }

        let residual = Self {
            cpus: (self.cpus - request.cpus).max(0.0),
            mem: (self.mem - request.mem).max(0.0),
            disk: (self.disk - request.disk).max(0.0),
            ports: self
                .ports
                .iter()
                .copied()
                .filter(|port| !taken_ports.contains(port))
                .collect(),
        };

        Some((residual, fragments))
    }

    /// In-place variant of [`ResourcePool::apply`].
    pub fn claim(&mut self, request: &ResourceRequest) -> Option<Vec<Resource>> {
        let (residual, fragments) = self.apply(request)?;
        *self = residual;
        Some(fragments)
    }
}

use super::operation::OfferOperation;
use super::pool::{ResourcePool, ResourceRequest};
use super::resource::{Resource, DISK, UNRESERVED_ROLE};
use crate::node::TaskInfo;
use crate::types::{AgentId, OfferId, PersistenceId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// A resource offer made by one cluster agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub agent_id: AgentId,
    pub hostname: String,
    pub resources: Vec<Resource>,
}

impl Offer {
    #[must_use]
    pub fn new(
        id: OfferId,
        agent_id: AgentId,
        hostname: impl Into<String>,
        resources: Vec<Resource>,
    ) -> Self {
        Self {
            id,
            agent_id,
            hostname: hostname.into(),
            resources,
        }
    }
}

/// Working view of one offer during a matching pass: what is left in the
/// reserved and unreserved halves, and the operations compiled so far.
#[derive(Debug, Clone)]
pub struct OfferPlan {
    offer: Offer,
    role: String,
    persistence_ids: Vec<PersistenceId>,
    reserved: ResourcePool,
    unreserved: ResourcePool,
    to_launch: Vec<TaskInfo>,
    to_destroy: Vec<Resource>,
    to_unreserve: Vec<Resource>,
    to_reserve: Vec<Resource>,
    to_create: Vec<Resource>,
}

impl OfferPlan {
    /// Splits `offer` into the reservations held by `role` and the
    /// unreserved remainder. Other roles' reservations belong to neither half.
    #[must_use]
    pub fn new(offer: Offer, role: &str) -> Self {
        let reserved =
            ResourcePool::from_resources(&offer.resources, |resource| resource.is_reserved_for(role));
        let unreserved = ResourcePool::from_resources(&offer.resources, |resource| {
            !resource.is_reserved() && resource.role == UNRESERVED_ROLE
        });
        let persistence_ids = offer
            .resources
            .iter()
            .filter(|resource| resource.is_volume() && resource.is_reserved_for(role))
            .filter_map(Resource::persistence_id)
            .cloned()
            .collect();

        Self {
            offer,
            role: role.to_string(),
            persistence_ids,
            reserved,
            unreserved,
            to_launch: Vec::new(),
            to_destroy: Vec::new(),
            to_unreserve: Vec::new(),
            to_reserve: Vec::new(),
            to_create: Vec::new(),
        }
    }

    #[must_use]
    pub const fn offer(&self) -> &Offer {
        &self.offer
    }

    #[must_use]
    pub const fn id(&self) -> &OfferId {
        &self.offer.id
    }

    #[must_use]
    pub const fn agent_id(&self) -> &AgentId {
        &self.offer.agent_id
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.offer.hostname
    }

    #[must_use]
    pub const fn reserved(&self) -> &ResourcePool {
        &self.reserved
    }

    #[must_use]
    pub const fn unreserved(&self) -> &ResourcePool {
        &self.unreserved
    }

    #[must_use]
    pub fn persistence_ids(&self) -> &[PersistenceId] {
        &self.persistence_ids
    }

    #[must_use]
    pub fn has_reservations(&self) -> bool {
        !self.reserved.is_empty()
    }

    #[must_use]
    pub fn has_volumes(&self) -> bool {
        !self.persistence_ids.is_empty()
    }

    #[must_use]
    pub fn has_persistence_id(&self, persistence_id: &PersistenceId) -> bool {
        self.persistence_ids.contains(persistence_id)
    }

    #[must_use]
    pub fn launched(&self) -> usize {
        self.to_launch.len()
    }

    #[must_use]
    pub fn can_fit_unreserved(&self, request: &ResourceRequest) -> bool {
        self.unreserved.fits(request)
    }

    pub fn apply_reserved(&mut self, request: &ResourceRequest) -> Option<Vec<Resource>> {
        self.reserved.claim(request)
    }

    pub fn apply_unreserved(&mut self, request: &ResourceRequest) -> Option<Vec<Resource>> {
        self.unreserved.claim(&request.clone().without_reservation())
    }

    /// Claims unreserved capacity and records it as a reservation, plus a
    /// volume creation on the reserved disk when the request carries one.
    pub fn make_reservation(&mut self, request: &ResourceRequest) -> bool {
        if request.reservation.is_none() {
            return false;
        }
        let Some(fragments) = self.unreserved.claim(&request.clone().without_volume()) else {
            return false;
        };

        if let Some(volume) = &request.volume {
            self.to_create.extend(
                fragments
                    .iter()
                    .filter(|fragment| fragment.name == DISK)
                    .map(|disk| {
                        disk.clone()
                            .with_volume(volume.persistence_id.clone(), volume.container_path.clone())
                    }),
            );
        }
        self.to_reserve.extend(fragments);
        true
    }

    pub fn push_launch(&mut self, task: TaskInfo) {
        self.to_launch.push(task);
    }

    /// Releases reservations and volumes nobody launched against.
    pub fn release_unused(&mut self) {
        if !self.to_launch.is_empty() {
            return;
        }

        if self.has_reservations() {
            warn!(
                "Offer {} has reserved resources but no node can use them, unreserving",
                self.offer.id
            );
            self.to_unreserve.extend(
                self.offer
                    .resources
                    .iter()
                    .filter(|resource| resource.is_reserved_for(&self.role))
                    .cloned()
                    .map(Resource::without_volume),
            );
        }

        if self.has_volumes() {
            warn!(
                "Offer {} has persistent volumes but no node can use them, destroying",
                self.offer.id
            );
            self.to_destroy.extend(
                self.offer
                    .resources
                    .iter()
                    .filter(|resource| resource.is_volume() && resource.is_reserved_for(&self.role))
                    .cloned(),
            );
        }
    }

    /// Operations in submission order: launch, destroy, unreserve, reserve, create.
    #[must_use]
    pub fn operations(&self) -> Vec<OfferOperation> {
        [
            (!self.to_launch.is_empty()).then(|| OfferOperation::Launch(self.to_launch.clone())),
            (!self.to_destroy.is_empty()).then(|| OfferOperation::Destroy(self.to_destroy.clone())),
            (!self.to_unreserve.is_empty())
                .then(|| OfferOperation::Unreserve(self.to_unreserve.clone())),
            (!self.to_reserve.is_empty()).then(|| OfferOperation::Reserve(self.to_reserve.clone())),
            (!self.to_create.is_empty()).then(|| OfferOperation::Create(self.to_create.clone())),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl fmt::Display for OfferPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "offer {} reserved(cpus={}, mem={}, disk={}, ports={}, volumes={}) unreserved(cpus={}, mem={}, disk={}, ports={})",
            self.offer.id,
            self.reserved.cpus,
            self.reserved.mem,
            self.reserved.disk,
            self.reserved.ports.len(),
            self.persistence_ids.len(),
            self.unreserved.cpus,
            self.unreserved.mem,
            self.unreserved.disk,
            self.unreserved.ports.len()
        )
    }
}

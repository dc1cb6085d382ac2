#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! The persisted scheduler aggregate and its stores.

mod memory;
mod postgres;

pub use memory::MemoryStateStore;
pub use postgres::{PgStateStore, SCHEMA_STATEMENTS};

use crate::cluster::Cluster;
use crate::error::{OrchestratorError, Result};
use crate::types::{FrameworkId, PersistenceId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// Where a task id points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskLocation {
    Live {
        cluster: String,
        persistence_id: PersistenceId,
    },
    Graveyard {
        cluster: String,
    },
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerRuntimeState {
    framework_id: Option<FrameworkId>,
    clusters: BTreeMap<String, Cluster>,
    graveyard: Vec<Cluster>,
    #[serde(default)]
    last_operator_request: i64,
}

impl SchedulerRuntimeState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn framework_id(&self) -> Option<&FrameworkId> {
        self.framework_id.as_ref()
    }

    /// Records the id assigned by the cluster master. Returns whether the state
    /// changed.
    ///
    /// # Errors
    /// Returns an invariant violation if a different id was already recorded.
    pub fn set_framework_id(&mut self, framework_id: FrameworkId) -> Result<bool> {
        match &self.framework_id {
            Some(existing) if existing == &framework_id => Ok(false),
            Some(existing) => Err(OrchestratorError::InvariantViolation(format!(
                "Registered as {framework_id} but state belongs to {existing}"
            ))),
            None => {
                info!("Recording framework id {}", framework_id);
                self.framework_id = Some(framework_id);
                Ok(true)
            }
        }
    }

    /// Id of the last operator request applied to this state.
    #[must_use]
    pub const fn last_operator_request(&self) -> i64 {
        self.last_operator_request
    }

    pub fn acknowledge_operator_request(&mut self, id: i64) {
        self.last_operator_request = self.last_operator_request.max(id);
    }

    #[must_use]
    pub const fn clusters(&self) -> &BTreeMap<String, Cluster> {
        &self.clusters
    }

    pub fn clusters_mut(&mut self) -> impl Iterator<Item = &mut Cluster> {
        self.clusters.values_mut()
    }

    #[must_use]
    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.get(name)
    }

    pub fn cluster_mut(&mut self, name: &str) -> Option<&mut Cluster> {
        self.clusters.get_mut(name)
    }

    #[must_use]
    pub fn graveyard(&self) -> &[Cluster] {
        &self.graveyard
    }

    /// Names stay taken while the cluster sits in the graveyard: node and
    /// task ids derive from the cluster name, so a reused name would route
    /// late updates for buried tasks to the new nodes.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::Conflict`] if the name is taken.
    pub fn add_cluster(&mut self, name: &str) -> Result<&mut Cluster> {
        if self.clusters.contains_key(name) {
            return Err(OrchestratorError::Conflict(format!(
                "Cluster {name} already exists"
            )));
        }
        if self.is_buried(name) {
            return Err(OrchestratorError::Conflict(format!(
                "Cluster {name} was removed and its name cannot be reused"
            )));
        }
        info!("Created cluster {}", name);
        Ok(self
            .clusters
            .entry(name.to_string())
            .or_insert_with(|| Cluster::new(name)))
    }

    #[must_use]
    pub fn is_buried(&self, name: &str) -> bool {
        self.graveyard.iter().any(|cluster| cluster.name() == name)
    }

    /// Moves a cluster, with its node records, into the graveyard.
    pub fn bury_cluster(&mut self, name: &str) -> bool {
        let Some(cluster) = self.clusters.remove(name) else {
            return false;
        };
        info!(
            "Cluster {} moved to graveyard with {} nodes",
            name,
            cluster.nodes().len()
        );
        self.graveyard.push(cluster);
        true
    }

    /// Looks a task up in live clusters first, then in the graveyard.
    #[must_use]
    pub fn locate_task(&self, task_id: &TaskId) -> TaskLocation {
        let live = self.clusters.values().find_map(|cluster| {
            cluster
                .node_named(task_id.node_name())
                .map(|node| (cluster.name().to_string(), node.persistence_id().clone()))
        });
        if let Some((cluster, persistence_id)) = live {
            return TaskLocation::Live {
                cluster,
                persistence_id,
            };
        }

        self.graveyard
            .iter()
            .find(|cluster| cluster.node_named(task_id.node_name()).is_some())
            .map_or(TaskLocation::Unknown, |cluster| TaskLocation::Graveyard {
                cluster: cluster.name().to_string(),
            })
    }

    /// # Errors
    /// Returns an error if a node is inconsistent, a persistence id is
    /// claimed by two live nodes, or a live cluster shares its name with a
    /// buried one.
    pub fn validate_invariants(&self) -> Result<()> {
        if let Some(name) = self.clusters.keys().find(|name| self.is_buried(name)) {
            return Err(OrchestratorError::InvariantViolation(format!(
                "Cluster {name} is both live and in the graveyard"
            )));
        }
        let mut seen = HashSet::new();
        for node in self.clusters.values().flat_map(|cluster| cluster.nodes().values()) {
            node.validate_invariants()?;
            if !seen.insert(node.persistence_id()) {
                return Err(OrchestratorError::InvariantViolation(format!(
                    "Persistence id {} is used by more than one node",
                    node.persistence_id()
                )));
            }
        }
        Ok(())
    }

    /// # Errors
    /// Returns an error if the state cannot be serialized.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// # Errors
    /// Returns an error if the payload is malformed or holds unknown values.
    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::node::{DestinationState, LogicalNode, NodeTemplate, TaskData};
use crate::types::{PersistenceId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    name: String,
    nodes: BTreeMap<PersistenceId, LogicalNode>,
    database_config: String,
    advanced_config: String,
    is_killed: bool,
    is_restarting: bool,
    restart_generation: u64,
    next_simple_id: u64,
}

impl Cluster {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: BTreeMap::new(),
            database_config: String::new(),
            advanced_config: String::new(),
            is_killed: false,
            is_restarting: false,
            restart_generation: 0,
            next_simple_id: 1,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn nodes(&self) -> &BTreeMap<PersistenceId, LogicalNode> {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut LogicalNode> {
        self.nodes.values_mut()
    }

    #[must_use]
    pub const fn is_killed(&self) -> bool {
        self.is_killed
    }

    #[must_use]
    pub const fn is_restarting(&self) -> bool {
        self.is_restarting
    }

    #[must_use]
    pub const fn restart_generation(&self) -> u64 {
        self.restart_generation
    }

    #[must_use]
    pub fn database_config(&self) -> &str {
        &self.database_config
    }

    #[must_use]
    pub fn advanced_config(&self) -> &str {
        &self.advanced_config
    }

    pub fn set_database_config(&mut self, config: impl Into<String>) {
        self.database_config = config.into();
    }

    pub fn set_advanced_config(&mut self, config: impl Into<String>) {
        self.advanced_config = config.into();
    }

    #[must_use]
    pub fn node_named(&self, node_name: &str) -> Option<&LogicalNode> {
        self.nodes.values().find(|node| node.name() == node_name)
    }

    pub fn node_named_mut(&mut self, node_name: &str) -> Option<&mut LogicalNode> {
        self.nodes.values_mut().find(|node| node.name() == node_name)
    }

    pub fn node_mut(&mut self, persistence_id: &PersistenceId) -> Option<&mut LogicalNode> {
        self.nodes.get_mut(persistence_id)
    }

    /// Adds a node wanting to be started. Simple ids are never reused.
    pub fn create_node(&mut self, template: NodeTemplate) -> &LogicalNode {
        let node = LogicalNode::new(
            template,
            self.name.clone(),
            self.next_simple_id,
            self.restart_generation,
        );
        self.next_simple_id = self.next_simple_id.saturating_add(1);
        info!("Created node {} in cluster {}", node.name(), self.name);
        self.nodes
            .entry(node.persistence_id().clone())
            .or_insert(node)
    }

    pub fn remove_node(&mut self, persistence_id: &PersistenceId) -> Option<LogicalNode> {
        let removed = self.nodes.remove(persistence_id);
        if let Some(node) = &removed {
            info!("Removed node {} from cluster {}", node.name(), self.name);
        }
        removed
    }

    /// Marks every node for shutdown; the cluster goes to the graveyard once
    /// [`Cluster::can_be_removed`] holds.
    pub fn request_removal(&mut self) {
        self.is_killed = true;
        self.nodes.values_mut().for_each(LogicalNode::request_shutdown);
    }

    #[must_use]
    pub fn can_be_removed(&self) -> bool {
        self.is_killed && self.nodes.values().all(LogicalNode::can_be_removed)
    }

    /// Starts a rolling restart. A restart already in progress is left alone.
    pub fn rolling_restart(&mut self) -> bool {
        if self.is_restarting {
            return false;
        }
        self.is_restarting = true;
        self.restart_generation = self.restart_generation.saturating_add(1);
        info!(
            "Cluster {} rolling restart to generation {}",
            self.name, self.restart_generation
        );
        true
    }

    /// Advances a rolling restart by at most one node. Returns the persistence
    /// id of the node that was just marked for restart, and whether anything
    /// changed.
    pub fn next_restart(&mut self) -> (Option<PersistenceId>, bool) {
        if !self.is_restarting {
            return (None, false);
        }
        let generation = self.restart_generation;

        let in_progress = self.nodes.values().any(|node| {
            node.destination_state() == DestinationState::Restarting
                || node.is_restarting(generation)
        });
        if in_progress {
            return (None, false);
        }

        let next = self.nodes.values_mut().find(|node| {
            node.destination_state().wants_running() && !node.has_restarted(generation)
        });
        if let Some(node) = next {
            info!("Restarting node {} (generation {})", node.name(), generation);
            node.restart(generation);
            return (Some(node.persistence_id().clone()), true);
        }

        info!("Cluster {} finished rolling restart", self.name);
        self.is_restarting = false;
        (None, true)
    }

    /// Nodes to send kills for and nodes ready to be deleted.
    #[must_use]
    pub fn nodes_to_kill_or_remove(&self) -> (Vec<PersistenceId>, Vec<PersistenceId>) {
        let kill = self
            .nodes
            .values()
            .filter(|node| node.can_be_killed())
            .map(|node| node.persistence_id().clone())
            .collect();
        let remove = if self.is_killed {
            Vec::new()
        } else {
            self.nodes
                .values()
                .filter(|node| node.can_be_removed())
                .map(|node| node.persistence_id().clone())
                .collect()
        };
        (kill, remove)
    }

    /// Statuses to re-assert for unreconciled launched nodes that were not
    /// asked about within `interval`. Marks them as asked.
    pub fn tasks_to_reconcile(&mut self, interval: Duration, now: Instant) -> Vec<TaskStatus> {
        self.nodes
            .values_mut()
            .filter(|node| node.needs_to_be_reconciled() && !node.asked_within(interval, now))
            .filter_map(|node| {
                let status = node.reconcile_status()?;
                node.mark_asked(now);
                Some(status)
            })
            .collect()
    }

    /// Launch payloads of started peers, excluding `node_name`.
    #[must_use]
    pub fn joinable_peers(&self, node_name: &str) -> Vec<TaskData> {
        self.nodes
            .values()
            .filter(|node| node.can_be_joined() && node.name() != node_name)
            .filter_map(|node| node.task_data().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests;

use super::control_loop::SchedulerCore;
use super::SchedulerPorts;
use crate::cluster::Cluster;
use crate::error::{OrchestratorError, Result};
use crate::node::{CurrentState, DestinationState, LogicalNode, NodeTemplate};
use crate::state::SchedulerRuntimeState;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub persistence_id: String,
    pub current_state: CurrentState,
    pub destination_state: DestinationState,
    pub generation: u64,
    pub hostname: Option<String>,
}

impl From<&LogicalNode> for NodeSummary {
    fn from(node: &LogicalNode) -> Self {
        Self {
            name: node.name(),
            persistence_id: node.persistence_id().to_string(),
            current_state: node.current_state(),
            destination_state: node.destination_state(),
            generation: node.generation(),
            hostname: node.hostname().map(ToString::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterSummary {
    pub name: String,
    pub is_killed: bool,
    pub is_restarting: bool,
    pub restart_generation: u64,
    pub nodes: Vec<NodeSummary>,
}

impl From<&Cluster> for ClusterSummary {
    fn from(cluster: &Cluster) -> Self {
        Self {
            name: cluster.name().to_string(),
            is_killed: cluster.is_killed(),
            is_restarting: cluster.is_restarting(),
            restart_generation: cluster.restart_generation(),
            nodes: cluster.nodes().values().map(NodeSummary::from).collect(),
        }
    }
}

/// Which of a cluster's two opaque configuration blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigBlob {
    Database,
    Advanced,
}

impl ConfigBlob {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Advanced => "advanced",
        }
    }
}

/// A mutating operator command, as queued by processes outside the
/// scheduler and applied under the scheduler lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum OperatorRequest {
    CreateCluster {
        cluster: String,
    },
    RemoveCluster {
        cluster: String,
    },
    RestartCluster {
        cluster: String,
    },
    AddNode {
        cluster: String,
    },
    RemoveNode {
        cluster: String,
        node: String,
    },
    SetConfig {
        cluster: String,
        blob: ConfigBlob,
        content: String,
    },
}

impl OperatorRequest {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CreateCluster { .. } => "create_cluster",
            Self::RemoveCluster { .. } => "remove_cluster",
            Self::RestartCluster { .. } => "restart_cluster",
            Self::AddNode { .. } => "add_node",
            Self::RemoveNode { .. } => "remove_node",
            Self::SetConfig { .. } => "set_config",
        }
    }

    /// Checks what can be checked without the scheduler state.
    ///
    /// # Errors
    /// Returns a config error for an invalid cluster name.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::CreateCluster { cluster } => validate_cluster_name(cluster),
            _ => Ok(()),
        }
    }

    /// Applies the request to `state` and describes what happened. Nothing is
    /// changed when an error is returned.
    ///
    /// # Errors
    /// Returns not-found, conflict or config errors from the operation.
    pub fn apply(&self, state: &mut SchedulerRuntimeState, template: &NodeTemplate) -> Result<String> {
        match self {
            Self::CreateCluster { cluster } => {
                create_cluster(state, cluster)?;
                Ok(format!("Created cluster {cluster}"))
            }
            Self::RemoveCluster { cluster } => {
                remove_cluster(state, cluster)?;
                Ok(format!("Cluster {cluster} marked for removal"))
            }
            Self::RestartCluster { cluster } => Ok(if restart_cluster(state, cluster)? {
                format!("Rolling restart of {cluster} started")
            } else {
                format!("Cluster {cluster} is already restarting")
            }),
            Self::AddNode { cluster } => {
                let node = add_node(state, cluster, template)?;
                Ok(format!("Added node {node} to {cluster}"))
            }
            Self::RemoveNode { cluster, node } => {
                remove_node(state, cluster, node)?;
                Ok(format!("Node {node} marked for removal"))
            }
            Self::SetConfig {
                cluster,
                blob,
                content,
            } => {
                set_cluster_config(state, cluster, *blob, content.clone())?;
                Ok(format!("Replaced {} config of {cluster}", blob.as_str()))
            }
        }
    }
}

/// How a queued request ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum RequestOutcome {
    Applied(String),
    Rejected(String),
}

/// A request in the operator inbox. Ids increase in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub id: i64,
    pub request: OperatorRequest,
    pub outcome: Option<RequestOutcome>,
}

/// # Errors
/// Returns a config error unless the name is non-empty ASCII letters, digits
/// and underscores.
pub fn validate_cluster_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(OrchestratorError::ConfigError(format!(
            "Invalid cluster name {name:?}: use letters, digits and underscores"
        )))
    }
}

fn live_cluster<'a>(state: &'a mut SchedulerRuntimeState, name: &str) -> Result<&'a mut Cluster> {
    state
        .cluster_mut(name)
        .ok_or_else(|| OrchestratorError::NotFound(format!("Cluster {name}")))
}

fn create_cluster(state: &mut SchedulerRuntimeState, name: &str) -> Result<()> {
    validate_cluster_name(name)?;
    state.add_cluster(name).map(|_| ())
}

fn remove_cluster(state: &mut SchedulerRuntimeState, name: &str) -> Result<()> {
    live_cluster(state, name)?.request_removal();
    info!("Cluster {} marked for removal", name);
    Ok(())
}

fn restart_cluster(state: &mut SchedulerRuntimeState, name: &str) -> Result<bool> {
    Ok(live_cluster(state, name)?.rolling_restart())
}

fn add_node(state: &mut SchedulerRuntimeState, cluster_name: &str, template: &NodeTemplate) -> Result<String> {
    let cluster = live_cluster(state, cluster_name)?;
    if cluster.is_killed() {
        return Err(OrchestratorError::Conflict(format!(
            "Cluster {cluster_name} is being removed"
        )));
    }
    Ok(cluster.create_node(template.clone()).name())
}

fn remove_node(state: &mut SchedulerRuntimeState, cluster_name: &str, node_name: &str) -> Result<()> {
    live_cluster(state, cluster_name)?
        .node_named_mut(node_name)
        .ok_or_else(|| {
            OrchestratorError::NotFound(format!("Node {node_name} in cluster {cluster_name}"))
        })?
        .request_shutdown();
    info!("Node {} marked for removal", node_name);
    Ok(())
}

fn set_cluster_config(
    state: &mut SchedulerRuntimeState,
    cluster_name: &str,
    blob: ConfigBlob,
    content: String,
) -> Result<()> {
    let cluster = live_cluster(state, cluster_name)?;
    match blob {
        ConfigBlob::Database => cluster.set_database_config(content),
        ConfigBlob::Advanced => cluster.set_advanced_config(content),
    }
    info!("Replaced {} config of cluster {}", blob.as_str(), cluster_name);
    Ok(())
}

/// # Errors
/// Returns not-found for an unknown cluster.
pub fn cluster_config(state: &SchedulerRuntimeState, cluster_name: &str, blob: ConfigBlob) -> Result<String> {
    let cluster = state
        .cluster(cluster_name)
        .ok_or_else(|| OrchestratorError::NotFound(format!("Cluster {cluster_name}")))?;
    Ok(match blob {
        ConfigBlob::Database => cluster.database_config().to_string(),
        ConfigBlob::Advanced => cluster.advanced_config().to_string(),
    })
}

#[must_use]
pub fn list_clusters(state: &SchedulerRuntimeState) -> Vec<ClusterSummary> {
    state.clusters().values().map(ClusterSummary::from).collect()
}

impl<P> SchedulerCore<P>
where
    P: SchedulerPorts + 'static,
{
    /// # Errors
    /// Returns a conflict if the name is taken or belongs to a removed
    /// cluster, a config error for an invalid name, or a store error.
    pub async fn create_cluster(&self, name: &str) -> Result<()> {
        let mut state = self.lock().await;
        create_cluster(&mut state, name)?;
        self.persist_locked(&state).await
    }

    /// Marks every node of the cluster for shutdown. The cluster moves to the
    /// graveyard once housekeeping finds all of them gone.
    ///
    /// # Errors
    /// Returns not-found for an unknown cluster, or a store error.
    pub async fn remove_cluster(&self, name: &str) -> Result<()> {
        let mut state = self.lock().await;
        remove_cluster(&mut state, name)?;
        self.persist_locked(&state).await
    }

    /// Starts a rolling restart; returns false if one is already running.
    ///
    /// # Errors
    /// Returns not-found for an unknown cluster, or a store error.
    pub async fn restart_cluster(&self, name: &str) -> Result<bool> {
        let mut state = self.lock().await;
        let started = restart_cluster(&mut state, name)?;
        if started {
            self.persist_locked(&state).await?;
        }
        Ok(started)
    }

    /// Adds a node built from the configured template and returns its name.
    ///
    /// # Errors
    /// Returns not-found for an unknown cluster, a conflict if the cluster is
    /// being removed, or a store error.
    pub async fn add_node(&self, cluster_name: &str) -> Result<String> {
        let mut state = self.lock().await;
        let name = add_node(&mut state, cluster_name, &self.settings.template)?;
        self.persist_locked(&state).await?;
        Ok(name)
    }

    /// Asks for one node to be shut down and deleted.
    ///
    /// # Errors
    /// Returns not-found for an unknown cluster or node, or a store error.
    pub async fn remove_node(&self, cluster_name: &str, node_name: &str) -> Result<()> {
        let mut state = self.lock().await;
        remove_node(&mut state, cluster_name, node_name)?;
        self.persist_locked(&state).await
    }

    /// # Errors
    /// Returns not-found for an unknown cluster, or a store error.
    pub async fn set_cluster_config(
        &self,
        cluster_name: &str,
        blob: ConfigBlob,
        content: String,
    ) -> Result<()> {
        let mut state = self.lock().await;
        set_cluster_config(&mut state, cluster_name, blob, content)?;
        self.persist_locked(&state).await
    }

    /// # Errors
    /// Returns not-found for an unknown cluster.
    pub async fn cluster_config(&self, cluster_name: &str, blob: ConfigBlob) -> Result<String> {
        cluster_config(&*self.lock().await, cluster_name, blob)
    }

    pub async fn list_clusters(&self) -> Vec<ClusterSummary> {
        list_clusters(&*self.lock().await)
    }

    /// Applies every queued operator request not yet recorded in the state,
    /// in submission order and under one lock. The state remembers the last
    /// applied id and is persisted before outcomes are reported back, so a
    /// request takes effect at most once.
    ///
    /// # Errors
    /// Returns a store error if the inbox cannot be read or the state cannot
    /// be persisted.
    pub async fn drain_operator_requests(&self) -> Result<Vec<QueuedRequest>> {
        let mut state = self.lock().await;
        let pending = self
            .ports
            .pending_requests(state.last_operator_request())
            .await?;
        if pending.is_empty() {
            return Ok(pending);
        }

        let mut applied = Vec::with_capacity(pending.len());
        for mut queued in pending {
            let outcome = match queued.request.apply(&mut state, &self.settings.template) {
                Ok(message) => {
                    info!("Operator request {} applied: {}", queued.id, message);
                    RequestOutcome::Applied(message)
                }
                Err(e) => {
                    warn!(
                        "Operator request {} ({}) rejected: {}",
                        queued.id,
                        queued.request.as_str(),
                        e
                    );
                    RequestOutcome::Rejected(e.to_string())
                }
            };
            state.acknowledge_operator_request(queued.id);
            queued.outcome = Some(outcome);
            applied.push(queued);
        }
        self.persist_locked(&state).await?;
        drop(state);

        for queued in &applied {
            if let Some(outcome) = &queued.outcome {
                if let Err(e) = self.ports.complete_request(queued.id, outcome).await {
                    warn!("Recording outcome of operator request {} failed: {}", queued.id, e);
                }
            }
        }
        Ok(applied)
    }
}

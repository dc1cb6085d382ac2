use super::control_loop::SchedulerCore;
use super::membership::{join_cluster, leave_cluster};
use super::SchedulerPorts;
use crate::error::Result;
use crate::node::{StatusEffect, StatusOutcome};
use crate::state::TaskLocation;
use crate::types::TaskStatus;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How a status update was classified. Membership side effects run in the
/// background; their handle is returned so callers may await it.
#[derive(Debug)]
pub enum DispatchOutcome {
    Applied {
        effect: StatusEffect,
        membership: Option<JoinHandle<bool>>,
    },
    Stale,
    Disallowed,
    Graveyard,
    UnknownTask,
}

impl<P> SchedulerCore<P>
where
    P: SchedulerPorts + 'static,
{
    /// Routes a status update to the node owning the task and persists the
    /// result.
    ///
    /// # Errors
    /// Returns an invariant violation for reports that contradict the node's
    /// task generations, or a store error if the new state cannot be
    /// persisted. Both are fatal.
    pub async fn handle_status(&self, status: TaskStatus) -> Result<DispatchOutcome> {
        let mut state = self.lock().await;

        let (cluster_name, persistence_id) = match state.locate_task(&status.task_id) {
            TaskLocation::Live {
                cluster,
                persistence_id,
            } => (cluster, persistence_id),
            TaskLocation::Graveyard { cluster } => {
                info!(
                    "Dropping {} for task {} of removed cluster {}",
                    status.state, status.task_id, cluster
                );
                return Ok(DispatchOutcome::Graveyard);
            }
            TaskLocation::Unknown => {
                error!(
                    "Status {} for unknown task {} (agent {:?}): {}",
                    status.state,
                    status.task_id,
                    status.agent_id,
                    status.message.as_deref().unwrap_or("")
                );
                return Ok(DispatchOutcome::UnknownTask);
            }
        };

        let Some(cluster) = state.cluster_mut(&cluster_name) else {
            return Ok(DispatchOutcome::UnknownTask);
        };
        let Some(node) = cluster.node_mut(&persistence_id) else {
            return Ok(DispatchOutcome::UnknownTask);
        };
        debug!(
            "Dispatching {} for task {} to node {} ({})",
            status.state,
            status.task_id,
            node.name(),
            node.current_state()
        );

        let effect = match node.apply_status(&status)? {
            StatusOutcome::Applied(effect) => effect,
            StatusOutcome::Stale => return Ok(DispatchOutcome::Stale),
            StatusOutcome::Disallowed => {
                warn!(
                    "Status {} for task {} did not change node {}",
                    status.state,
                    status.task_id,
                    node.name()
                );
                return Ok(DispatchOutcome::Disallowed);
            }
        };
        let node_name = node.name();
        let task_data = node.task_data().cloned();

        let peers = cluster.joinable_peers(&node_name);
        self.persist_locked(&state).await?;
        drop(state);

        let membership = task_data.and_then(|task_data| {
            let ports = Arc::clone(&self.ports);
            let policy = self.settings.membership;
            match effect {
                StatusEffect::Join => Some(tokio::spawn(async move {
                    join_cluster(ports.as_ref(), &task_data, &peers, &policy).await
                })),
                StatusEffect::Leave => Some(tokio::spawn(async move {
                    leave_cluster(ports.as_ref(), &task_data, &peers, &policy).await
                })),
                StatusEffect::None => None,
            }
        });

        Ok(DispatchOutcome::Applied { effect, membership })
    }
}

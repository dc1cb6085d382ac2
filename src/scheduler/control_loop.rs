use super::membership::MembershipPolicy;
use super::SchedulerPorts;
use crate::config::Config;
use crate::error::Result;
use crate::node::{CurrentState, LaunchContext, LogicalNode, NodeTemplate};
use crate::state::SchedulerRuntimeState;
use crate::types::{FrameworkId, OfferId, PersistenceId, TaskId, TaskStatus};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Tunables the control loop reads on every pass.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub template: NodeTemplate,
    pub launch: LaunchContext,
    pub refuse_seconds: f64,
    pub reconcile_interval: Duration,
    pub membership: MembershipPolicy,
}

impl SchedulerSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            template: config.node_template(),
            launch: config.launch_context(),
            refuse_seconds: config.refuse_seconds,
            reconcile_interval: config.reconcile_interval(),
            membership: MembershipPolicy {
                max_retries: config.join_max_retries,
                backoff: config.join_backoff(),
            },
        }
    }
}

/// Owns the scheduler aggregate behind one coarse lock. Every handler takes
/// the lock for its whole pass and persists before releasing it.
pub struct SchedulerCore<P> {
    pub(super) ports: Arc<P>,
    pub(super) state: Arc<Mutex<SchedulerRuntimeState>>,
    pub(super) settings: Arc<SchedulerSettings>,
}

impl<P> Clone for SchedulerCore<P> {
    fn clone(&self) -> Self {
        Self {
            ports: Arc::clone(&self.ports),
            state: Arc::clone(&self.state),
            settings: Arc::clone(&self.settings),
        }
    }
}

/// What one housekeeping pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub killed: Vec<TaskId>,
    pub removed_nodes: usize,
    pub buried_clusters: Vec<String>,
}

impl<P> SchedulerCore<P>
where
    P: SchedulerPorts + 'static,
{
    #[must_use]
    pub fn new(ports: Arc<P>, state: SchedulerRuntimeState, settings: SchedulerSettings) -> Self {
        Self {
            ports,
            state: Arc::new(Mutex::new(state)),
            settings: Arc::new(settings),
        }
    }

    /// Rebuilds the core from the store, starting empty on first run.
    ///
    /// # Errors
    /// Returns an error if the store is unreachable or the persisted state is
    /// corrupt.
    pub async fn restore(ports: Arc<P>, settings: SchedulerSettings) -> Result<Self> {
        let state = match ports.load().await? {
            Some(state) => {
                state.validate_invariants()?;
                info!(
                    "Restored scheduler state with {} clusters ({} in graveyard)",
                    state.clusters().len(),
                    state.graveyard().len()
                );
                state
            }
            None => {
                info!("No persisted scheduler state, starting empty");
                SchedulerRuntimeState::new()
            }
        };
        Ok(Self::new(ports, state, settings))
    }

    #[must_use]
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    #[must_use]
    pub fn ports(&self) -> &Arc<P> {
        &self.ports
    }

    /// A copy of the aggregate as it is right now.
    pub async fn snapshot(&self) -> SchedulerRuntimeState {
        self.state.lock().await.clone()
    }

    pub(super) async fn lock(&self) -> MutexGuard<'_, SchedulerRuntimeState> {
        self.state.lock().await
    }

    pub(super) async fn persist_locked(&self, state: &SchedulerRuntimeState) -> Result<()> {
        self.ports
            .persist(state)
            .await
            .inspect_err(|e| warn!("Persisting scheduler state failed: {}", e))
    }

    /// Stores the id the cluster master registered the framework under.
    ///
    /// # Errors
    /// Returns an invariant violation for a different id than the recorded
    /// one, or a store error if it cannot be persisted.
    pub async fn register(&self, framework_id: FrameworkId) -> Result<()> {
        let mut state = self.lock().await;
        if state.set_framework_id(framework_id.clone())? {
            info!("Registered with framework id {}", framework_id);
            self.persist_locked(&state).await?;
        } else {
            info!("Re-registered with framework id {}", framework_id);
        }
        Ok(())
    }

    /// Offers are matched in one locked pass, so nothing is held past the
    /// batch that carried them.
    pub fn offer_rescinded(&self, offer_id: &OfferId) {
        info!("Offer {} rescinded", offer_id);
    }

    /// Unreconciled statuses to ask the cluster master about.
    pub async fn tasks_to_reconcile(&self, now: Instant) -> Vec<TaskStatus> {
        let interval = self.settings.reconcile_interval;
        let mut state = self.lock().await;
        state
            .clusters_mut()
            .flat_map(|cluster| cluster.tasks_to_reconcile(interval, now))
            .collect()
    }

    /// Advances rolling restarts, kills nodes marked for shutdown, deletes
    /// removable nodes and buries removed clusters.
    ///
    /// # Errors
    /// Returns a store error if the resulting state cannot be persisted.
    pub async fn housekeeping(&self) -> Result<HousekeepingReport> {
        let mut report = HousekeepingReport::default();
        let mut changed = false;
        {
            let mut state = self.lock().await;
            for cluster in state.clusters_mut() {
                let (restarting, restart_changed) = cluster.next_restart();
                changed |= restart_changed;

                let (mut kill, remove) = cluster.nodes_to_kill_or_remove();
                kill.extend(restarting);
                for persistence_id in &kill {
                    if let Some(task_id) = kill_node(cluster.nodes_mut(), persistence_id) {
                        report.killed.push(task_id);
                        changed = true;
                    }
                }
                for persistence_id in &remove {
                    if cluster.remove_node(persistence_id).is_some() {
                        report.removed_nodes += 1;
                        changed = true;
                    }
                }
            }

            let removable: Vec<String> = state
                .clusters()
                .values()
                .filter(|cluster| cluster.can_be_removed())
                .map(|cluster| cluster.name().to_string())
                .collect();
            for name in removable {
                if state.bury_cluster(&name) {
                    report.buried_clusters.push(name);
                    changed = true;
                }
            }

            if changed {
                self.persist_locked(&state).await?;
            }
        }

        for task_id in &report.killed {
            if let Err(e) = self.ports.kill_task(task_id).await {
                warn!("Kill for task {} failed, reconciliation will retry: {}", task_id, e);
            }
        }
        if changed {
            debug!("Housekeeping: {:?}", report);
        }
        Ok(report)
    }
}

fn kill_node<'a>(
    mut nodes: impl Iterator<Item = &'a mut LogicalNode>,
    persistence_id: &PersistenceId,
) -> Option<TaskId> {
    let node = nodes.find(|node| node.persistence_id() == persistence_id)?;
    if !matches!(
        node.current_state(),
        CurrentState::Starting | CurrentState::Started
    ) {
        return None;
    }
    info!("Killing task {} of node {}", node.task_id(), node.name());
    node.mark_killing();
    Some(node.task_id())
}

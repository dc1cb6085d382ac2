#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Per-node lifecycle: observed state, operator intent, and how offers and
//! status updates move a node between them.

mod state;
mod task;

pub use state::{CurrentState, DestinationState};
pub use task::{fully_qualified_node_name, ExecutorInfo, LaunchContext, TaskData, TaskInfo};

use crate::error::{OrchestratorError, Result};
use crate::resources::{OfferPlan, ResourceRequest};
use crate::types::{AgentId, PersistenceId, TaskId, TaskState, TaskStatus};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Ports the launch payload needs: HTTP, protocol buffers, distribution.
pub const REQUIRED_PORTS: usize = 3;

/// Resource shape and reservation identity every new node is created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTemplate {
    pub framework_name: String,
    pub principal: String,
    pub role: String,
    pub cpus: f64,
    pub mem: f64,
    pub disk: f64,
    pub ports: usize,
    pub executor_cpus: f64,
    pub executor_mem: f64,
    pub container_path: String,
}

/// What a dispatched status update asks of the node's peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEffect {
    None,
    Join,
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    Applied(StatusEffect),
    /// Terminal report about an earlier task generation.
    Stale,
    /// Transition not allowed from the current state; nothing changed.
    Disallowed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalNode {
    simple_id: u64,
    cluster_name: String,
    persistence_id: PersistenceId,
    template: NodeTemplate,
    generation: u64,
    restart_generation: u64,
    current_state: CurrentState,
    destination_state: DestinationState,
    agent_id: Option<AgentId>,
    hostname: Option<String>,
    task_data: Option<TaskData>,
    last_status: Option<TaskStatus>,
    #[serde(skip)]
    reconciled: bool,
    #[serde(skip)]
    last_asked: Option<Instant>,
}

impl LogicalNode {
    #[must_use]
    pub fn new(
        template: NodeTemplate,
        cluster_name: impl Into<String>,
        simple_id: u64,
        restart_generation: u64,
    ) -> Self {
        Self {
            simple_id,
            cluster_name: cluster_name.into(),
            persistence_id: PersistenceId::generate(),
            template,
            generation: 0,
            restart_generation,
            current_state: CurrentState::Unknown,
            destination_state: DestinationState::Started,
            agent_id: None,
            hostname: None,
            task_data: None,
            last_status: None,
            reconciled: false,
            last_asked: None,
        }
    }

    /// `{framework}-{cluster}-{simple id}`
    #[must_use]
    pub fn name(&self) -> String {
        format!(
            "{}-{}-{}",
            self.template.framework_name, self.cluster_name, self.simple_id
        )
    }

    #[must_use]
    pub fn task_id(&self) -> TaskId {
        TaskId::new(self.name(), self.generation)
    }

    #[must_use]
    pub fn executor_id(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.template.framework_name, self.cluster_name, self.persistence_id, self.generation
        )
    }

    #[must_use]
    pub const fn simple_id(&self) -> u64 {
        self.simple_id
    }

    #[must_use]
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    #[must_use]
    pub const fn persistence_id(&self) -> &PersistenceId {
        &self.persistence_id
    }

    #[must_use]
    pub const fn template(&self) -> &NodeTemplate {
        &self.template
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn restart_generation(&self) -> u64 {
        self.restart_generation
    }

    #[must_use]
    pub const fn current_state(&self) -> CurrentState {
        self.current_state
    }

    #[must_use]
    pub const fn destination_state(&self) -> DestinationState {
        self.destination_state
    }

    #[must_use]
    pub const fn agent_id(&self) -> Option<&AgentId> {
        self.agent_id.as_ref()
    }

    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    #[must_use]
    pub const fn task_data(&self) -> Option<&TaskData> {
        self.task_data.as_ref()
    }

    #[must_use]
    pub const fn last_status(&self) -> Option<&TaskStatus> {
        self.last_status.as_ref()
    }

    #[must_use]
    pub const fn is_reconciled(&self) -> bool {
        self.reconciled
    }

    // --- predicates ---

    #[must_use]
    pub fn has_requested_reservation(&self) -> bool {
        self.current_state.has_reservation()
    }

    #[must_use]
    pub const fn needs_to_be_reconciled(&self) -> bool {
        !self.reconciled && self.current_state.is_launched()
    }

    #[must_use]
    pub const fn can_be_scheduled(&self) -> bool {
        match self.destination_state {
            DestinationState::Started => matches!(
                self.current_state,
                CurrentState::Unknown | CurrentState::Reserved | CurrentState::Failed
            ),
            DestinationState::Restarting => matches!(
                self.current_state,
                CurrentState::Unknown
                    | CurrentState::Reserved
                    | CurrentState::Failed
                    | CurrentState::Shutdown
            ),
            DestinationState::Shutdown => false,
        }
    }

    #[must_use]
    pub const fn can_be_killed(&self) -> bool {
        matches!(self.destination_state, DestinationState::Shutdown)
            && matches!(
                self.current_state,
                CurrentState::Starting | CurrentState::Started
            )
    }

    #[must_use]
    pub const fn can_be_removed(&self) -> bool {
        matches!(self.destination_state, DestinationState::Shutdown)
            && !self.current_state.is_live()
    }

    /// Started and meant to stay up, so peers may join it or leave through it.
    #[must_use]
    pub const fn can_be_joined(&self) -> bool {
        matches!(self.current_state, CurrentState::Started)
            && matches!(self.destination_state, DestinationState::Started)
    }

    #[must_use]
    pub const fn has_restarted(&self, generation: u64) -> bool {
        self.can_be_joined() && self.restart_generation >= generation
    }

    #[must_use]
    pub const fn is_restarting(&self, generation: u64) -> bool {
        self.destination_state.wants_running()
            && !matches!(self.current_state, CurrentState::Started)
            && self.restart_generation >= generation
    }

    /// Nodes that were never launched have nothing to reconcile.
    #[must_use]
    pub fn reconcile_status(&self) -> Option<TaskStatus> {
        if let Some(status) = &self.last_status {
            return Some(TaskStatus::new(status.task_id.clone(), status.state, None));
        }
        self.current_state
            .is_launched()
            .then(|| TaskStatus::new(self.task_id(), TaskState::Error, None))
    }

    #[must_use]
    pub fn asked_within(&self, interval: Duration, now: Instant) -> bool {
        self.last_asked
            .is_some_and(|asked| now.saturating_duration_since(asked) < interval)
    }

    pub fn mark_asked(&mut self, now: Instant) {
        self.last_asked = Some(now);
    }

    // --- operator intent ---

    pub fn request_shutdown(&mut self) {
        self.destination_state = DestinationState::Shutdown;
    }

    pub fn restart(&mut self, generation: u64) {
        self.restart_generation = generation;
        self.destination_state = DestinationState::Restarting;
    }

    /// Records that a kill was sent for the node's task.
    pub fn mark_killing(&mut self) {
        if self.transition(CurrentState::ShuttingDown) {
            self.reconciled = false;
        }
    }

    /// Drops the node's claim on a reservation the agent no longer holds.
    pub fn unreserve(&mut self) {
        info!("Releasing reservation of node {}", self.name());
        self.current_state = CurrentState::Unknown;
        self.agent_id = None;
        self.hostname = None;
    }

    fn transition(&mut self, next: CurrentState) -> bool {
        if !self.current_state.can_transition_to(next) {
            warn!(
                "Node {} refused transition {} -> {}",
                self.name(),
                self.current_state,
                next
            );
            return false;
        }
        self.current_state = next;
        true
    }

    // --- offers ---

    fn node_request(&self) -> ResourceRequest {
        ResourceRequest::new(
            self.template.cpus,
            self.template.mem,
            self.template.disk,
            self.template.ports,
        )
    }

    fn reservation_request(&self) -> ResourceRequest {
        ResourceRequest::new(self.template.cpus, self.template.mem, self.template.disk, 0)
            .reserved_by(self.template.principal.clone(), self.template.role.clone())
            .with_volume(
                self.persistence_id.clone(),
                self.template.container_path.clone(),
            )
    }

    fn executor_request(&self) -> ResourceRequest {
        ResourceRequest::new(self.template.executor_cpus, self.template.executor_mem, 0.0, 0)
    }

    /// Reserves the node's resources and volume out of the offer's unreserved
    /// half. Ports and executor overhead are claimed but not reserved.
    pub fn apply_unreserved_offer(&mut self, plan: &mut OfferPlan) -> bool {
        let full = ResourceRequest::new(
            self.template.cpus + self.template.executor_cpus,
            self.template.mem + self.template.executor_mem,
            self.template.disk,
            self.template.ports,
        );
        if !plan.can_fit_unreserved(&full) || !self.current_state.can_transition_to(CurrentState::Reserved) {
            return false;
        }

        let mut attempt = plan.clone();
        let overhead = ResourceRequest::new(
            self.template.executor_cpus,
            self.template.executor_mem,
            0.0,
            self.template.ports,
        );
        if attempt.apply_unreserved(&overhead).is_none()
            || !attempt.make_reservation(&self.reservation_request())
        {
            return false;
        }

        info!(
            "Reserving resources for node {} on offer {}",
            self.name(),
            plan.id()
        );
        *plan = attempt;
        self.agent_id = Some(plan.agent_id().clone());
        self.hostname = Some(plan.hostname().to_string());
        self.current_state = CurrentState::Reserved;
        true
    }

    /// Compiles a launch for the node against the offer. In persistent mode the
    /// node's cpus, mem and disk come from its reservation and ports from the
    /// unreserved half; executor overhead is always unreserved.
    ///
    /// # Errors
    /// Returns an error if the launch payload cannot be built.
    pub fn apply_reserved_offer(
        &mut self,
        plan: &mut OfferPlan,
        context: &LaunchContext,
    ) -> Result<bool> {
        if !self.can_be_scheduled() || !self.current_state.can_transition_to(CurrentState::Starting) {
            return Ok(false);
        }

        let mut attempt = plan.clone();
        let claimed = if context.compatibility_mode {
            attempt
                .apply_unreserved(&self.node_request())
                .zip(attempt.apply_unreserved(&self.executor_request()))
        } else {
            let ports = ResourceRequest::new(0.0, 0.0, 0.0, self.template.ports);
            attempt
                .apply_reserved(&self.reservation_request())
                .zip(attempt.apply_unreserved(&ports))
                .map(|(mut reserved, ports)| {
                    reserved.extend(ports);
                    reserved
                })
                .zip(attempt.apply_unreserved(&self.executor_request()))
        };
        let Some((task_resources, executor_resources)) = claimed else {
            return Ok(false);
        };

        let ports: Vec<u64> = task_resources
            .iter()
            .flat_map(crate::resources::Resource::port_list)
            .collect();
        let [http_port, pb_port, disterl_port, ..] = ports[..] else {
            return Err(OrchestratorError::ConfigError(format!(
                "Node {} needs at least {REQUIRED_PORTS} ports, offer {} granted {}",
                self.name(),
                plan.id(),
                ports.len()
            )));
        };

        let generation = self.generation.saturating_add(1);
        let name = self.name();
        let host = plan.hostname().to_string();
        let task_data = TaskData {
            fully_qualified_node_name: fully_qualified_node_name(&name, &host),
            host: host.clone(),
            zookeepers: context.zookeepers.clone(),
            framework_name: self.template.framework_name.clone(),
            scheduler_uri: context.scheduler_uri.clone(),
            cluster_name: self.cluster_name.clone(),
            http_port,
            pb_port,
            disterl_port,
        };
        let task_id = TaskId::new(name.clone(), generation);
        let task = TaskInfo {
            task_id: task_id.clone(),
            name: name.clone(),
            agent_id: plan.agent_id().clone(),
            executor: ExecutorInfo {
                executor_id: format!(
                    "{}-{}-{}-{generation}",
                    self.template.framework_name, self.cluster_name, self.persistence_id
                ),
                name: format!("{name} Executor"),
                source: self.template.framework_name.clone(),
                command: context.executor_command.clone(),
                resources: executor_resources,
            },
            resources: task_resources,
            data: task_data.to_bytes()?,
        };

        info!("Launching task {} on offer {}", task_id, plan.id());
        attempt.push_launch(task);
        *plan = attempt;

        self.agent_id = Some(plan.agent_id().clone());
        self.hostname = Some(host);
        self.generation = generation;
        self.last_status = None;
        self.task_data = Some(task_data);
        self.current_state = CurrentState::Starting;
        Ok(true)
    }

    // --- status updates ---

    /// Applies a status update addressed to this node.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::InvariantViolation`] for a report about a
    /// task generation that was never issued, or a non-terminal report about
    /// an earlier generation.
    pub fn apply_status(&mut self, status: &TaskStatus) -> Result<StatusOutcome> {
        let reported = status.task_id.generation();
        if reported > self.generation {
            return Err(OrchestratorError::InvariantViolation(format!(
                "Status {} for task {} but node {} only issued generation {}",
                status.state,
                status.task_id,
                self.name(),
                self.generation
            )));
        }
        if reported < self.generation {
            if status.state.is_terminal() {
                info!(
                    "Ignoring {} for historical task {} of node {} (now on generation {})",
                    status.state,
                    status.task_id,
                    self.name(),
                    self.generation
                );
                return Ok(StatusOutcome::Stale);
            }
            return Err(OrchestratorError::InvariantViolation(format!(
                "Historical task {} reported {} while node {} runs generation {}",
                status.task_id,
                status.state,
                self.name(),
                self.generation
            )));
        }

        self.reconciled = true;
        let previous = self.current_state;
        let next = match status.state {
            TaskState::Staging | TaskState::Starting => CurrentState::Starting,
            TaskState::Running => CurrentState::Started,
            TaskState::Finished | TaskState::Killed => CurrentState::Shutdown,
            TaskState::Failed | TaskState::Lost | TaskState::Error => CurrentState::Failed,
        };
        if !self.transition(next) {
            return Ok(StatusOutcome::Disallowed);
        }
        self.last_status = Some(status.clone());
        if let Some(agent_id) = &status.agent_id {
            self.agent_id = Some(agent_id.clone());
        }

        let effect = match (previous, next) {
            (CurrentState::Starting, CurrentState::Started) => {
                let effect = if matches!(self.destination_state, DestinationState::Started) {
                    StatusEffect::Join
                } else {
                    StatusEffect::None
                };
                if matches!(self.destination_state, DestinationState::Restarting) {
                    self.destination_state = DestinationState::Started;
                }
                effect
            }
            (CurrentState::Started | CurrentState::ShuttingDown, CurrentState::Shutdown)
                if !matches!(self.destination_state, DestinationState::Restarting) =>
            {
                StatusEffect::Leave
            }
            (CurrentState::Started, CurrentState::Failed) => StatusEffect::Leave,
            _ => StatusEffect::None,
        };
        Ok(StatusOutcome::Applied(effect))
    }

    /// # Errors
    /// Returns an error if node state invariants are violated.
    pub fn validate_invariants(&self) -> Result<()> {
        if self.current_state.has_reservation()
            && !matches!(self.current_state, CurrentState::Shutdown | CurrentState::Failed)
            && self.agent_id.is_none()
        {
            return Err(OrchestratorError::InvariantViolation(format!(
                "Node {} is {} without an agent",
                self.name(),
                self.current_state
            )));
        }
        if self.current_state.is_live() && (self.generation == 0 || self.task_data.is_none()) {
            return Err(OrchestratorError::InvariantViolation(format!(
                "Node {} is {} but was never launched",
                self.name(),
                self.current_state
            )));
        }
        Ok(())
    }
}

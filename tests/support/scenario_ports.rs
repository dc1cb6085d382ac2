use orchestrator::node::{LaunchContext, NodeTemplate, TaskData};
use orchestrator::resources::{Offer, OfferOperation, PortRange, Resource, CPUS, DISK, MEM};
use orchestrator::scheduler::{
    MembershipPolicy, MembershipReply, NodeManagement, OperatorInbox, PortFuture, QueuedRequest,
    RequestOutcome, SchedulerDriver, StateStore,
};
use orchestrator::state::{MemoryStateStore, SchedulerRuntimeState};
use orchestrator::types::{AgentId, OfferId, PersistenceId, TaskId, TaskStatus};
use orchestrator::SchedulerSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Records every call the control loop makes to the outside world.
#[derive(Debug, Clone, Default)]
pub struct RecordingPorts {
    pub store: MemoryStateStore,
    pub accepted: Arc<Mutex<Vec<(OfferId, Vec<OfferOperation>)>>>,
    pub declined: Arc<Mutex<Vec<OfferId>>>,
    pub reconciled: Arc<Mutex<Vec<TaskStatus>>>,
    pub killed: Arc<Mutex<Vec<TaskId>>>,
    pub joins: Arc<Mutex<Vec<(String, String)>>>,
    pub removals: Arc<Mutex<Vec<(String, String)>>>,
}

impl StateStore for RecordingPorts {
    fn load(&self) -> PortFuture<'_, Option<SchedulerRuntimeState>> {
        self.store.load()
    }

    fn persist<'a>(&'a self, state: &'a SchedulerRuntimeState) -> PortFuture<'a, ()> {
        self.store.persist(state)
    }
}

impl OperatorInbox for RecordingPorts {
    fn pending_requests(&self, after: i64) -> PortFuture<'_, Vec<QueuedRequest>> {
        self.store.pending_requests(after)
    }

    fn complete_request<'a>(&'a self, id: i64, outcome: &'a RequestOutcome) -> PortFuture<'a, ()> {
        self.store.complete_request(id, outcome)
    }
}

impl SchedulerDriver for RecordingPorts {
    fn accept_offers<'a>(
        &'a self,
        offer_id: &'a OfferId,
        operations: Vec<OfferOperation>,
        _refuse_seconds: f64,
    ) -> PortFuture<'a, ()> {
        Box::pin(async move {
            self.accepted
                .lock()
                .await
                .push((offer_id.clone(), operations));
            Ok(())
        })
    }

    fn decline_offer<'a>(
        &'a self,
        offer_id: &'a OfferId,
        _refuse_seconds: f64,
    ) -> PortFuture<'a, ()> {
        Box::pin(async move {
            self.declined.lock().await.push(offer_id.clone());
            Ok(())
        })
    }

    fn reconcile_tasks(&self, statuses: Vec<TaskStatus>) -> PortFuture<'_, ()> {
        Box::pin(async move {
            self.reconciled.lock().await.extend(statuses);
            Ok(())
        })
    }

    fn kill_task<'a>(&'a self, task_id: &'a TaskId) -> PortFuture<'a, ()> {
        Box::pin(async move {
            self.killed.lock().await.push(task_id.clone());
            Ok(())
        })
    }
}

impl NodeManagement for RecordingPorts {
    fn join<'a>(
        &'a self,
        acting: &'a TaskData,
        target: &'a TaskData,
    ) -> PortFuture<'a, MembershipReply> {
        Box::pin(async move {
            self.joins.lock().await.push((
                acting.fully_qualified_node_name.clone(),
                target.fully_qualified_node_name.clone(),
            ));
            Ok(MembershipReply::Success)
        })
    }

    fn force_remove<'a>(
        &'a self,
        acting: &'a TaskData,
        target: &'a TaskData,
    ) -> PortFuture<'a, MembershipReply> {
        Box::pin(async move {
            self.removals.lock().await.push((
                acting.fully_qualified_node_name.clone(),
                target.fully_qualified_node_name.clone(),
            ));
            Ok(MembershipReply::AlreadyDone)
        })
    }
}

#[must_use]
pub fn settings() -> SchedulerSettings {
    SchedulerSettings {
        template: NodeTemplate {
            framework_name: "riak".to_string(),
            principal: "riak".to_string(),
            role: "riak".to_string(),
            cpus: 1.0,
            mem: 1024.0,
            disk: 10_000.0,
            ports: 3,
            executor_cpus: 0.1,
            executor_mem: 32.0,
            container_path: "root".to_string(),
        },
        launch: LaunchContext {
            zookeepers: vec!["zk1:2181".to_string()],
            scheduler_uri: "http://scheduler:9090".to_string(),
            executor_command: "./executor".to_string(),
            compatibility_mode: false,
        },
        refuse_seconds: 5.0,
        reconcile_interval: Duration::from_secs(5),
        membership: MembershipPolicy {
            max_retries: 2,
            backoff: Duration::from_millis(1),
        },
    }
}

/// A fresh agent with room for several nodes.
#[must_use]
pub fn unreserved_offer(id: &str, agent: &str) -> Offer {
    Offer::new(
        OfferId::new(id),
        AgentId::new(agent),
        format!("{agent}.example.com"),
        vec![
            Resource::scalar(CPUS, 8.0),
            Resource::scalar(MEM, 8192.0),
            Resource::scalar(DISK, 100_000.0),
            Resource::ports(vec![PortRange::new(31000, 31099)]),
        ],
    )
}

/// The agent offering back the reservations and volumes for `pids`.
#[must_use]
pub fn reserved_offer(id: &str, agent: &str, pids: &[PersistenceId]) -> Offer {
    let mut resources: Vec<Resource> = pids
        .iter()
        .flat_map(|pid| {
            [
                Resource::scalar(CPUS, 1.0).reserved_for("riak", "riak"),
                Resource::scalar(MEM, 1024.0).reserved_for("riak", "riak"),
                Resource::scalar(DISK, 10_000.0)
                    .reserved_for("riak", "riak")
                    .with_volume(pid.clone(), "root"),
            ]
        })
        .collect();
    resources.extend([
        Resource::scalar(CPUS, 2.0),
        Resource::scalar(MEM, 1024.0),
        Resource::ports(vec![PortRange::new(31000, 31099)]),
    ]);
    Offer::new(
        OfferId::new(id),
        AgentId::new(agent),
        format!("{agent}.example.com"),
        resources,
    )
}

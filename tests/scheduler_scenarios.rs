#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod support;

use orchestrator::node::CurrentState;
use orchestrator::resources::OfferOperation;
use orchestrator::scheduler::{DispatchOutcome, OfferDecision, EVENT_QUEUE_CAPACITY};
use orchestrator::state::SchedulerRuntimeState;
use orchestrator::types::{AgentId, FrameworkId, PersistenceId, TaskId, TaskState, TaskStatus};
use orchestrator::{EventLoop, SchedulerCore, SchedulerEvent};
use std::sync::Arc;
use std::time::Duration;
use support::scenario_ports::{reserved_offer, settings, unreserved_offer, RecordingPorts};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn given_event_loop(ports: &RecordingPorts) -> EventLoop<RecordingPorts> {
    let core = SchedulerCore::new(
        Arc::new(ports.clone()),
        SchedulerRuntimeState::new(),
        settings(),
    );
    let (_sender, receiver) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    EventLoop::new(core, receiver, CancellationToken::new())
}

async fn persistence_ids(core: &SchedulerCore<RecordingPorts>) -> Vec<PersistenceId> {
    core.snapshot()
        .await
        .clusters()
        .values()
        .flat_map(|cluster| cluster.nodes().values())
        .map(|node| node.persistence_id().clone())
        .collect()
}

fn running(node_name: &str, generation: u64, agent: &str) -> TaskStatus {
    TaskStatus::new(
        TaskId::new(node_name, generation),
        TaskState::Running,
        Some(AgentId::new(agent)),
    )
}

/// Reports every launched node as running and waits for its join attempt.
async fn given_running(core: &SchedulerCore<RecordingPorts>, names: &[String], agent: &str) {
    for name in names {
        let outcome = core.handle_status(running(name, 1, agent)).await.unwrap();
        let DispatchOutcome::Applied { membership, .. } = outcome else {
            panic!("status for {name} was not applied");
        };
        if let Some(handle) = membership {
            assert!(handle.await.unwrap());
        }
    }
}

async fn current_states(core: &SchedulerCore<RecordingPorts>) -> Vec<CurrentState> {
    core.snapshot()
        .await
        .clusters()
        .values()
        .flat_map(|cluster| cluster.nodes().values())
        .map(|node| node.current_state())
        .collect()
}

#[tokio::test]
async fn three_node_cluster_lives_and_dies_on_one_agent() {
    let ports = RecordingPorts::default();
    let event_loop = given_event_loop(&ports);
    let core = event_loop.core().clone();
    event_loop
        .handle(SchedulerEvent::Registered(FrameworkId::new("fw-1")))
        .await
        .unwrap();
    core.create_cluster("prod").await.unwrap();
    let mut names = Vec::new();
    for _ in 0..3 {
        names.push(core.add_node("prod").await.unwrap());
    }

    event_loop
        .handle(SchedulerEvent::Offers(vec![unreserved_offer("o-1", "agent-a")]))
        .await
        .unwrap();
    assert!(current_states(&core)
        .await
        .iter()
        .all(|state| *state == CurrentState::Reserved));

    let pids = persistence_ids(&core).await;
    event_loop
        .handle(SchedulerEvent::Offers(vec![reserved_offer(
            "o-2", "agent-a", &pids,
        )]))
        .await
        .unwrap();
    {
        let accepted = ports.accepted.lock().await;
        assert_eq!(accepted.len(), 2);
        let OfferOperation::Launch(tasks) = &accepted[1].1[0] else {
            panic!("second offer should launch");
        };
        assert_eq!(tasks.len(), 3);
    }

    given_running(&core, &names, "agent-a").await;
    assert!(current_states(&core)
        .await
        .iter()
        .all(|state| *state == CurrentState::Started));
    let joins = ports.joins.lock().await.clone();
    assert_eq!(joins.len(), 2);
    assert!(joins[0].0.starts_with(&format!("{}@", names[1])));
    assert!(joins[1].0.starts_with(&format!("{}@", names[2])));

    core.remove_cluster("prod").await.unwrap();
    event_loop.tick().await.unwrap();
    assert_eq!(ports.killed.lock().await.len(), 3);
    for name in &names {
        let killed = TaskStatus::new(
            TaskId::new(name.clone(), 1),
            TaskState::Killed,
            Some(AgentId::new("agent-a")),
        );
        event_loop
            .handle(SchedulerEvent::StatusUpdate(killed))
            .await
            .unwrap();
    }
    event_loop.tick().await.unwrap();

    let state = core.snapshot().await;
    assert!(state.clusters().is_empty());
    assert_eq!(state.graveyard().len(), 1);
    let persisted = ports.store.payload().await.unwrap();
    let restored = SchedulerRuntimeState::from_json(&persisted).unwrap();
    assert_eq!(restored.graveyard().len(), 1);
    assert_eq!(restored.framework_id(), Some(&FrameworkId::new("fw-1")));
}

#[tokio::test]
async fn reserved_nodes_ignore_offers_from_other_agents() {
    let ports = RecordingPorts::default();
    let core = SchedulerCore::new(
        Arc::new(ports.clone()),
        SchedulerRuntimeState::new(),
        settings(),
    );
    core.create_cluster("prod").await.unwrap();
    core.add_node("prod").await.unwrap();
    core.handle_offers(vec![unreserved_offer("o-1", "agent-a")])
        .await
        .unwrap();

    let decisions = core
        .handle_offers(vec![unreserved_offer("o-2", "agent-b")])
        .await
        .unwrap();

    assert!(matches!(decisions[0], OfferDecision::Decline { .. }));
    assert_eq!(ports.declined.lock().await.len(), 1);
    assert_eq!(current_states(&core).await, vec![CurrentState::Reserved]);
}

#[tokio::test]
async fn restarted_scheduler_launches_from_the_persisted_reservation() {
    let ports = RecordingPorts::default();
    let first = SchedulerCore::new(
        Arc::new(ports.clone()),
        SchedulerRuntimeState::new(),
        settings(),
    );
    first.create_cluster("prod").await.unwrap();
    let name = first.add_node("prod").await.unwrap();
    first
        .handle_offers(vec![unreserved_offer("o-1", "agent-a")])
        .await
        .unwrap();
    let pids = persistence_ids(&first).await;
    drop(first);

    let second = SchedulerCore::restore(Arc::new(ports.clone()), settings())
        .await
        .unwrap();
    let decisions = second
        .handle_offers(vec![reserved_offer("o-2", "agent-a", &pids)])
        .await
        .unwrap();

    assert_eq!(decisions[0].kinds(), vec!["launch"]);
    let OfferOperation::Launch(tasks) = &decisions[0].operations()[0] else {
        panic!("expected a launch");
    };
    assert_eq!(tasks[0].task_id, TaskId::new(name, 1));
}

#[tokio::test]
async fn event_loop_drains_queued_events_before_the_queue_closes() {
    let ports = RecordingPorts::default();
    let core = SchedulerCore::new(
        Arc::new(ports.clone()),
        SchedulerRuntimeState::new(),
        settings(),
    );
    core.create_cluster("prod").await.unwrap();
    let first = core.add_node("prod").await.unwrap();
    let second = core.add_node("prod").await.unwrap();
    core.handle_offers(vec![unreserved_offer("o-1", "agent-a")])
        .await
        .unwrap();
    let pids = persistence_ids(&core).await;
    let (sender, receiver) = mpsc::channel(8);

    for event in [
        SchedulerEvent::Registered(FrameworkId::new("fw-1")),
        SchedulerEvent::Offers(vec![reserved_offer("o-2", "agent-a", &pids)]),
        SchedulerEvent::StatusUpdate(running(&first, 1, "agent-a")),
        SchedulerEvent::StatusUpdate(running(&second, 1, "agent-a")),
    ] {
        sender.send(event).await.unwrap();
    }
    drop(sender);
    let result = EventLoop::new(core.clone(), receiver, CancellationToken::new())
        .run()
        .await;

    assert!(result.is_ok());
    for _ in 0..100 {
        if !ports.joins.lock().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(ports.joins.lock().await.len(), 1);
    assert_eq!(
        current_states(&core).await,
        vec![CurrentState::Started, CurrentState::Started]
    );
}

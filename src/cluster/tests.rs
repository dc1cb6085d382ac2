#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use super::Cluster;
use crate::node::{CurrentState, DestinationState, LaunchContext, NodeTemplate};
use crate::resources::{Offer, OfferPlan, PortRange, Resource, CPUS, DISK, MEM};
use crate::types::{AgentId, OfferId, PersistenceId, TaskState, TaskStatus};
use std::time::{Duration, Instant};

fn template() -> NodeTemplate {
    NodeTemplate {
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
    }
}

fn given_cluster_with_nodes(count: usize) -> (Cluster, Vec<PersistenceId>) {
    let mut cluster = Cluster::new("prod");
    let ids = (0..count)
        .map(|_| cluster.create_node(template()).persistence_id().clone())
        .collect();
    (cluster, ids)
}

fn launch(cluster: &mut Cluster, id: &PersistenceId) {
    let node = cluster.nodes_mut().find(|n| n.persistence_id() == id).unwrap();
    let mut plan = OfferPlan::new(Offer::new(
        OfferId::new(format!("offer-{}", node.name())),
        AgentId::new("agent-1"),
        "host-1",
        vec![
            Resource::scalar(CPUS, 2.0),
            Resource::scalar(MEM, 2048.0),
            Resource::scalar(DISK, 20_000.0),
            Resource::ports(vec![PortRange::new(31000, 31009)]),
        ],
    ), "riak");
    let context = LaunchContext {
        compatibility_mode: true,
        ..LaunchContext::default()
    };
    assert!(node.apply_reserved_offer(&mut plan, &context).unwrap());
}

fn report(cluster: &mut Cluster, id: &PersistenceId, state: TaskState) {
    let node = cluster.nodes_mut().find(|n| n.persistence_id() == id).unwrap();
    let status = TaskStatus::new(node.task_id(), state, None);
    node.apply_status(&status).unwrap();
}

fn given_started(cluster: &mut Cluster, id: &PersistenceId) {
    launch(cluster, id);
    report(cluster, id, TaskState::Running);
}

#[test]
fn simple_ids_are_never_reused() {
    let (mut cluster, ids) = given_cluster_with_nodes(2);

    cluster.remove_node(&ids[1]);
    let third = cluster.create_node(template());

    assert_eq!(third.simple_id(), 3);
    assert_eq!(third.name(), "riak-prod-3");
    assert_eq!(cluster.nodes().len(), 2);
}

#[test]
fn when_cluster_is_removed_then_it_waits_for_live_nodes() {
    let (mut cluster, ids) = given_cluster_with_nodes(2);
    given_started(&mut cluster, &ids[0]);

    cluster.request_removal();

    assert!(cluster.is_killed());
    assert!(!cluster.can_be_removed());
    let (kill, remove) = cluster.nodes_to_kill_or_remove();
    assert_eq!(kill, vec![ids[0].clone()]);
    assert!(remove.is_empty(), "killed clusters keep their nodes");

    report(&mut cluster, &ids[0], TaskState::Killed);
    assert!(cluster.can_be_removed());
}

#[test]
fn when_node_is_shut_down_then_it_is_offered_for_removal() {
    let (mut cluster, ids) = given_cluster_with_nodes(2);
    cluster
        .nodes_mut()
        .find(|n| n.persistence_id() == &ids[1])
        .unwrap()
        .request_shutdown();

    let (kill, remove) = cluster.nodes_to_kill_or_remove();

    assert!(kill.is_empty());
    assert_eq!(remove, vec![ids[1].clone()]);
}

#[test]
fn rolling_restart_moves_one_node_at_a_time() {
    let (mut cluster, ids) = given_cluster_with_nodes(2);
    given_started(&mut cluster, &ids[0]);
    given_started(&mut cluster, &ids[1]);

    assert!(cluster.rolling_restart());
    assert!(!cluster.rolling_restart());
    assert_eq!(cluster.restart_generation(), 1);

    let (first, changed) = cluster.next_restart();
    let first = first.unwrap();
    assert!(changed);
    assert_eq!(
        cluster.nodes()[&first].destination_state(),
        DestinationState::Restarting
    );
    assert_eq!(cluster.next_restart(), (None, false));

    cluster
        .nodes_mut()
        .find(|n| n.persistence_id() == &first)
        .unwrap()
        .mark_killing();
    report(&mut cluster, &first, TaskState::Killed);
    given_started(&mut cluster, &first);
    assert!(cluster.nodes()[&first].has_restarted(1));

    let (second, _) = cluster.next_restart();
    let second = second.unwrap();
    assert_ne!(second, first);
    report(&mut cluster, &second, TaskState::Killed);
    given_started(&mut cluster, &second);

    assert_eq!(cluster.next_restart(), (None, true));
    assert!(!cluster.is_restarting());
}

#[test]
fn reconciliation_is_rate_limited_per_node() {
    let (mut cluster, ids) = given_cluster_with_nodes(2);
    launch(&mut cluster, &ids[0]);
    let now = Instant::now();
    let interval = Duration::from_secs(5);

    let first = cluster.tasks_to_reconcile(interval, now);
    let again = cluster.tasks_to_reconcile(interval, now + Duration::from_secs(1));
    let later = cluster.tasks_to_reconcile(interval, now + Duration::from_secs(6));

    assert_eq!(first.len(), 1, "never launched nodes are not reconciled");
    assert_eq!(first[0].state, TaskState::Error);
    assert!(again.is_empty());
    assert_eq!(later.len(), 1);

    report(&mut cluster, &ids[0], TaskState::Running);
    assert!(cluster
        .tasks_to_reconcile(interval, now + Duration::from_secs(60))
        .is_empty());
}

#[test]
fn joinable_peers_exclude_the_subject() {
    let (mut cluster, ids) = given_cluster_with_nodes(3);
    given_started(&mut cluster, &ids[0]);
    given_started(&mut cluster, &ids[1]);
    launch(&mut cluster, &ids[2]);

    let subject = cluster.nodes()[&ids[0]].name();
    let peers = cluster.joinable_peers(&subject);

    assert_eq!(peers.len(), 1);
    assert!(peers[0].fully_qualified_node_name.starts_with(&cluster.nodes()[&ids[1]].name()));
    assert_eq!(
        cluster.nodes()[&ids[2]].current_state(),
        CurrentState::Starting
    );
}

#[test]
fn configuration_blobs_round_trip() {
    let mut cluster = Cluster::new("prod");
    cluster.set_database_config("ring_size = 64");
    cluster.set_advanced_config("[{riak_kv, []}].");

    let restored: Cluster =
        serde_json::from_str(&serde_json::to_string(&cluster).unwrap()).unwrap();

    assert_eq!(restored.database_config(), "ring_size = 64");
    assert_eq!(restored.advanced_config(), "[{riak_kv, []}].");
}

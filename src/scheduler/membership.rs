use super::ports::{MembershipReply, NodeManagement};
use crate::node::TaskData;
use std::time::Duration;
use tracing::{error, info, warn};

/// Bounded retry policy for join and leave calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for MembershipPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: Duration::from_secs(5),
        }
    }
}

enum Membership {
    Join,
    Leave,
}

impl Membership {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
        }
    }
}

/// Joins a freshly started node into the ring through one of its started
/// peers. A cluster of one has nothing to join.
pub async fn join_cluster<M>(
    management: &M,
    node: &TaskData,
    peers: &[TaskData],
    policy: &MembershipPolicy,
) -> bool
where
    M: NodeManagement + ?Sized,
{
    run(management, Membership::Join, node, peers, policy).await
}

/// Has a remaining peer force the node out of the ring. Best effort: the
/// outcome is only logged.
pub async fn leave_cluster<M>(
    management: &M,
    node: &TaskData,
    peers: &[TaskData],
    policy: &MembershipPolicy,
) -> bool
where
    M: NodeManagement + ?Sized,
{
    run(management, Membership::Leave, node, peers, policy).await
}

async fn run<M>(
    management: &M,
    kind: Membership,
    node: &TaskData,
    peers: &[TaskData],
    policy: &MembershipPolicy,
) -> bool
where
    M: NodeManagement + ?Sized,
{
    let name = &node.fully_qualified_node_name;
    if peers.is_empty() {
        info!("Node {} has no started peers, skipping {}", name, kind.as_str());
        return true;
    }

    for attempt in 1..=policy.max_retries.max(1) {
        for peer in peers {
            let reply = match kind {
                Membership::Join => management.join(node, peer).await,
                Membership::Leave => management.force_remove(peer, node).await,
            };
            match reply {
                Ok(MembershipReply::Success) => {
                    info!(
                        "Node {} {} via {} succeeded",
                        name,
                        kind.as_str(),
                        peer.fully_qualified_node_name
                    );
                    return true;
                }
                Ok(MembershipReply::AlreadyDone) => {
                    info!("Node {} {} was already done", name, kind.as_str());
                    return true;
                }
                Ok(MembershipReply::Failed(reason)) => warn!(
                    "Node {} {} via {} refused (attempt {}): {}",
                    name,
                    kind.as_str(),
                    peer.fully_qualified_node_name,
                    attempt,
                    reason
                ),
                Err(e) => warn!(
                    "Node {} {} via {} failed (attempt {}): {}",
                    name,
                    kind.as_str(),
                    peer.fully_qualified_node_name,
                    attempt,
                    e
                ),
            }
        }
        if attempt < policy.max_retries {
            tokio::time::sleep(policy.backoff).await;
        }
    }

    error!(
        "Node {} gave up on {} after {} attempts",
        name,
        kind.as_str(),
        policy.max_retries.max(1)
    );
    false
}

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! The control loop: offer matching, status dispatch, membership side
//! effects, operator entry points and the event loop tying them together.

mod control_loop;
mod dispatch;
mod events;
mod matching;
mod membership;
mod operator;
mod ports;

pub use control_loop::{HousekeepingReport, SchedulerCore, SchedulerSettings};
pub use dispatch::DispatchOutcome;
pub use events::{EventLoop, SchedulerEvent, EVENT_QUEUE_CAPACITY};
pub use matching::OfferDecision;
pub use membership::{join_cluster, leave_cluster, MembershipPolicy};
pub use operator::{
    cluster_config, list_clusters, validate_cluster_name, ClusterSummary, ConfigBlob,
    NodeSummary, OperatorRequest, QueuedRequest, RequestOutcome,
};
pub use ports::{
    MembershipReply, NodeManagement, OperatorInbox, PortFuture, SchedulerDriver, StateStore,
};

/// Everything the control loop talks to.
pub trait SchedulerPorts: StateStore + OperatorInbox + SchedulerDriver + NodeManagement {}

impl<T> SchedulerPorts for T where T: StateStore + OperatorInbox + SchedulerDriver + NodeManagement {}

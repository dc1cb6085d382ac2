use super::operator::{QueuedRequest, RequestOutcome};
use crate::node::TaskData;
use crate::resources::OfferOperation;
use crate::state::SchedulerRuntimeState;
use crate::types::{OfferId, TaskId, TaskStatus};
use crate::Result;
use std::future::Future;
use std::pin::Pin;

pub type PortFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Durable home of the scheduler aggregate.
pub trait StateStore: Send + Sync {
    fn load(&self) -> PortFuture<'_, Option<SchedulerRuntimeState>>;
    fn persist<'a>(&'a self, state: &'a SchedulerRuntimeState) -> PortFuture<'a, ()>;
}

/// Queue of operator requests submitted from outside the scheduler process.
pub trait OperatorInbox: Send + Sync {
    /// Requests with an id greater than `after`, oldest first.
    fn pending_requests(&self, after: i64) -> PortFuture<'_, Vec<QueuedRequest>>;

    fn complete_request<'a>(&'a self, id: i64, outcome: &'a RequestOutcome) -> PortFuture<'a, ()>;
}

/// Calls back into the cluster master.
pub trait SchedulerDriver: Send + Sync {
    fn accept_offers<'a>(
        &'a self,
        offer_id: &'a OfferId,
        operations: Vec<OfferOperation>,
        refuse_seconds: f64,
    ) -> PortFuture<'a, ()>;

    fn decline_offer<'a>(&'a self, offer_id: &'a OfferId, refuse_seconds: f64)
        -> PortFuture<'a, ()>;

    fn reconcile_tasks(&self, statuses: Vec<TaskStatus>) -> PortFuture<'_, ()>;

    fn kill_task<'a>(&'a self, task_id: &'a TaskId) -> PortFuture<'a, ()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipReply {
    Success,
    /// The target was already in the requested state.
    AlreadyDone,
    Failed(String),
}

/// Management API of a running database node.
pub trait NodeManagement: Send + Sync {
    /// Asks `acting` to join `target` into its ring.
    fn join<'a>(&'a self, acting: &'a TaskData, target: &'a TaskData)
        -> PortFuture<'a, MembershipReply>;

    /// Asks `acting` to force `target` out of its ring.
    fn force_remove<'a>(
        &'a self,
        acting: &'a TaskData,
        target: &'a TaskData,
    ) -> PortFuture<'a, MembershipReply>;
}

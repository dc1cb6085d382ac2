#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Periodic re-query of task statuses the scheduler has not heard about.
//! Only reads node identifiers; state changes arrive as status updates.

use crate::error::Result;
use crate::scheduler::SchedulerDriver;
use crate::types::TaskStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Sends explicit reconciliation requests while enabled. Disabled until the
/// framework is registered.
pub struct ReconciliationServer<D: ?Sized> {
    driver: Arc<D>,
    enabled: AtomicBool,
}

impl<D> ReconciliationServer<D>
where
    D: SchedulerDriver + ?Sized,
{
    #[must_use]
    pub const fn new(driver: Arc<D>) -> Self {
        Self {
            driver,
            enabled: AtomicBool::new(false),
        }
    }

    pub fn enable(&self) {
        if !self.enabled.swap(true, Ordering::SeqCst) {
            info!("Reconciliation enabled");
        }
    }

    pub fn disable(&self) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            info!("Reconciliation disabled");
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Asks the cluster master about `statuses`. Returns how many were sent;
    /// nothing is sent, or queued, while disabled.
    ///
    /// # Errors
    /// Returns the driver error if the request could not be sent.
    pub async fn reconcile(&self, statuses: Vec<TaskStatus>) -> Result<usize> {
        if !self.is_enabled() {
            debug!("Reconciliation disabled, dropping {} statuses", statuses.len());
            return Ok(0);
        }
        if statuses.is_empty() {
            return Ok(0);
        }

        let count = statuses.len();
        let task_ids: Vec<String> = statuses.iter().map(|s| s.task_id.to_string()).collect();
        info!("Reconciling tasks {:?}", task_ids);
        self.driver.reconcile_tasks(statuses).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::ReconciliationServer;
    use crate::error::OrchestratorError;
    use crate::resources::OfferOperation;
    use crate::scheduler::{PortFuture, SchedulerDriver};
    use crate::types::{OfferId, TaskId, TaskState, TaskStatus};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingDriver {
        reconciled: Mutex<Vec<Vec<TaskStatus>>>,
        failing: bool,
    }

    impl SchedulerDriver for RecordingDriver {
        fn accept_offers<'a>(
            &'a self,
            _offer_id: &'a OfferId,
            _operations: Vec<OfferOperation>,
            _refuse_seconds: f64,
        ) -> PortFuture<'a, ()> {
            Box::pin(async move { Ok(()) })
        }

        fn decline_offer<'a>(
            &'a self,
            _offer_id: &'a OfferId,
            _refuse_seconds: f64,
        ) -> PortFuture<'a, ()> {
            Box::pin(async move { Ok(()) })
        }

        fn reconcile_tasks(&self, statuses: Vec<TaskStatus>) -> PortFuture<'_, ()> {
            Box::pin(async move {
                if self.failing {
                    return Err(OrchestratorError::DriverError("master gone".to_string()));
                }
                self.reconciled.lock().await.push(statuses);
                Ok(())
            })
        }

        fn kill_task<'a>(&'a self, _task_id: &'a TaskId) -> PortFuture<'a, ()> {
            Box::pin(async move { Ok(()) })
        }
    }

    fn statuses() -> Vec<TaskStatus> {
        vec![TaskStatus::new(
            TaskId::new("riak-prod-1", 2),
            TaskState::Running,
            None,
        )]
    }

    #[tokio::test]
    async fn when_not_registered_then_nothing_is_sent() {
        let driver = Arc::new(RecordingDriver::default());
        let server = ReconciliationServer::new(Arc::clone(&driver));

        assert_eq!(server.reconcile(statuses()).await.unwrap(), 0);
        assert!(driver.reconciled.lock().await.is_empty());
    }

    #[tokio::test]
    async fn enabled_server_sends_statuses_until_disabled() {
        let driver = Arc::new(RecordingDriver::default());
        let server = ReconciliationServer::new(Arc::clone(&driver));

        server.enable();
        assert_eq!(server.reconcile(statuses()).await.unwrap(), 1);
        assert_eq!(server.reconcile(Vec::new()).await.unwrap(), 0);
        server.disable();
        assert_eq!(server.reconcile(statuses()).await.unwrap(), 0);

        let sent = driver.reconciled.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][0].task_id.to_string(), "riak-prod-1.2");
    }

    #[tokio::test]
    async fn driver_failure_is_returned() {
        let driver = Arc::new(RecordingDriver {
            failing: true,
            ..RecordingDriver::default()
        });
        let server = ReconciliationServer::new(driver);
        server.enable();

        let result = server.reconcile(statuses()).await;

        assert!(matches!(result, Err(OrchestratorError::DriverError(_))));
    }
}

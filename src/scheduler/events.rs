use super::control_loop::SchedulerCore;
use super::SchedulerPorts;
use crate::error::{OrchestratorError, Result};
use crate::reconciliation::ReconciliationServer;
use crate::resources::Offer;
use crate::types::{FrameworkId, OfferId, TaskStatus};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Callbacks from the cluster master, as queued for the event loop.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    Registered(FrameworkId),
    Reregistered,
    Disconnected,
    Offers(Vec<Offer>),
    StatusUpdate(TaskStatus),
    OfferRescinded(OfferId),
    Error(String),
}

impl SchedulerEvent {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Registered(_) => "registered",
            Self::Reregistered => "reregistered",
            Self::Disconnected => "disconnected",
            Self::Offers(_) => "offers",
            Self::StatusUpdate(_) => "status_update",
            Self::OfferRescinded(_) => "offer_rescinded",
            Self::Error(_) => "error",
        }
    }
}

/// Serializes master callbacks and the reconciliation tick onto one task.
pub struct EventLoop<P> {
    core: SchedulerCore<P>,
    reconciliation: ReconciliationServer<P>,
    events: mpsc::Receiver<SchedulerEvent>,
    shutdown: CancellationToken,
}

impl<P> EventLoop<P>
where
    P: SchedulerPorts + 'static,
{
    #[must_use]
    pub fn new(
        core: SchedulerCore<P>,
        events: mpsc::Receiver<SchedulerEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        let reconciliation = ReconciliationServer::new(Arc::clone(core.ports()));
        Self {
            core,
            reconciliation,
            events,
            shutdown,
        }
    }

    #[must_use]
    pub const fn core(&self) -> &SchedulerCore<P> {
        &self.core
    }

    #[must_use]
    pub const fn reconciliation(&self) -> &ReconciliationServer<P> {
        &self.reconciliation
    }

    /// # Errors
    /// Returns fatal errors, and the master's error callback, which end the
    /// loop.
    pub async fn handle(&self, event: SchedulerEvent) -> Result<()> {
        match event {
            SchedulerEvent::Registered(framework_id) => {
                self.core.register(framework_id).await?;
                self.reconciliation.enable();
                self.reconcile().await
            }
            SchedulerEvent::Reregistered => {
                info!("Re-registered with the cluster master");
                self.reconciliation.enable();
                self.reconcile().await
            }
            SchedulerEvent::Disconnected => {
                warn!("Disconnected from the cluster master");
                self.reconciliation.disable();
                Ok(())
            }
            SchedulerEvent::Offers(offers) => self.core.handle_offers(offers).await.map(|_| ()),
            SchedulerEvent::StatusUpdate(status) => {
                self.core.handle_status(status).await.map(|_| ())
            }
            SchedulerEvent::OfferRescinded(offer_id) => {
                self.core.offer_rescinded(&offer_id);
                Ok(())
            }
            SchedulerEvent::Error(message) => Err(OrchestratorError::DriverError(format!(
                "Cluster master reported an error: {message}"
            ))),
        }
    }

    /// One timer tick: queued operator requests, housekeeping, then a
    /// reconciliation request for whatever is still unreconciled.
    ///
    /// # Errors
    /// Returns a store error if the inbox cannot be read or the state cannot
    /// persist.
    pub async fn tick(&self) -> Result<()> {
        self.core.drain_operator_requests().await?;
        self.core.housekeeping().await?;
        self.reconcile().await
    }

    async fn reconcile(&self) -> Result<()> {
        if !self.reconciliation.is_enabled() {
            return Ok(());
        }
        let statuses = self.core.tasks_to_reconcile(Instant::now()).await;
        if let Err(e) = self.reconciliation.reconcile(statuses).await {
            warn!("Reconciliation request failed: {}", e);
        }
        Ok(())
    }

    /// Runs until shutdown, the queue closing, or a fatal error.
    ///
    /// # Errors
    /// Returns the error that stopped the loop.
    pub async fn run(mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.core.settings().reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Scheduler event loop started");

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    info!("Scheduler event loop shutting down");
                    break;
                }

                event = self.events.recv() => {
                    let Some(event) = event else {
                        info!("Scheduler event queue closed");
                        break;
                    };
                    let kind = event.as_str();
                    if let Err(e) = self.handle(event).await {
                        if ends_loop(&e) {
                            error!("Fatal error handling {} event: {}", kind, e);
                            return Err(e);
                        }
                        warn!("Handling {} event failed: {}", kind, e);
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        if ends_loop(&e) {
                            error!("Fatal error during reconciliation tick: {}", e);
                            return Err(e);
                        }
                        warn!("Reconciliation tick failed: {}", e);
                    }
                }
            }
        }

        info!("Scheduler event loop stopped");
        Ok(())
    }
}

const fn ends_loop(error: &OrchestratorError) -> bool {
    error.is_fatal() || matches!(error, OrchestratorError::DriverError(_))
}

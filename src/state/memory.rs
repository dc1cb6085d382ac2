use super::SchedulerRuntimeState;
use crate::error::{OrchestratorError, Result};
use crate::scheduler::{
    OperatorInbox, OperatorRequest, PortFuture, QueuedRequest, RequestOutcome, StateStore,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-process store keeping the serialized payload, for tests and
/// throwaway runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    payload: Arc<Mutex<Option<String>>>,
    persists: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    inbox: Arc<Mutex<Vec<QueuedRequest>>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn persist_count(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }

    /// Makes every following persist fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn payload(&self) -> Option<String> {
        self.payload.lock().await.clone()
    }

    /// Queues an operator request and returns its id.
    ///
    /// # Errors
    /// Returns a config error if the request fails validation.
    pub async fn submit_request(&self, request: OperatorRequest) -> Result<i64> {
        request.validate()?;
        let mut inbox = self.inbox.lock().await;
        let id = inbox.last().map_or(1, |queued| queued.id + 1);
        inbox.push(QueuedRequest {
            id,
            request,
            outcome: None,
        });
        Ok(id)
    }

    pub async fn request_record(&self, id: i64) -> Option<QueuedRequest> {
        self.inbox
            .lock()
            .await
            .iter()
            .find(|queued| queued.id == id)
            .cloned()
    }
}

impl OperatorInbox for MemoryStateStore {
    fn pending_requests(&self, after: i64) -> PortFuture<'_, Vec<QueuedRequest>> {
        Box::pin(async move {
            Ok(self
                .inbox
                .lock()
                .await
                .iter()
                .filter(|queued| queued.id > after)
                .cloned()
                .collect())
        })
    }

    fn complete_request<'a>(&'a self, id: i64, outcome: &'a RequestOutcome) -> PortFuture<'a, ()> {
        Box::pin(async move {
            let mut inbox = self.inbox.lock().await;
            let queued = inbox
                .iter_mut()
                .find(|queued| queued.id == id)
                .ok_or_else(|| OrchestratorError::NotFound(format!("Operator request {id}")))?;
            queued.outcome = Some(outcome.clone());
            Ok(())
        })
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> PortFuture<'_, Option<SchedulerRuntimeState>> {
        Box::pin(async move {
            self.payload
                .lock()
                .await
                .as_deref()
                .map(SchedulerRuntimeState::from_json)
                .transpose()
        })
    }

    fn persist<'a>(&'a self, state: &'a SchedulerRuntimeState) -> PortFuture<'a, ()> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(OrchestratorError::StoreError(
                    "simulated persist failure".to_string(),
                ));
            }
            let payload = state.to_json()?;
            *self.payload.lock().await = Some(payload);
            self.persists.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

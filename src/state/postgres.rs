use super::SchedulerRuntimeState;
use crate::error::{OrchestratorError, Result};
use crate::scheduler::{
    OperatorInbox, OperatorRequest, PortFuture, QueuedRequest, RequestOutcome, StateStore,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const SCHEMA_STATEMENTS: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS scheduler_state (
        framework_name TEXT PRIMARY KEY,
        payload JSONB NOT NULL,
        version BIGINT NOT NULL DEFAULT 1,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS operator_requests (
        id BIGSERIAL PRIMARY KEY,
        framework_name TEXT NOT NULL,
        request JSONB NOT NULL,
        outcome JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        completed_at TIMESTAMPTZ
    )",
    "CREATE INDEX IF NOT EXISTS operator_requests_framework_idx
        ON operator_requests (framework_name, id)",
];

/// One row per framework instance, written with optimistic versioning, plus
/// the operator request inbox.
///
/// The scheduler process is the only writer of the state row. A version
/// conflict means someone else wrote it; persist then fails without writing,
/// and the row must be reloaded before any further write can succeed.
pub struct PgStateStore {
    pool: PgPool,
    framework_name: String,
    max_retries: u32,
    version: Mutex<Option<i64>>,
}

impl PgStateStore {
    #[must_use]
    pub fn new(pool: PgPool, framework_name: impl Into<String>, max_retries: u32) -> Self {
        Self {
            pool,
            framework_name: framework_name.into(),
            max_retries,
            version: Mutex::new(None),
        }
    }

    /// # Errors
    /// Returns an error if the database connection fails.
    pub async fn connect(
        database_url: &str,
        framework_name: impl Into<String>,
        max_retries: u32,
    ) -> Result<Self> {
        PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_millis(3_000))
            .connect(database_url)
            .await
            .map(|pool| Self::new(pool, framework_name, max_retries))
            .map_err(|e| OrchestratorError::StoreError(format!("Failed to connect to database: {e}")))
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub async fn initialize_schema(&self) -> Result<()> {
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    OrchestratorError::StoreError(format!("Failed to initialize schema: {e}"))
                })?;
        }
        Ok(())
    }

    /// Queues an operator request for the running scheduler and returns its id.
    ///
    /// # Errors
    /// Returns a config error if the request fails validation, or a store error.
    pub async fn submit_request(&self, request: &OperatorRequest) -> Result<i64> {
        request.validate()?;
        let body = serde_json::to_string(request)?;
        let queue_error =
            |e: sqlx::Error| OrchestratorError::StoreError(format!("Failed to queue request: {e}"));

        // Submissions are serialized so ids commit in order and the drain never
        // skips one.
        let mut tx = self.pool.begin().await.map_err(queue_error)?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&self.framework_name)
            .execute(&mut *tx)
            .await
            .map_err(queue_error)?;
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO operator_requests (framework_name, request)
             VALUES ($1, $2::jsonb)
             RETURNING id",
        )
        .bind(&self.framework_name)
        .bind(body)
        .fetch_one(&mut *tx)
        .await
        .map_err(queue_error)?;
        tx.commit().await.map_err(queue_error)?;
        Ok(id)
    }

    /// # Errors
    /// Returns not-found for an unknown id, or a store error.
    pub async fn request_record(&self, id: i64) -> Result<QueuedRequest> {
        let row = sqlx::query_as::<_, (i64, String, Option<String>)>(
            "SELECT id, request::text, outcome::text FROM operator_requests
             WHERE framework_name = $1 AND id = $2",
        )
        .bind(&self.framework_name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OrchestratorError::StoreError(format!("Failed to read request: {e}")))?
        .ok_or_else(|| OrchestratorError::NotFound(format!("Operator request {id}")))?;
        queued_from_row(row)
    }

    async fn write(&self, payload: &str, expected: Option<i64>) -> Result<Option<i64>> {
        let written = match expected {
            None => {
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO scheduler_state (framework_name, payload, version, updated_at)
                     VALUES ($1, $2::jsonb, 1, NOW())
                     ON CONFLICT (framework_name) DO NOTHING
                     RETURNING version",
                )
                .bind(&self.framework_name)
                .bind(payload)
                .fetch_optional(&self.pool)
                .await
            }
            Some(version) => {
                sqlx::query_scalar::<_, i64>(
                    "UPDATE scheduler_state
                     SET payload = $2::jsonb, version = version + 1, updated_at = NOW()
                     WHERE framework_name = $1 AND version = $3
                     RETURNING version",
                )
                .bind(&self.framework_name)
                .bind(payload)
                .bind(version)
                .fetch_optional(&self.pool)
                .await
            }
        };
        written.map_err(|e| OrchestratorError::StoreError(format!("Failed to write state: {e}")))
    }
}

impl StateStore for PgStateStore {
    fn load(&self) -> PortFuture<'_, Option<SchedulerRuntimeState>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, (String, i64)>(
                "SELECT payload::text, version FROM scheduler_state WHERE framework_name = $1",
            )
            .bind(&self.framework_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OrchestratorError::StoreError(format!("Failed to load state: {e}")))?;

            let Some((payload, version)) = row else {
                *self.version.lock().await = None;
                return Ok(None);
            };
            let state = SchedulerRuntimeState::from_json(&payload)?;
            *self.version.lock().await = Some(version);
            Ok(Some(state))
        })
    }

    fn persist<'a>(&'a self, state: &'a SchedulerRuntimeState) -> PortFuture<'a, ()> {
        Box::pin(async move {
            let payload = state.to_json()?;
            let mut version = self.version.lock().await;

            for attempt in 0..=self.max_retries {
                match self.write(&payload, *version).await {
                    Ok(Some(written)) => {
                        debug!(
                            "Persisted state for {} at version {}",
                            self.framework_name, written
                        );
                        *version = Some(written);
                        return Ok(());
                    }
                    Ok(None) => {
                        warn!(
                            "State for {} changed since version {:?}; not overwriting",
                            self.framework_name, *version
                        );
                        return Err(OrchestratorError::StoreError(format!(
                            "State for {} was modified by another writer; reload before writing",
                            self.framework_name
                        )));
                    }
                    Err(e) => warn!("Persist attempt {} failed: {}", attempt + 1, e),
                }
            }

            Err(OrchestratorError::StoreError(format!(
                "Failed to persist state for {} after {} attempts",
                self.framework_name,
                self.max_retries + 1
            )))
        })
    }
}

fn queued_from_row((id, request, outcome): (i64, String, Option<String>)) -> Result<QueuedRequest> {
    Ok(QueuedRequest {
        id,
        request: serde_json::from_str(&request)?,
        outcome: outcome.as_deref().map(serde_json::from_str).transpose()?,
    })
}

impl OperatorInbox for PgStateStore {
    fn pending_requests(&self, after: i64) -> PortFuture<'_, Vec<QueuedRequest>> {
        Box::pin(async move {
            sqlx::query_as::<_, (i64, String, Option<String>)>(
                "SELECT id, request::text, outcome::text FROM operator_requests
                 WHERE framework_name = $1 AND id > $2
                 ORDER BY id",
            )
            .bind(&self.framework_name)
            .bind(after)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OrchestratorError::StoreError(format!("Failed to read requests: {e}")))?
            .into_iter()
            .map(queued_from_row)
            .collect()
        })
    }

    fn complete_request<'a>(&'a self, id: i64, outcome: &'a RequestOutcome) -> PortFuture<'a, ()> {
        Box::pin(async move {
            let body = serde_json::to_string(outcome)?;
            sqlx::query(
                "UPDATE operator_requests SET outcome = $3::jsonb, completed_at = NOW()
                 WHERE framework_name = $1 AND id = $2",
            )
            .bind(&self.framework_name)
            .bind(id)
            .bind(body)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| OrchestratorError::StoreError(format!("Failed to record outcome: {e}")))
        })
    }
}

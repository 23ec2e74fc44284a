//! tests/support.rs
//! Helpers compartidos: base SQLite en memoria, proveedor stub y stores
//! que fallan o registran transiciones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sqlx::sqlite::SqlitePoolOptions;

use crate::config::app_config::StorageRetryConfig;
use crate::errors::{ProviderError, StorageError};
use crate::models::outreach_model::{
    AgentSelector, NewOutreachRecord, OutreachKind, OutreachRecord, OutreachStatus,
    StatusUpdate,
};
use crate::services::outreach_service::{OutreachService, OutreachStore};
use crate::services::provider_client::{OutreachProvider, ProviderReceipt};

/// Base en memoria con migraciones aplicadas. Una sola conexión: cada
/// conexión nueva a `sqlite::memory:` es una base distinta.
pub async fn memory_store() -> OutreachService {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");
    let service = OutreachService::new(pool);
    service
        .run_migrations()
        .await
        .expect("Failed to run migrations");
    service
}

pub fn fast_retry() -> StorageRetryConfig {
    StorageRetryConfig {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        start_attempts: 3,
        reconcile_attempts: 5,
    }
}

pub fn sample_record(kind: OutreachKind) -> OutreachRecord {
    let now = Utc::now();
    OutreachRecord {
        id: "rec-1".to_string(),
        kind,
        customer_id: 7,
        to_number: "+15551234567".to_string(),
        from_number: "+15557654321".to_string(),
        message_content: match kind {
            OutreachKind::Text => Some("Your offer expires Friday".to_string()),
            OutreachKind::Call => None,
        },
        agent_id: Some("agent-1".to_string()),
        agent_template_id: None,
        initialization_values: None,
        provider_reference_id: None,
        status: OutreachStatus::Pending,
        error_detail: None,
        created_at: now,
        updated_at: now,
    }
}

/// Consulta hasta que el registro llega a un estado terminal.
pub async fn wait_for_terminal(store: &dyn OutreachStore, id: &str) -> OutreachRecord {
    for _ in 0..500 {
        let record = store
            .get_by_id(id)
            .await
            .expect("get_by_id failed")
            .expect("record missing");
        if record.status.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("record {} never reached a terminal status", id);
}

#[derive(Debug, Clone)]
pub enum StubBehavior {
    Succeed(String),
    Fail(String),
}

/// Lo que recibió el proveedor stub en una invocación.
#[derive(Debug, Clone)]
pub struct StubCall {
    pub kind: OutreachKind,
    pub to_number: String,
    pub message: Option<String>,
    pub agent_selector: Option<AgentSelector>,
}

/// Proveedor stub: comportamiento por defecto más excepciones por destino.
pub struct StubProvider {
    default: StubBehavior,
    overrides: HashMap<String, StubBehavior>,
    delay: Duration,
    calls: Mutex<Vec<StubCall>>,
}

impl StubProvider {
    pub fn succeeding(reference: &str) -> Self {
        Self::new(StubBehavior::Succeed(reference.to_string()))
    }

    pub fn failing(message: &str) -> Self {
        Self::new(StubBehavior::Fail(message.to_string()))
    }

    pub fn new(default: StubBehavior) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_override(mut self, to_number: &str, behavior: StubBehavior) -> Self {
        self.overrides.insert(to_number.to_string(), behavior);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<StubCall> {
        self.calls.lock().clone()
    }

    async fn respond(&self, call: StubCall) -> Result<ProviderReceipt, ProviderError> {
        let behavior = self
            .overrides
            .get(&call.to_number)
            .cloned()
            .unwrap_or_else(|| self.default.clone());
        self.calls.lock().push(call);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match behavior {
            StubBehavior::Succeed(reference) => Ok(ProviderReceipt {
                provider_reference_id: reference,
            }),
            StubBehavior::Fail(message) => Err(ProviderError {
                status_code: Some(500),
                body: Some(message.clone()),
                message,
            }),
        }
    }
}

#[async_trait]
impl OutreachProvider for StubProvider {
    async fn place_call(
        &self,
        to_number: &str,
        _from_number: &str,
        agent_selector: &AgentSelector,
        _initialization_values: Option<&serde_json::Value>,
    ) -> Result<ProviderReceipt, ProviderError> {
        self.respond(StubCall {
            kind: OutreachKind::Call,
            to_number: to_number.to_string(),
            message: None,
            agent_selector: Some(agent_selector.clone()),
        })
        .await
    }

    async fn send_text(
        &self,
        to_number: &str,
        _from_number: &str,
        message: &str,
        agent_selector: Option<&AgentSelector>,
        _initialization_values: Option<&serde_json::Value>,
    ) -> Result<ProviderReceipt, ProviderError> {
        self.respond(StubCall {
            kind: OutreachKind::Text,
            to_number: to_number.to_string(),
            message: Some(message.to_string()),
            agent_selector: agent_selector.cloned(),
        })
        .await
    }
}

/// Cómo falla un [`FlakyStore`] en `update_status`.
#[derive(Debug, Clone, Copy)]
pub enum Flake {
    /// Falla antes de escribir.
    Reject,
    /// Escribe y aun así reporta una falla.
    CommitThenFail,
}

/// Envuelve un store y hace fallar con un error transitorio las primeras
/// `failures` escrituras cuyo destino es `target`.
pub struct FlakyStore {
    inner: Arc<dyn OutreachStore>,
    target: OutreachStatus,
    flake: Flake,
    remaining: AtomicUsize,
    pub attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new(
        inner: Arc<dyn OutreachStore>,
        target: OutreachStatus,
        flake: Flake,
        failures: usize,
    ) -> Self {
        Self {
            inner,
            target,
            flake,
            remaining: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }

    fn take_failure(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl OutreachStore for FlakyStore {
    async fn create(&self, record: NewOutreachRecord) -> Result<String, StorageError> {
        self.inner.create(record).await
    }

    async fn update_status(&self, id: &str, update: &StatusUpdate) -> Result<bool, StorageError> {
        if update.status() != self.target {
            return self.inner.update_status(id, update).await;
        }
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.take_failure() {
            return self.inner.update_status(id, update).await;
        }
        if let Flake::CommitThenFail = self.flake {
            self.inner.update_status(id, update).await?;
        }
        Err(StorageError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<OutreachRecord>, StorageError> {
        self.inner.get_by_id(id).await
    }

    async fn list_unfinished(&self) -> Result<Vec<OutreachRecord>, StorageError> {
        self.inner.list_unfinished().await
    }
}

/// Envuelve un store y anota cada estado que realmente se escribió.
pub struct RecordingStore {
    inner: Arc<dyn OutreachStore>,
    history: Mutex<HashMap<String, Vec<OutreachStatus>>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn OutreachStore>) -> Self {
        Self {
            inner,
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn history(&self, id: &str) -> Vec<OutreachStatus> {
        self.history.lock().get(id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl OutreachStore for RecordingStore {
    async fn create(&self, record: NewOutreachRecord) -> Result<String, StorageError> {
        let id = self.inner.create(record).await?;
        self.history
            .lock()
            .insert(id.clone(), vec![OutreachStatus::Pending]);
        Ok(id)
    }

    async fn update_status(&self, id: &str, update: &StatusUpdate) -> Result<bool, StorageError> {
        let applied = self.inner.update_status(id, update).await?;
        if applied {
            self.history
                .lock()
                .entry(id.to_string())
                .or_default()
                .push(update.status());
        }
        Ok(applied)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<OutreachRecord>, StorageError> {
        self.inner.get_by_id(id).await
    }

    async fn list_unfinished(&self) -> Result<Vec<OutreachRecord>, StorageError> {
        self.inner.list_unfinished().await
    }
}

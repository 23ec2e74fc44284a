//! services/dispatch_workflow.rs
//! Flujo de despacho de un registro de outreach (llamada o texto).
//!
//! Cada ejecución lleva un registro por
//! `pending -> initiating|sending -> initiated|sent|failed`. Cada transición
//! se confirma antes del siguiente paso y solo se reintentan escrituras en
//! DB. El proveedor se llama como máximo una vez por registro: si el
//! registro ya está en vuelo se trata como una reejecución tras una caída y
//! se cierra como fallido sin volver a llamar al proveedor.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::app_config::StorageRetryConfig;
use crate::errors::{DispatchError, ProviderError, StorageError};
use crate::models::outreach_model::{
    AgentSelector, OutreachKind, OutreachRecord, OutreachStatus, StatusUpdate,
};
use crate::services::outreach_service::OutreachStore;
use crate::services::provider_client::{OutreachProvider, ProviderReceipt};

/// `error_detail` que se escribe cuando el registro ya estaba en vuelo.
pub const INTERRUPTED_DETAIL: &str =
    "Dispatch interrupted before the provider result was recorded; check with the provider before retrying";

/// Cómo terminó una ejecución. Un fallo del proveedor es un resultado, no un error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Succeeded { provider_reference_id: String },
    Failed { error_detail: String },
    Interrupted { error_detail: String },
    AlreadyTerminal { status: OutreachStatus },
}

/// Lo que necesita el paso del proveedor, validado antes de intentarlo.
enum DispatchTarget<'a> {
    Call {
        agent_selector: AgentSelector,
    },
    Text {
        message: &'a str,
        agent_selector: Option<AgentSelector>,
    },
}

#[derive(Clone)]
pub struct DispatchWorkflow {
    store: Arc<dyn OutreachStore>,
    provider: Arc<dyn OutreachProvider>,
    retry: StorageRetryConfig,
}

impl DispatchWorkflow {
    pub fn new(
        store: Arc<dyn OutreachStore>,
        provider: Arc<dyn OutreachProvider>,
        retry: StorageRetryConfig,
    ) -> Self {
        Self {
            store,
            provider,
            retry,
        }
    }

    pub async fn run(&self, record_id: &str) -> Result<DispatchOutcome, DispatchError> {
        log::info!("(run) Iniciando despacho record_id={}", record_id);

        let store = self.store.as_ref();
        let record = self
            .with_storage_retry("load record", record_id, self.retry.start_attempts, move || {
                store.get_by_id(record_id)
            })
            .await?
            .ok_or_else(|| StorageError::NotFound(record_id.to_string()))?;

        if record.status.is_terminal() {
            log::info!(
                "(run) record_id={} ya está en estado terminal '{}', nada que hacer.",
                record_id,
                record.status
            );
            return Ok(DispatchOutcome::AlreadyTerminal {
                status: record.status,
            });
        }

        if record.status.is_in_flight() {
            return self.close_interrupted(&record).await;
        }

        // 1) pending -> initiating|sending, antes de tocar el proveedor
        self.apply(
            &record,
            StatusUpdate::start(record.kind),
            "mark in flight",
            self.retry.start_attempts,
        )
        .await?;
        log::info!(
            "(run) record_id={} marcado '{}'",
            record_id,
            record.kind.in_flight_status()
        );

        // 2) Precondiciones; intake ya debió rechazar cualquier violación
        let target = match dispatch_target(&record) {
            Ok(target) => target,
            Err(msg) => {
                log::error!(
                    "(run) BUG: record_id={} llegó al workflow con datos inválidos: {}",
                    record_id,
                    msg
                );
                self.apply(
                    &record,
                    StatusUpdate::fail(record.kind, msg.clone()),
                    "reconcile failure",
                    self.retry.reconcile_attempts,
                )
                .await?;
                return Err(DispatchError::Validation(msg));
            }
        };

        // 3) Una sola llamada al proveedor, sin reintentos
        let result = self.invoke_provider(&record, target).await;

        // 4) Reconciliar el resultado en el registro
        match result {
            Ok(receipt) => {
                self.apply(
                    &record,
                    StatusUpdate::succeed(record.kind, receipt.provider_reference_id.clone()),
                    "reconcile success",
                    self.retry.reconcile_attempts,
                )
                .await?;
                log::info!(
                    "(run) record_id={} {} con éxito, provider_reference_id={}",
                    record_id,
                    record.kind.success_status(),
                    receipt.provider_reference_id
                );
                Ok(DispatchOutcome::Succeeded {
                    provider_reference_id: receipt.provider_reference_id,
                })
            }
            Err(e) => {
                let error_detail = e.to_string();
                self.apply(
                    &record,
                    StatusUpdate::fail(record.kind, error_detail.clone()),
                    "reconcile failure",
                    self.retry.reconcile_attempts,
                )
                .await?;
                log::info!("(run) record_id={} falló: {}", record_id, error_detail);
                Ok(DispatchOutcome::Failed { error_detail })
            }
        }
    }

    async fn invoke_provider(
        &self,
        record: &OutreachRecord,
        target: DispatchTarget<'_>,
    ) -> Result<ProviderReceipt, ProviderError> {
        let initialization_values = record.initialization_values.as_ref();
        match target {
            DispatchTarget::Call { agent_selector } => {
                self.provider
                    .place_call(
                        &record.to_number,
                        &record.from_number,
                        &agent_selector,
                        initialization_values,
                    )
                    .await
            }
            DispatchTarget::Text {
                message,
                agent_selector,
            } => {
                self.provider
                    .send_text(
                        &record.to_number,
                        &record.from_number,
                        message,
                        agent_selector.as_ref(),
                        initialization_values,
                    )
                    .await
            }
        }
    }

    async fn close_interrupted(
        &self,
        record: &OutreachRecord,
    ) -> Result<DispatchOutcome, DispatchError> {
        log::warn!(
            "(close_interrupted) record_id={} encontrado en '{}'; no se vuelve a llamar al proveedor.",
            record.id,
            record.status
        );
        let error_detail = INTERRUPTED_DETAIL.to_string();
        self.apply(
            record,
            StatusUpdate::fail(record.kind, error_detail.clone()),
            "close interrupted",
            self.retry.reconcile_attempts,
        )
        .await?;
        Ok(DispatchOutcome::Interrupted { error_detail })
    }

    /// Escribe `update` con reintentos. Si el compare-and-set no aplica, se
    /// acepta solo cuando el registro ya tiene el estado destino (un intento
    /// anterior se confirmó pero reportó error).
    async fn apply(
        &self,
        record: &OutreachRecord,
        update: StatusUpdate,
        step: &str,
        attempts: u32,
    ) -> Result<(), StorageError> {
        let store = self.store.as_ref();
        let id = record.id.as_str();
        let update_ref = &update;

        let applied = self
            .with_storage_retry(step, id, attempts, move || {
                store.update_status(id, update_ref)
            })
            .await
            .map_err(|e| {
                if update.expected().is_in_flight() {
                    log::error!(
                        "(apply) record_id={} quedó atascado en '{}' tras '{}': {}",
                        id,
                        update.expected(),
                        step,
                        e
                    );
                }
                e
            })?;
        if applied {
            return Ok(());
        }

        let current = self
            .with_storage_retry(step, id, attempts, move || store.get_by_id(id))
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        if current.status == update.status() {
            log::info!(
                "(apply) record_id={} ya estaba en '{}', paso '{}' sin efecto.",
                id,
                current.status,
                step
            );
            return Ok(());
        }
        Err(StorageError::InvalidTransition {
            from: current.status,
            to: update.status(),
        })
    }

    async fn with_storage_retry<T, F, Fut>(
        &self,
        step: &str,
        record_id: &str,
        attempts: u32,
        mut op: F,
    ) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.backoff(attempt);
                    log::warn!(
                        "(with_storage_retry) '{}' record_id={} intento {}/{} falló: {}. Reintentando en {:?}",
                        step,
                        record_id,
                        attempt,
                        attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::error!(
                        "(with_storage_retry) '{}' record_id={} falló tras {} intento(s): {}",
                        step,
                        record_id,
                        attempt,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << (attempt.saturating_sub(1)).min(16);
        self.retry
            .base_delay
            .saturating_mul(factor)
            .min(self.retry.max_delay)
    }
}

fn dispatch_target(record: &OutreachRecord) -> Result<DispatchTarget<'_>, String> {
    let agent_selector = record.agent_selector()?;
    match record.kind {
        OutreachKind::Call => {
            let agent_selector = agent_selector.ok_or_else(|| {
                "Either agent_id or agent_template_id must be provided".to_string()
            })?;
            Ok(DispatchTarget::Call { agent_selector })
        }
        OutreachKind::Text => {
            let message = record
                .message_content
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .ok_or_else(|| "Text message has no message_content".to_string())?;
            Ok(DispatchTarget::Text {
                message,
                agent_selector,
            })
        }
    }
}

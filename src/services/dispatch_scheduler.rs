//! services/dispatch_scheduler.rs
//! Ejecuta cada despacho como una tarea tokio independiente.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::errors::DispatchError;
use crate::services::dispatch_workflow::{DispatchOutcome, DispatchWorkflow};
use crate::services::outreach_service::OutreachStore;

/// Ejecuta el workflow, como máximo una vez a la vez por registro, con un
/// límite de despachos simultáneos contra el proveedor.
#[derive(Clone)]
pub struct DispatchScheduler {
    workflow: Arc<DispatchWorkflow>,
    active: Arc<Mutex<HashSet<String>>>,
    semaphore: Arc<Semaphore>,
}

impl DispatchScheduler {
    pub fn new(workflow: DispatchWorkflow, max_concurrent: usize) -> Self {
        Self {
            workflow: Arc::new(workflow),
            active: Arc::new(Mutex::new(HashSet::new())),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Lanza una ejecución para `record_id`. Devuelve `None` si ya hay una
    /// activa para ese id.
    pub fn schedule(
        &self,
        record_id: String,
    ) -> Option<JoinHandle<Result<DispatchOutcome, DispatchError>>> {
        let guard = ActiveGuard::claim(self.active.clone(), record_id.clone())?;

        let workflow = self.workflow.clone();
        let semaphore = self.semaphore.clone();
        log::info!("(schedule) Despacho programado para record_id={}", record_id);

        Some(tokio::spawn(async move {
            let _guard = guard;
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| DispatchError::Scheduler("semaphore closed".to_string()))?;

            let result = workflow.run(&record_id).await;
            match &result {
                Ok(outcome) => {
                    log::info!("(schedule) record_id={} terminó: {:?}", record_id, outcome)
                }
                Err(DispatchError::Storage(e)) => log::error!(
                    "(schedule) record_id={} abortado por error de almacenamiento, requiere operador: {}",
                    record_id,
                    e
                ),
                Err(e) => log::error!("(schedule) record_id={} abortado: {}", record_id, e),
            }
            result
        }))
    }

    pub fn is_active(&self, record_id: &str) -> bool {
        self.active.lock().contains(record_id)
    }

    /// Reprograma los registros que quedaron sin terminar (p.ej. tras un
    /// reinicio). Devuelve cuántos se programaron.
    pub async fn recover_unfinished(&self, store: &dyn OutreachStore) -> Result<usize, DispatchError> {
        let records = store.list_unfinished().await?;
        log::info!(
            "(recover_unfinished) Se encontraron {} registros sin terminar.",
            records.len()
        );

        let mut scheduled = 0;
        for record in records {
            if self.schedule(record.id).is_some() {
                scheduled += 1;
            }
        }
        Ok(scheduled)
    }
}

/// Mantiene el id en el conjunto de activos hasta que termina su tarea,
/// incluso si hace panic.
struct ActiveGuard {
    active: Arc<Mutex<HashSet<String>>>,
    record_id: String,
}

impl ActiveGuard {
    fn claim(active: Arc<Mutex<HashSet<String>>>, record_id: String) -> Option<Self> {
        if !active.lock().insert(record_id.clone()) {
            log::warn!(
                "(claim) Ya hay un despacho activo para record_id={}, se ignora.",
                record_id
            );
            return None;
        }
        Some(Self { active, record_id })
    }
}

/// Libera el id al salir de scope
impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.record_id);
    }
}

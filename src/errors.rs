//! errors.rs
//! Errores de intake, despacho y almacenamiento.

use thiserror::Error;

use crate::models::outreach_model::OutreachStatus;

/// Falla reportada por el cliente del proveedor.
///
/// `message` es lo que se guarda en `error_detail`; `status_code` y `body`
/// conservan la respuesta cruda del proveedor para diagnóstico.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub status_code: Option<u16>,
    pub body: Option<String>,
    pub message: String,
}

impl ProviderError {
    /// Respuesta no 2xx.
    pub fn rejected(status_code: u16, body: String) -> Self {
        Self {
            message: format!("Provider API error: {} - {}", status_code, body),
            status_code: Some(status_code),
            body: Some(body),
        }
    }

    /// La petición nunca obtuvo respuesta (conexión, timeout...).
    pub fn transport(detail: impl Into<String>) -> Self {
        Self {
            status_code: None,
            body: None,
            message: format!("Provider request failed: {}", detail.into()),
        }
    }

    /// Respuesta 2xx que no se pudo interpretar.
    pub fn malformed(status_code: u16, body: String, detail: &str) -> Self {
        Self {
            message: format!("Provider response invalid: {}", detail),
            status_code: Some(status_code),
            body: Some(body),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("could not encode initialization_values: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("illegal status transition {from} -> {to}")]
    InvalidTransition {
        from: OutreachStatus,
        to: OutreachStatus,
    },

    #[error("outreach record {0} not found")]
    NotFound(String),

    #[error("corrupt outreach record {id}: {detail}")]
    Corrupt { id: String, detail: String },
}

impl StorageError {
    /// Solo vale la pena reintentar fallas de I/O, del pool o de bloqueo de
    /// SQLite. Lo demás es un error de lógica o de datos que se repetiría.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Database(e) => match e {
                sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed => true,
                sqlx::Error::Database(db) => db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(is_busy_or_locked)
                    .unwrap_or(false),
                _ => false,
            },
            _ => false,
        }
    }
}

/// SQLITE_BUSY (5) y SQLITE_LOCKED (6), incluidos sus códigos extendidos.
fn is_busy_or_locked(code: i32) -> bool {
    matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("dispatch scheduler unavailable: {0}")]
    Scheduler(String),
}

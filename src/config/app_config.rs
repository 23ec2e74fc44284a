//! config/app_config.rs
//! Configuración global del servicio: servidor HTTP, base de datos,
//! proveedor y política de despacho. Se lee de variables de entorno
//! (o de `.env`) y cada servicio la recibe por constructor.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub http_workers: usize,
    pub database_url: String,
    pub provider: ProviderConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    /// Límite de una petición al proveedor, conexión incluida.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Cantidad máxima de despachos simultáneos
    pub max_concurrent: usize,
    pub storage_retry: StorageRetryConfig,
}

/// Backoff de escrituras en DB dentro de un despacho. La espera se duplica
/// en cada intento, desde `base_delay` hasta `max_delay`.
#[derive(Debug, Clone)]
pub struct StorageRetryConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Intentos para la escritura `pending -> in-flight`.
    pub start_attempts: u32,
    /// Intentos para la escritura final de reconciliación.
    pub reconcile_attempts: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            base_url: "https://agents.gigaml.com".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for StorageRetryConfig {
    fn default() -> Self {
        StorageRetryConfig {
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            start_attempts: 3,
            reconcile_attempts: 8,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            max_concurrent: 8,
            storage_retry: StorageRetryConfig::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bind_addr: "0.0.0.0".to_string(),
            port: 5022,
            http_workers: 2,
            database_url: "sqlite:data/outreach.db".to_string(),
            provider: ProviderConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl AppConfig {
    /// Lee la configuración del entorno. Llamar después de `dotenv()`.
    pub fn from_env() -> Result<Self> {
        let defaults = AppConfig::default();
        let retry_defaults = defaults.dispatch.storage_retry.clone();

        let api_key = env::var("PROVIDER_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("No se definió PROVIDER_API_KEY"))?;

        let config = AppConfig {
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: parse_var("PORT", defaults.port)?,
            http_workers: parse_var("HTTP_WORKERS", defaults.http_workers)?,
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            provider: ProviderConfig {
                base_url: env::var("PROVIDER_BASE_URL").unwrap_or(defaults.provider.base_url),
                api_key,
                timeout: Duration::from_secs(parse_var(
                    "PROVIDER_TIMEOUT_SECS",
                    defaults.provider.timeout.as_secs(),
                )?),
            },
            dispatch: DispatchConfig {
                max_concurrent: parse_var(
                    "MAX_CONCURRENT_DISPATCHES",
                    defaults.dispatch.max_concurrent,
                )?,
                storage_retry: StorageRetryConfig {
                    base_delay: Duration::from_millis(parse_var(
                        "STORAGE_RETRY_BASE_MS",
                        retry_defaults.base_delay.as_millis() as u64,
                    )?),
                    max_delay: Duration::from_millis(parse_var(
                        "STORAGE_RETRY_MAX_MS",
                        retry_defaults.max_delay.as_millis() as u64,
                    )?),
                    start_attempts: parse_var(
                        "STORAGE_RETRY_START_ATTEMPTS",
                        retry_defaults.start_attempts,
                    )?,
                    reconcile_attempts: parse_var(
                        "STORAGE_RETRY_RECONCILE_ATTEMPTS",
                        retry_defaults.reconcile_attempts,
                    )?,
                },
            },
        };

        if config.dispatch.max_concurrent == 0 {
            return Err(anyhow!("MAX_CONCURRENT_DISPATCHES debe ser mayor que 0"));
        }
        if config.dispatch.storage_retry.start_attempts == 0
            || config.dispatch.storage_retry.reconcile_attempts == 0
        {
            return Err(anyhow!("Los intentos de reintento deben ser al menos 1"));
        }

        Ok(config)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Valor inválido para {}: '{}'", name, raw)),
        _ => Ok(default),
    }
}

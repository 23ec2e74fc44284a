use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::app_config::AppConfig;
use crate::logger::init_logger;
use crate::services::dispatch_scheduler::DispatchScheduler;
use crate::services::dispatch_workflow::DispatchWorkflow;
use crate::services::outreach_service::OutreachService;
use crate::services::provider_client::ProviderClient;

mod app;
mod config;
mod errors;
mod handlers;
mod logger;
mod models;
mod services;

#[cfg(test)]
mod tests;

async fn setup_database(database_url: &str) -> anyhow::Result<Pool<Sqlite>> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("DATABASE_URL inválida: {}", database_url))?
        .create_if_missing(true);

    // Crear carpeta del archivo si hace falta (p.ej. ./data)
    if let Some(parent) = database_dir(database_url) {
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("No se pudo crear directorio {:?}", parent))?;
    }

    log::info!("Conectando a SQLite en {}", database_url);
    let db_pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .context("No se pudo conectar a la base de datos SQLite.")?;

    Ok(db_pool)
}

/// Directorio del archivo SQLite, `None` para bases en memoria.
fn database_dir(database_url: &str) -> Option<PathBuf> {
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    let config = AppConfig::from_env().context("Configuración inválida")?;

    // Conectarnos a la DB
    let db_pool = setup_database(&config.database_url).await?;

    // OutreachService
    let outreach_service = OutreachService::new(db_pool.clone());
    outreach_service
        .run_migrations()
        .await
        .context("Fallo en migraciones de 'outreach_records'")?;

    // Cliente del proveedor + workflow + scheduler
    let provider = ProviderClient::new(&config.provider)
        .context("No se pudo inicializar el cliente del proveedor")?;
    let workflow = DispatchWorkflow::new(
        Arc::new(outreach_service.clone()),
        Arc::new(provider),
        config.dispatch.storage_retry.clone(),
    );
    let scheduler = DispatchScheduler::new(workflow, config.dispatch.max_concurrent);

    // Registros que quedaron a medias en la ejecución anterior
    let recovered = scheduler
        .recover_unfinished(&outreach_service)
        .await
        .context("Fallo al recuperar despachos pendientes")?;
    if recovered > 0 {
        log::info!("Se reprogramaron {} despachos sin terminar", recovered);
    }

    log::info!(
        "Levantando servidor en {}:{}",
        config.bind_addr,
        config.port
    );
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(outreach_service.clone()))
            .app_data(web::Data::new(scheduler.clone()))
            .configure(app::init_app)
    })
    .workers(config.http_workers.max(1))
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}

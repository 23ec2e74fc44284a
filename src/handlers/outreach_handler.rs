//! handlers/outreach_handler.rs
//! Intake de llamadas/textos y consulta de estado.

use actix_web::{http::StatusCode, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::errors::DispatchError;
use crate::models::intake_model::{CreateCallRequest, CreateOutreachResponse, CreateTextRequest};
use crate::models::outreach_model::{
    NewOutreachRecord, OutreachFilter, OutreachKind, OutreachStatus,
};
use crate::services::dispatch_scheduler::DispatchScheduler;
use crate::services::outreach_service::{OutreachService, OutreachStore};

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

#[derive(Deserialize)]
pub struct ListQuery {
    kind: Option<OutreachKind>,
    customer_id: Option<i64>,
    status: Option<OutreachStatus>,
    page: Option<u64>,
    page_size: Option<u64>,
}

#[derive(Deserialize)]
pub struct StatsQuery {
    kind: Option<OutreachKind>,
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(json!({ "error": message.into() }))
}

/// POST /api/outreach/calls
pub async fn create_call_endpoint(
    store: web::Data<OutreachService>,
    scheduler: web::Data<DispatchScheduler>,
    body: web::Json<CreateCallRequest>,
) -> HttpResponse {
    intake(&store, &scheduler, body.into_inner().validate()).await
}

/// POST /api/outreach/texts
pub async fn create_text_endpoint(
    store: web::Data<OutreachService>,
    scheduler: web::Data<DispatchScheduler>,
    body: web::Json<CreateTextRequest>,
) -> HttpResponse {
    intake(&store, &scheduler, body.into_inner().validate()).await
}

async fn intake(
    store: &OutreachService,
    scheduler: &DispatchScheduler,
    validated: Result<NewOutreachRecord, DispatchError>,
) -> HttpResponse {
    let new_record = match validated {
        Ok(record) => record,
        Err(e) => {
            log::info!("(intake) Solicitud rechazada: {}", e);
            return json_error(StatusCode::BAD_REQUEST, e.to_string());
        }
    };
    let kind = new_record.kind;

    let record_id = match store.create(new_record).await {
        Ok(id) => id,
        Err(e) => {
            log::error!("(intake) No se pudo crear el registro {}: {}", kind, e);
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to create {} record", kind),
            );
        }
    };

    if scheduler.schedule(record_id.clone()).is_none() {
        log::warn!(
            "(intake) record_id={} ya tenía un despacho activo",
            record_id
        );
    }

    HttpResponse::Created().json(CreateOutreachResponse {
        record_id,
        status: OutreachStatus::Pending,
    })
}

/// GET /api/outreach/{id}
pub async fn get_outreach_endpoint(
    store: web::Data<OutreachService>,
    path: web::Path<String>,
) -> HttpResponse {
    let record_id = path.into_inner();

    match store.get_by_id(&record_id).await {
        Ok(Some(record)) => HttpResponse::Ok().json(record),
        Ok(None) => json_error(
            StatusCode::NOT_FOUND,
            format!("Outreach record {} not found", record_id),
        ),
        Err(e) => {
            log::error!("(get_outreach_endpoint) record_id={}: {}", record_id, e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// GET /api/outreach
pub async fn list_outreach_endpoint(
    store: web::Data<OutreachService>,
    query: web::Query<ListQuery>,
) -> HttpResponse {
    let query = query.into_inner();
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let filter = OutreachFilter {
        kind: query.kind,
        customer_id: query.customer_id,
        status: query.status,
    };

    match store.list(&filter, page, page_size).await {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(e) => {
            log::error!("(list_outreach_endpoint) {}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// GET /api/outreach/stats
pub async fn stats_endpoint(
    store: web::Data<OutreachService>,
    query: web::Query<StatsQuery>,
) -> HttpResponse {
    match store.stats(query.kind).await {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => {
            log::error!("(stats_endpoint) {}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// GET /api/health
pub async fn health_endpoint() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

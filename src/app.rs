//! app.rs
use crate::handlers::outreach_handler::{self, json_error};
use actix_web::{error, http::StatusCode, web};

pub fn init_app(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        let message = format!("Invalid JSON body: {}", err);
        error::InternalError::from_response(err, json_error(StatusCode::BAD_REQUEST, message))
            .into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        let message = format!("Invalid query string: {}", err);
        error::InternalError::from_response(err, json_error(StatusCode::BAD_REQUEST, message))
            .into()
    }))
    .service(
        web::scope("/api")
            .route("/health", web::get().to(outreach_handler::health_endpoint))
            .service(
                web::scope("/outreach")
                    .route(
                        "",
                        web::get().to(outreach_handler::list_outreach_endpoint),
                    )
                    .route(
                        "/calls",
                        web::post().to(outreach_handler::create_call_endpoint),
                    )
                    .route(
                        "/texts",
                        web::post().to(outreach_handler::create_text_endpoint),
                    )
                    // antes de "/{id}" para que "stats" no se tome como id
                    .route("/stats", web::get().to(outreach_handler::stats_endpoint))
                    .route(
                        "/{id}",
                        web::get().to(outreach_handler::get_outreach_endpoint),
                    ),
            ),
    );
}

//! Server construction and middleware wiring.

mod config;
mod state_builders;

pub use config::{ServerSettings, SettingsError};

use state_builders::{AppServices, build_services};

use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};

use pantry_backend::Trace;
#[cfg(debug_assertions)]
use pantry_backend::doc::ApiDoc;
use pantry_backend::inbound::http::error::{json_error_handler, query_error_handler};
use pantry_backend::inbound::http::failed_attempts::{
    failed_attempt_summary, list_failed_attempts,
};
use pantry_backend::inbound::http::health::{HealthState, live, ready};
use pantry_backend::inbound::http::orders::{rule_version, submit_order, validate_cart};
use pantry_backend::inbound::http::state::HttpState;
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

fn build_app(
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let api = web::scope("/api/v1")
        .service(validate_cart)
        .service(submit_order)
        .service(rule_version)
        .service(failed_attempt_summary)
        .service(list_failed_attempts);

    let app = App::new()
        .app_data(health_state)
        .app_data(http_state)
        .app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .wrap(Trace)
        .service(api)
        .service(ready)
        .service(live);

    #[cfg(debug_assertions)]
    let app = app.service(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    #[cfg(not(debug_assertions))]
    let app = app;

    app
}

/// Construct an Actix HTTP server from the loaded settings.
///
/// The readiness probe reports ready once the listener is bound and, when a
/// database is configured, a connection can be checked out.
///
/// # Errors
/// Propagates [`std::io::Error`] when adapter setup, binding the socket, or
/// starting the server fails.
pub async fn create_server(
    health_state: HealthState,
    settings: &ServerSettings,
) -> std::io::Result<Server> {
    let bind_addr = settings.bind_addr().map_err(std::io::Error::other)?;
    let AppServices {
        http_state,
        readiness,
    } = build_services(settings).await?;
    let health_state = web::Data::new(match readiness {
        Some(probe) => health_state.with_probe(probe),
        None => health_state,
    });

    let server_health_state = health_state.clone();
    let server = HttpServer::new(move || build_app(server_health_state.clone(), http_state.clone()))
        .bind(bind_addr)?
        .run();

    tracing::info!(%bind_addr, "server listening");
    health_state.mark_ready();
    Ok(server)
}

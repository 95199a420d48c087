use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use dotenvy::dotenv;
use std::sync::Arc;

mod absence;
mod api;
mod classifier;
mod config;
mod db;
mod docs;
mod identity;
mod ledger;
mod model;
mod notify;
mod offline;
mod policy;
mod routes;
mod utils;

use config::Config;
use db::init_db;
use notify::{ConsoleNotifier, NotificationGate};
use policy::AdmissionPolicy;

use crate::docs::ApiDoc;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "School attendance service"
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let config = Config::from_env();

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url).await;
    let policy = AdmissionPolicy::from_config(&config);
    let gate = NotificationGate::new(
        Arc::new(ConsoleNotifier),
        config.notify_dedup_scope,
        config.school_name.clone(),
    );

    info!(
        checkin_start = %policy.checkin_start,
        late_threshold = %policy.late_threshold,
        absent_cutoff = %policy.absent_cutoff,
        "admission window loaded"
    );

    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(Data::new(policy))
            .app_data(Data::new(gate.clone()))
            .service(index)
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await
}

use actix_middleware::{CorrelationIdMiddleware, Logging};
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing::info;

use api_gateway::{config::Config, logging, routes, state::AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    let state = AppState::from_config(&config).await?;

    let bind_addr = format!("{}:{}", config.host, config.port);
    info!("API gateway starting on http://{}", bind_addr);
    info!("Proxying /api/* to {}", config.rest_api_url);
    info!("Proxying /tasks-api/* to {}/api/*", config.task_api_url);
    info!("Bridging /graphql WebSocket to {}/graphql", config.task_api_url);

    let data = web::Data::new(state);

    HttpServer::new(move || {
        App::new()
            .wrap(Logging)
            .wrap(CorrelationIdMiddleware)
            .app_data(data.clone())
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {bind_addr}"))?
    .run()
    .await?;

    info!("API gateway stopped");
    Ok(())
}

use actix_middleware::{CorrelationIdMiddleware, Logging};
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing::info;

use task_service::{config::Config, logging, routes, state::AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    let state = AppState::from_config(&config).await?;

    let bind_addr = format!("{}:{}", config.host, config.port);
    info!("Task service starting on http://{}", bind_addr);
    info!("Subscriptions ready at ws://{}/graphql", bind_addr);

    let broker = state.broker.clone();
    let resolver = state.resolver.clone();
    let data = web::Data::new(state);

    HttpServer::new(move || {
        let resolver = resolver.clone();
        App::new()
            .wrap(Logging)
            .wrap(CorrelationIdMiddleware)
            .app_data(data.clone())
            .configure(|cfg| routes::configure(cfg, resolver))
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {bind_addr}"))?
    .run()
    .await?;

    broker.shutdown();
    info!("Task service stopped");
    Ok(())
}

use actix_middleware::{CorrelationIdMiddleware, Logging};
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing::info;

use user_service::{config::Config, logging, routes, state::AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    let state = AppState::from_config(&config).await?;

    if state.resolver.accepts_assertions() {
        info!("Internal identity assertions enabled");
    }

    let bind_addr = format!("{}:{}", config.host, config.port);
    info!("User service starting on http://{}", bind_addr);

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

    info!("User service stopped");
    Ok(())
}

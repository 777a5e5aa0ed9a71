//! Real-time subscriptions over WebSocket

mod connection;
pub mod protocol;

use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws::WsResponseBuilder;

pub use connection::SubscriptionConnection;

use crate::state::AppState;

/// GET /graphql (WebSocket upgrade, `graphql-transport-ws`)
pub async fn subscriptions(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let connection = SubscriptionConnection::new(
        state.broker.clone(),
        state.resolver.clone(),
        state.policy.clone(),
    );

    WsResponseBuilder::new(connection, &req, stream)
        .protocols(&[protocol::SUBPROTOCOL])
        .start()
}

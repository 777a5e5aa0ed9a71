//! WebSocket passthrough for `/graphql`.
//!
//! The gateway does not read subscription traffic. Credentials travel inside
//! `connection_init` and are verified by the task service, so frames are
//! bridged unchanged in both directions. Close frames, including the
//! task service's 44xx codes, reach the client as sent.

use std::pin::Pin;

use actix::io::{SinkWrite, WriteHandler};
use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_middleware::{get_correlation_id, CORRELATION_ID_HEADER};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use awc::error::WsProtocolError;
use awc::ws::{Frame, Message};
use error_types::ServiceError;
use futures::{Sink, Stream, StreamExt};

use crate::state::AppState;

pub const SUBPROTOCOL: &str = "graphql-transport-ws";

type UpstreamSink = Pin<Box<dyn Sink<Message, Error = WsProtocolError>>>;
type UpstreamStream = Pin<Box<dyn Stream<Item = Result<Frame, WsProtocolError>>>>;

/// WebSocket URL of the task service subscription endpoint
pub fn upstream_url(task_api_url: &str) -> String {
    let base = task_api_url.trim_end_matches('/');
    match base.split_once("://") {
        Some(("https", rest)) => format!("wss://{rest}/graphql"),
        Some((_, rest)) => format!("ws://{rest}/graphql"),
        None => format!("ws://{base}/graphql"),
    }
}

/// GET /graphql (WebSocket upgrade, bridged to the task service)
pub async fn graphql(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    // Reject plain requests before dialing upstream
    ws::handshake(&req)?;

    let correlation_id = get_correlation_id(&req);
    let url = upstream_url(&state.upstreams.task_api_url);

    let (_, upstream) = awc::Client::new()
        .ws(url.as_str())
        .protocols([SUBPROTOCOL])
        .header(CORRELATION_ID_HEADER, correlation_id.as_str())
        .connect()
        .await
        .map_err(|e| {
            tracing::error!(
                url = %url,
                correlation_id = %correlation_id,
                error = %e,
                "Upstream WebSocket handshake failed"
            );
            ServiceError::ServiceUnavailable(e.to_string())
        })?;

    tracing::debug!(correlation_id = %correlation_id, "WebSocket bridged to task service");

    let (sink, frames) = upstream.split();
    let bridge = WsBridge {
        pending: Some((Box::pin(sink), Box::pin(frames))),
        upstream: None,
    };

    ws::WsResponseBuilder::new(bridge, &req, stream)
        .protocols(&[SUBPROTOCOL])
        .start()
}

/// Client connection paired with one upstream connection
struct WsBridge {
    pending: Option<(UpstreamSink, UpstreamStream)>,
    upstream: Option<SinkWrite<Message, UpstreamSink>>,
}

impl WsBridge {
    fn send_upstream(&mut self, message: Message) {
        let Some(upstream) = self.upstream.as_mut() else {
            return;
        };
        if upstream.write(message).is_err() {
            tracing::debug!("Upstream WebSocket already closed, dropping frame");
        }
    }
}

impl Actor for WsBridge {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        if let Some((sink, frames)) = self.pending.take() {
            self.upstream = Some(SinkWrite::new(sink, ctx));
            ctx.add_stream(frames);
        }
    }
}

impl WriteHandler<WsProtocolError> for WsBridge {}

/// Client → task service
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsBridge {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.send_upstream(Message::Text(text)),
            Ok(ws::Message::Binary(bin)) => self.send_upstream(Message::Binary(bin)),
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Close(reason)) => {
                self.send_upstream(Message::Close(reason.clone()));
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Pong(_)) | Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Client WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Task service → client
impl StreamHandler<Result<Frame, WsProtocolError>> for WsBridge {
    fn handle(&mut self, msg: Result<Frame, WsProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(Frame::Text(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => ctx.text(text.to_owned()),
                Err(_) => tracing::warn!("Dropping non UTF-8 text frame from upstream"),
            },
            Ok(Frame::Binary(bytes)) => ctx.binary(bytes),
            // Upstream heartbeat is answered here; the client keeps its own
            Ok(Frame::Ping(msg)) => self.send_upstream(Message::Pong(msg)),
            Ok(Frame::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(Frame::Pong(_)) | Ok(Frame::Continuation(_)) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Upstream WebSocket protocol error");
                ctx.stop();
            }
        }
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        tracing::debug!("Upstream WebSocket ended");
        ctx.stop();
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_rt::task::JoinHandle;
use actix_web_actors::ws;
use crypto_core::{Action, AuthorizationPolicy, Principal};
use event_broker::{BrokerError, CloseReason, Event, EventBroker, SessionId, SubscriptionSession};
use identity_propagation::IdentityResolver;

use super::protocol::{close_codes, extract_bearer, ClientMessage, ServerMessage, SubscribePayload};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);
const INIT_TIMEOUT: Duration = Duration::from_secs(10);

// One broker event for a live subscription
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Deliver {
    id: String,
    session_id: SessionId,
    event: Arc<Event>,
}

// A subscription's session stopped yielding events
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct SubscriptionEnded {
    id: String,
    session_id: SessionId,
    reason: Option<CloseReason>,
}

struct ActiveSubscription {
    session_id: SessionId,
    forwarder: JoinHandle<()>,
}

/// One WebSocket connection hosting any number of subscriptions.
///
/// Each subscription owns a broker session drained by its own forwarder
/// task, which hands events to this actor one at a time. Stopping the actor
/// aborts the forwarders, and dropping their sessions unsubscribes them.
pub struct SubscriptionConnection {
    broker: EventBroker,
    resolver: Arc<IdentityResolver>,
    policy: Arc<AuthorizationPolicy>,
    principal: Option<Principal>,
    init_received: bool,
    subscriptions: HashMap<String, ActiveSubscription>,
    hb: Instant,
}

impl SubscriptionConnection {
    pub fn new(
        broker: EventBroker,
        resolver: Arc<IdentityResolver>,
        policy: Arc<AuthorizationPolicy>,
    ) -> Self {
        Self {
            broker,
            resolver,
            policy,
            principal: None,
            init_received: false,
            subscriptions: HashMap::new(),
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!("WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, msg: ServerMessage) {
        ctx.text(msg.to_json());
    }

    fn close(&self, ctx: &mut ws::WebsocketContext<Self>, code: u16, description: &str) {
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Other(code),
            description: Some(description.to_string()),
        }));
        ctx.stop();
    }

    fn handle_message(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match msg {
            ClientMessage::ConnectionInit { payload } => {
                if self.init_received {
                    self.close(ctx, close_codes::TOO_MANY_INIT, "Too many initialisation requests");
                    return;
                }
                self.init_received = true;

                let verified = extract_bearer(payload.as_ref())
                    .ok_or("missing token")
                    .and_then(|token| {
                        self.resolver.verify_token(token).map_err(|e| {
                            tracing::warn!(reason = %e, "WebSocket token rejected");
                            "invalid token"
                        })
                    });

                match verified {
                    Ok(principal) => {
                        tracing::info!(
                            subject = %principal.subject_id(),
                            role = %principal.role(),
                            "WebSocket connection acknowledged"
                        );
                        self.principal = Some(principal);
                        self.send(ctx, ServerMessage::ConnectionAck);
                    }
                    Err(reason) => {
                        tracing::warn!(%reason, "WebSocket connection_init rejected");
                        self.close(ctx, close_codes::FORBIDDEN, "Forbidden");
                    }
                }
            }
            ClientMessage::Subscribe { id, payload } => self.subscribe(id, payload, ctx),
            ClientMessage::Complete { id } => {
                if let Some(active) = self.subscriptions.remove(&id) {
                    active.forwarder.abort();
                    tracing::debug!(subscription_id = %id, "Subscription completed by client");
                }
            }
            ClientMessage::Ping { payload } => self.send(ctx, ServerMessage::Pong { payload }),
            ClientMessage::Pong { .. } => {}
        }
    }

    fn subscribe(&mut self, id: String, payload: SubscribePayload, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(principal) = self.principal.clone() else {
            self.close(ctx, close_codes::UNAUTHORIZED, "Unauthorized");
            return;
        };
        if self.subscriptions.contains_key(&id) {
            self.close(
                ctx,
                close_codes::SUBSCRIBER_EXISTS,
                &format!("Subscriber for {id} already exists"),
            );
            return;
        }

        let topics = payload.requested_topics();
        if topics.is_empty() {
            self.send(ctx, ServerMessage::error(&id, "Subscription requires a topic"));
            return;
        }
        for topic in &topics {
            if let Err(denied) = self.policy.authorize(&principal, &Action::Subscribe { topic: topic.as_str() }) {
                tracing::warn!(
                    subject = %principal.subject_id(),
                    topic = %topic,
                    reason = denied.reason,
                    "Subscription denied"
                );
                self.send(ctx, ServerMessage::error(&id, "Forbidden"));
                return;
            }
        }

        let session = match self.broker.subscribe_all(principal, topics) {
            Ok(session) => session,
            Err(BrokerError::PrincipalExpired) => {
                self.close(ctx, close_codes::UNAUTHORIZED, "Token expired");
                return;
            }
            Err(e) => {
                tracing::error!(subscription_id = %id, error = %e, "Subscribe failed");
                self.send(ctx, ServerMessage::error(&id, e.to_string()));
                return;
            }
        };

        tracing::debug!(
            subscription_id = %id,
            session_id = %session.id(),
            topics = ?session.topics(),
            "Subscription started"
        );

        let session_id = session.id();
        let forwarder = actix_rt::spawn(forward(id.clone(), session, ctx.address()));
        self.subscriptions.insert(
            id,
            ActiveSubscription {
                session_id,
                forwarder,
            },
        );
    }

    fn is_current(&self, id: &str, session_id: SessionId) -> bool {
        self.subscriptions
            .get(id)
            .map_or(false, |active| active.session_id == session_id)
    }
}

/// Drain a session into the connection actor. Waiting on the actor mailbox
/// lets a slow socket back up into the session's bounded channel.
async fn forward(
    id: String,
    mut session: SubscriptionSession,
    addr: actix::Addr<SubscriptionConnection>,
) {
    let session_id = session.id();
    while let Some(event) = session.recv().await {
        let delivered = addr
            .send(Deliver {
                id: id.clone(),
                session_id,
                event,
            })
            .await;
        if delivered.is_err() {
            return;
        }
    }

    addr.do_send(SubscriptionEnded {
        id,
        session_id,
        reason: session.close_reason(),
    });
}

impl Actor for SubscriptionConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::debug!("WebSocket connection opened");
        self.hb(ctx);

        ctx.run_later(INIT_TIMEOUT, |act, ctx| {
            if act.principal.is_none() && !act.init_received {
                tracing::warn!("WebSocket connection_init timeout");
                act.close(ctx, close_codes::INIT_TIMEOUT, "Connection initialisation timeout");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let count = self.subscriptions.len();
        for (_, active) in self.subscriptions.drain() {
            active.forwarder.abort();
        }
        tracing::info!(
            subject = ?self.principal.as_ref().map(|p| p.subject_id().to_string()),
            subscriptions_closed = count,
            "WebSocket connection closed"
        );
    }
}

impl Handler<Deliver> for SubscriptionConnection {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        if self.is_current(&msg.id, msg.session_id) {
            self.send(ctx, ServerMessage::next(&msg.id, &msg.event));
        }
    }
}

impl Handler<SubscriptionEnded> for SubscriptionConnection {
    type Result = ();

    fn handle(&mut self, msg: SubscriptionEnded, ctx: &mut Self::Context) {
        if !self.is_current(&msg.id, msg.session_id) {
            return;
        }
        self.subscriptions.remove(&msg.id);

        match msg.reason {
            Some(CloseReason::PrincipalExpired) => {
                tracing::info!(subscription_id = %msg.id, "Token expired, closing connection");
                self.close(ctx, close_codes::UNAUTHORIZED, "Token expired");
            }
            Some(CloseReason::Overflow) => {
                self.send(
                    ctx,
                    ServerMessage::error(&msg.id, "Subscriber too slow, subscription dropped"),
                );
            }
            _ => self.send(ctx, ServerMessage::Complete { id: msg.id }),
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for SubscriptionConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => self.handle_message(msg, ctx),
                    Err(e) => {
                        tracing::warn!(error = %e, "Invalid WebSocket message");
                        self.close(ctx, close_codes::BAD_REQUEST, "Invalid message received");
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Binary WebSocket messages not supported");
                self.close(ctx, close_codes::BAD_REQUEST, "Binary messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(?reason, "WebSocket close message received");
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::task::{Context, Poll};

use crypto_core::Principal;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep};
use uuid::Uuid;

use crate::broker::{lock, Registry};
use crate::topic::{Event, Topic};

/// Unique identifier of a subscription session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a session stopped delivering events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed by its owner or via [`EventBroker::unsubscribe`](crate::EventBroker::unsubscribe)
    Unsubscribed,
    /// The delivery channel was full when an event was published
    Overflow,
    /// The principal's token expired
    PrincipalExpired,
    /// The broker shut down
    Shutdown,
}

/// One subscriber's view of the broker.
///
/// Yields `Arc<Event>` in publish order until the session is closed. Holds only
/// a weak handle to the broker registry; dropping the session unsubscribes it.
pub struct SubscriptionSession {
    id: SessionId,
    principal: Principal,
    topics: Vec<Topic>,
    receiver: mpsc::Receiver<Arc<Event>>,
    registry: Weak<Mutex<Registry>>,
    close: Arc<OnceLock<CloseReason>>,
    deadline: Option<Instant>,
    expiry: Option<Pin<Box<Sleep>>>,
    finished: bool,
}

impl SubscriptionSession {
    pub(crate) fn new(
        id: SessionId,
        principal: Principal,
        topics: Vec<Topic>,
        receiver: mpsc::Receiver<Arc<Event>>,
        registry: Weak<Mutex<Registry>>,
        close: Arc<OnceLock<CloseReason>>,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            id,
            principal,
            topics,
            receiver,
            registry,
            close,
            deadline,
            expiry: None,
            finished: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// `None` while the session is live
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close.get().copied()
    }

    /// Next event, or `None` once the session has ended
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.next().await
    }

    /// Unsubscribe and stop yielding events. Buffered events are discarded.
    pub fn close(&mut self) {
        self.finish(CloseReason::Unsubscribed);
    }

    fn finish(&mut self, reason: CloseReason) {
        let _ = self.close.set(reason);
        self.finished = true;
        self.receiver.close();
        self.detach(reason);
    }

    fn detach(&self, reason: CloseReason) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(self.id, reason);
        }
    }
}

impl Stream for SubscriptionSession {
    type Item = Arc<Event>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        if let Some(deadline) = this.deadline {
            let expiry = this
                .expiry
                .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline)));
            if expiry.as_mut().poll(cx).is_ready() {
                tracing::info!(
                    session_id = %this.id,
                    subject = %this.principal.subject_id(),
                    "Subscription principal expired, closing session"
                );
                this.finish(CloseReason::PrincipalExpired);
                return Poll::Ready(None);
            }
        }

        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(event)),
            Poll::Ready(None) => {
                // Sender dropped by the broker, which recorded the reason
                let _ = this.close.set(CloseReason::Unsubscribed);
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SubscriptionSession {
    fn drop(&mut self) {
        self.detach(CloseReason::Unsubscribed);
    }
}

impl fmt::Debug for SubscriptionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSession")
            .field("id", &self.id)
            .field("subject", &self.principal.subject_id())
            .field("topics", &self.topics)
            .field("close_reason", &self.close_reason())
            .finish()
    }
}

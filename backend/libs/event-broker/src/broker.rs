use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use chrono::Utc;
use crypto_core::Principal;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::session::{CloseReason, SessionId, SubscriptionSession};
use crate::topic::{DomainEvent, Event, Topic};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Events buffered per session before it is disconnected
    pub channel_capacity: usize,
    /// End sessions when their principal's token expires
    pub enforce_expiry: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            enforce_expiry: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("broker is shut down")]
    Closed,
    #[error("subscription requires at least one topic")]
    NoTopics,
    #[error("principal has already expired")]
    PrincipalExpired,
}

/// Outcome of one publish
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Sessions the event was handed to
    pub delivered: usize,
    /// Sessions removed during this publish (full or abandoned channel)
    pub disconnected: usize,
}

// ============================================================================
// Registry
// ============================================================================

pub(crate) struct SessionEntry {
    sender: mpsc::Sender<Arc<Event>>,
    topics: Vec<Topic>,
    close: Arc<OnceLock<CloseReason>>,
}

#[derive(Default)]
pub(crate) struct Registry {
    // topic -> sessions, in subscription order
    topics: HashMap<Topic, Vec<SessionId>>,
    sessions: HashMap<SessionId, SessionEntry>,
    next_sequence: u64,
    closed: bool,
}

impl Registry {
    /// Remove a session from every topic. Returns false if it was already gone.
    pub(crate) fn remove(&mut self, id: SessionId, reason: CloseReason) -> bool {
        let Some(entry) = self.sessions.remove(&id) else {
            return false;
        };
        let _ = entry.close.set(reason);

        for topic in &entry.topics {
            if let Some(ids) = self.topics.get_mut(topic) {
                ids.retain(|s| *s != id);
                if ids.is_empty() {
                    self.topics.remove(topic);
                }
            }
        }

        tracing::debug!(
            session_id = %id,
            reason = ?reason,
            remaining_sessions = self.sessions.len(),
            "Subscription session removed"
        );
        true
    }
}

pub(crate) fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // Registry invariants hold between statements, so a poisoned lock is still usable
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Broker
// ============================================================================

/// Topic-addressed fan-out hub.
///
/// The registry mutex is held for the whole fan-out of a publish, so every
/// session observes one global publish order. Delivery itself is a
/// non-blocking `try_send` per session.
#[derive(Clone)]
pub struct EventBroker {
    registry: Arc<Mutex<Registry>>,
    config: BrokerConfig,
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

impl EventBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            config: BrokerConfig {
                channel_capacity: config.channel_capacity.max(1),
                ..config
            },
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Subscribe an already verified principal to a single topic
    pub fn subscribe(
        &self,
        principal: Principal,
        topic: impl Into<Topic>,
    ) -> Result<SubscriptionSession, BrokerError> {
        self.subscribe_all(principal, [topic.into()])
    }

    /// Subscribe to several topics through one session. Events from all of them
    /// arrive on the same stream in publish order.
    pub fn subscribe_all<I, T>(
        &self,
        principal: Principal,
        topics: I,
    ) -> Result<SubscriptionSession, BrokerError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Topic>,
    {
        let mut unique: Vec<Topic> = Vec::new();
        for topic in topics {
            let topic = topic.into();
            if !unique.contains(&topic) {
                unique.push(topic);
            }
        }
        if unique.is_empty() {
            return Err(BrokerError::NoTopics);
        }

        let deadline = if self.config.enforce_expiry {
            let remaining = principal.expires_at().saturating_sub(Utc::now().timestamp());
            if remaining <= 0 {
                return Err(BrokerError::PrincipalExpired);
            }
            // An expiry past what the clock can represent never fires
            tokio::time::Instant::now()
                .checked_add(std::time::Duration::from_secs(remaining.unsigned_abs()))
        } else {
            None
        };

        let (sender, receiver) = mpsc::channel(self.config.channel_capacity);
        let close = Arc::new(OnceLock::new());
        let id = SessionId::new();

        {
            let mut registry = lock(&self.registry);
            if registry.closed {
                return Err(BrokerError::Closed);
            }
            for topic in &unique {
                registry.topics.entry(topic.clone()).or_default().push(id);
            }
            registry.sessions.insert(
                id,
                SessionEntry {
                    sender,
                    topics: unique.clone(),
                    close: close.clone(),
                },
            );

            tracing::debug!(
                session_id = %id,
                subject = %principal.subject_id(),
                topics = ?unique,
                total_sessions = registry.sessions.len(),
                "Subscription session opened"
            );
        }

        Ok(SubscriptionSession::new(
            id,
            principal,
            unique,
            receiver,
            Arc::downgrade(&self.registry),
            close,
            deadline,
        ))
    }

    /// Remove a session from every topic. Idempotent; returns whether the
    /// session was still registered.
    pub fn unsubscribe(&self, id: SessionId) -> bool {
        lock(&self.registry).remove(id, CloseReason::Unsubscribed)
    }

    /// Hand `event` to every session subscribed to `topic`.
    ///
    /// Never blocks and never fails: with no subscribers this is a no-op, and a
    /// session whose channel is full is disconnected.
    pub fn publish(&self, topic: impl Into<Topic>, event: DomainEvent) -> PublishReport {
        let topic = topic.into();
        let mut report = PublishReport::default();
        let mut dropped: Vec<(SessionId, CloseReason)> = Vec::new();

        let mut registry = lock(&self.registry);
        if registry.closed {
            return report;
        }

        let Registry {
            topics,
            sessions,
            next_sequence,
            ..
        } = &mut *registry;

        let Some(ids) = topics.get(&topic) else {
            tracing::trace!(topic = %topic, kind = %event.kind, "Publish with no subscribers");
            return report;
        };

        *next_sequence += 1;
        let event = Arc::new(Event {
            topic: topic.clone(),
            kind: event.kind,
            payload: event.payload,
            published_at: Utc::now(),
            sequence: *next_sequence,
        });

        for id in ids {
            let Some(entry) = sessions.get(id) else {
                continue;
            };
            match entry.sender.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => dropped.push((*id, CloseReason::Overflow)),
                Err(TrySendError::Closed(_)) => dropped.push((*id, CloseReason::Unsubscribed)),
            }
        }

        for (id, reason) in dropped {
            if reason == CloseReason::Overflow {
                tracing::warn!(
                    session_id = %id,
                    topic = %topic,
                    capacity = self.config.channel_capacity,
                    "Subscriber too slow, disconnecting"
                );
            }
            if registry.remove(id, reason) {
                report.disconnected += 1;
            }
        }

        tracing::debug!(
            topic = %topic,
            kind = %event.kind,
            sequence = event.sequence,
            delivered = report.delivered,
            disconnected = report.disconnected,
            "Event published"
        );
        report
    }

    /// Number of live sessions subscribed to `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        lock(&self.registry)
            .topics
            .get(topic)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }

    pub fn session_count(&self) -> usize {
        lock(&self.registry).sessions.len()
    }

    /// Close every session with [`CloseReason::Shutdown`] and refuse new ones
    pub fn shutdown(&self) {
        let mut registry = lock(&self.registry);
        registry.closed = true;

        let ids: Vec<SessionId> = registry.sessions.keys().copied().collect();
        let count = ids.len();
        for id in ids {
            registry.remove(id, CloseReason::Shutdown);
        }
        tracing::info!(sessions_closed = count, "Event broker shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_core::testing::principal;
    use crypto_core::Role;
    use serde_json::json;

    fn event(kind: &str, n: i64) -> DomainEvent {
        DomainEvent::new(kind, json!({ "n": n }))
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let broker = EventBroker::default();
        let report = broker.publish("tasks", event("taskAdded", 1));
        assert_eq!(report, PublishReport::default());
    }

    #[tokio::test]
    async fn test_subscribe_registers_every_topic_once() {
        let broker = EventBroker::default();
        let session = broker
            .subscribe_all(principal("u1", Role::User), ["tasks", "comments", "tasks"])
            .unwrap();

        assert_eq!(session.topics().len(), 2);
        assert_eq!(broker.subscriber_count("tasks"), 1);
        assert_eq!(broker.subscriber_count("comments"), 1);
        assert_eq!(broker.session_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_topic_list_is_rejected() {
        let broker = EventBroker::default();
        let err = broker
            .subscribe_all(principal("u1", Role::User), Vec::<Topic>::new())
            .unwrap_err();
        assert_eq!(err, BrokerError::NoTopics);
    }

    #[tokio::test]
    async fn test_expired_principal_cannot_subscribe() {
        let broker = EventBroker::default();
        let expired = crypto_core::testing::principal_expiring_at(
            "u1",
            Role::User,
            Utc::now().timestamp() - 1,
        );
        assert_eq!(
            broker.subscribe(expired, "tasks").unwrap_err(),
            BrokerError::PrincipalExpired
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let broker = EventBroker::default();
        let session = broker.subscribe(principal("u1", Role::User), "tasks").unwrap();
        let id = session.id();

        assert!(broker.unsubscribe(id));
        assert!(!broker.unsubscribe(id));
        assert_eq!(broker.subscriber_count("tasks"), 0);
        assert_eq!(session.close_reason(), Some(CloseReason::Unsubscribed));

        drop(session);
        assert_eq!(broker.session_count(), 0);
    }

    #[tokio::test]
    async fn test_capacity_is_at_least_one() {
        let broker = EventBroker::new(BrokerConfig {
            channel_capacity: 0,
            enforce_expiry: false,
        });
        assert_eq!(broker.config().channel_capacity, 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_sessions_and_refuses_new_ones() {
        let broker = EventBroker::default();
        let mut session = broker.subscribe(principal("u1", Role::User), "tasks").unwrap();

        broker.shutdown();

        assert!(session.recv().await.is_none());
        assert_eq!(session.close_reason(), Some(CloseReason::Shutdown));
        assert_eq!(
            broker.subscribe(principal("u2", Role::User), "tasks").unwrap_err(),
            BrokerError::Closed
        );
        assert_eq!(broker.publish("tasks", event("taskAdded", 1)).delivered, 0);
    }
}

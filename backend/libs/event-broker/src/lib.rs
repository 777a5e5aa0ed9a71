//! In-process topic publish/subscribe with bounded per-session delivery.
//!
//! Publishers call [`EventBroker::publish`], which never waits on a subscriber.
//! Each [`SubscriptionSession`] owns a bounded channel; a session that falls
//! behind is disconnected with [`CloseReason::Overflow`] instead of slowing the
//! publisher down.

mod broker;
mod session;
mod topic;

pub use broker::{BrokerConfig, BrokerError, EventBroker, PublishReport, DEFAULT_CHANNEL_CAPACITY};
pub use session::{CloseReason, SessionId, SubscriptionSession};
pub use topic::{DomainEvent, Event, Topic};

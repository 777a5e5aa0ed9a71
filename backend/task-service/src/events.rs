//! Domain events published after every successful mutation.
//!
//! | topic      | kinds                                      |
//! |------------|--------------------------------------------|
//! | `tasks`    | `taskAdded`, `taskUpdated`, `taskDeleted`  |
//! | `comments` | `commentAdded`, `commentDeleted`           |

use error_types::ServiceError;
use event_broker::{DomainEvent, EventBroker};
use serde::Serialize;
use serde_json::json;

use crate::models::{Comment, Task};

pub const TASKS_TOPIC: &str = "tasks";
pub const COMMENTS_TOPIC: &str = "comments";

pub const TASK_ADDED: &str = "taskAdded";
pub const TASK_UPDATED: &str = "taskUpdated";
pub const TASK_DELETED: &str = "taskDeleted";
pub const COMMENT_ADDED: &str = "commentAdded";
pub const COMMENT_DELETED: &str = "commentDeleted";

fn event(kind: &str, payload: &impl Serialize) -> Result<DomainEvent, ServiceError> {
    let payload = serde_json::to_value(payload)
        .map_err(|e| ServiceError::InternalError(format!("event serialization failed: {e}")))?;
    Ok(DomainEvent::new(kind, payload))
}

pub fn task_added(broker: &EventBroker, task: &Task) -> Result<(), ServiceError> {
    broker.publish(TASKS_TOPIC, event(TASK_ADDED, task)?);
    Ok(())
}

pub fn task_updated(broker: &EventBroker, task: &Task) -> Result<(), ServiceError> {
    broker.publish(TASKS_TOPIC, event(TASK_UPDATED, task)?);
    Ok(())
}

pub fn task_deleted(broker: &EventBroker, task_id: &str) -> Result<(), ServiceError> {
    broker.publish(TASKS_TOPIC, event(TASK_DELETED, &json!({ "id": task_id }))?);
    Ok(())
}

pub fn comment_added(broker: &EventBroker, comment: &Comment) -> Result<(), ServiceError> {
    broker.publish(COMMENTS_TOPIC, event(COMMENT_ADDED, comment)?);
    Ok(())
}

pub fn comment_deleted(broker: &EventBroker, comment: &Comment) -> Result<(), ServiceError> {
    broker.publish(
        COMMENTS_TOPIC,
        event(
            COMMENT_DELETED,
            &json!({ "id": comment.id, "taskId": comment.task_id }),
        )?,
    );
    Ok(())
}

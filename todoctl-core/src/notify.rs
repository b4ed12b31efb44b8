//! Change notifications
//!
//! Services publish one [`ChangeEvent`] after every committed write. Delivery
//! is best effort: a failed publish is logged and never fails the write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::error::{Action, Entity};

/// Notification publish failure
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to encode change event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to deliver change event: {0}")]
    Delivery(String),
}

/// A committed write, as seen by downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub timestamp: DateTime<Utc>,
    /// `create-user`, `update-task`, `delete-task`, ...
    pub operation: String,
    pub entity: String,
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl ChangeEvent {
    pub fn new(entity: Entity, action: Action, id: i64) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: format!("{action}-{entity}"),
            entity: entity.to_string(),
            id,
            user_id: None,
        }
    }

    /// Attach the owning user of a task.
    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// Sink for change events
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn publish(&self, event: &ChangeEvent) -> Result<(), NotifyError>;
}

/// Emits each event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, event: &ChangeEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(event)?;
        tracing::info!(
            target: "todoctl::notify",
            operation = %event.operation,
            id = event.id,
            payload = %payload,
            "change event"
        );
        Ok(())
    }
}

/// Fans events out to in-process subscribers.
///
/// Publishing with no subscribers drops the event. Slow subscribers lag and
/// lose the oldest events once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<ChangeEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn publish(&self, event: &ChangeEvent) -> Result<(), NotifyError> {
        if self.sender.send(event.clone()).is_err() {
            tracing::debug!(operation = %event.operation, "no subscribers for change event");
        }
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn publish(&self, _event: &ChangeEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

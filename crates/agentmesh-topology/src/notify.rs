//! Fire-and-forget delivery notifications

use std::fmt;

use agentmesh_core::{AgentId, Message, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// What happened to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "message.broadcast")]
    Broadcast,
    #[serde(rename = "message.direct")]
    Direct,
    #[serde(rename = "message.delivered")]
    Delivered,
    #[serde(rename = "message.failed")]
    Failed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Broadcast => "message.broadcast",
            NotificationKind::Direct => "message.direct",
            NotificationKind::Delivered => "message.delivered",
            NotificationKind::Failed => "message.failed",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// A single notification about a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub message_id: MessageId,
    /// Sender of the message
    pub source: AgentId,
    /// Receiver this notification concerns, if any
    pub target: Option<AgentId>,
    pub error: Option<String>,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    fn new(kind: NotificationKind, message: &Message, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message_id: message.id().clone(),
            source: message.sender().clone(),
            target: message.receiver().cloned(),
            error: None,
            priority,
            timestamp: Utc::now(),
        }
    }

    pub fn broadcast(message: &Message) -> Self {
        Self::new(NotificationKind::Broadcast, message, Priority::Medium)
    }

    pub fn direct(message: &Message) -> Self {
        Self::new(NotificationKind::Direct, message, Priority::Medium)
    }

    pub fn delivered(message: &Message, receiver: &AgentId) -> Self {
        let mut notification = Self::new(NotificationKind::Delivered, message, Priority::Low);
        notification.target = Some(receiver.clone());
        notification
    }

    pub fn failed(message: &Message, receiver: &AgentId, error: impl Into<String>) -> Self {
        let mut notification = Self::new(NotificationKind::Failed, message, Priority::High);
        notification.target = Some(receiver.clone());
        notification.error = Some(error.into());
        notification
    }
}

/// Sink for notifications
///
/// Called from delivery tasks; implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notification: Notification) {}
}

/// In-process notification bus
///
/// Each subscriber gets its own receiver; dropping it unsubscribes. Slow
/// subscribers lag and lose the oldest notifications.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Notification>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Notifier for EventBus {
    fn notify(&self, notification: Notification) {
        // No subscribers is not an error
        let _ = self.sender.send(notification);
    }
}

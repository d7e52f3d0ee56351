//! Operator notifications
//!
//! Persistent, user-visible messages raised outside the caller's control flow
//! (rate limits, rejected status requests, transport failures). The
//! notification center keeps the newest ones in memory, logs them and fans
//! them out to subscribers.

use crate::logging::get_logger;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::RwLock as StdRwLock;
use tokio::sync::broadcast;

/// A single operator notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Sink for operator notifications. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// In-memory notification store with broadcast fan-out
pub struct NotificationCenter {
    max_retained: usize,
    items: StdRwLock<VecDeque<Notification>>,
    tx: broadcast::Sender<Notification>,
    logger: crate::logging::StructuredLogger,
}

impl NotificationCenter {
    pub fn new(max_retained: usize) -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self {
            max_retained: max_retained.max(1),
            items: StdRwLock::new(VecDeque::new()),
            tx,
            logger: get_logger("notify"),
        }
    }

    /// Retained notifications, newest first
    pub fn list(&self) -> Vec<Notification> {
        match self.items.read() {
            Ok(guard) => guard.iter().rev().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Remove a notification; returns whether it existed
    pub fn dismiss(&self, id: &str) -> bool {
        let Ok(mut guard) = self.items.write() else {
            return false;
        };
        let before = guard.len();
        guard.retain(|n| n.id != id);
        before != guard.len()
    }

    /// Receive every notification created from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Notifier for NotificationCenter {
    fn notify(&self, title: &str, message: &str) {
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            message: message.to_string(),
            created_at: Utc::now(),
        };
        self.logger
            .warn(&format!("Notification '{}': {}", title, message));

        if let Ok(mut guard) = self.items.write() {
            guard.push_back(notification.clone());
            while guard.len() > self.max_retained {
                guard.pop_front();
            }
        }
        // No subscribers is fine
        let _ = self.tx.send(notification);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

/// Pending notifications kept before the oldest are dropped.
pub const MAX_PENDING_NOTIFICATIONS: usize = 50;

/// Detail shown when a query fails without a more specific message.
pub const QUERY_FAILED_MESSAGE: &str =
    "The query failed to execute and the operation could not be complete.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Error,
    Success,
    Danger,
}

/// A user-facing notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Toast {
    pub id: String,
    pub kind: ToastKind,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Sink for user-facing outcome notifications.
pub trait NotificationSink: Send + Sync {
    fn add_error(&self, title: &str, message: &str, detail: Option<&str>);

    fn add_success(&self, message: &str);

    fn add_danger(&self, message: &str);
}

/// Collects notifications until the presentation layer drains them.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    toasts: Mutex<VecDeque<Toast>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, kind: ToastKind, title: &str, text: Option<&str>, detail: Option<&str>) {
        let toast = Toast {
            id: Uuid::new_v4().to_string(),
            kind,
            title: title.to_string(),
            text: text.map(str::to_string),
            detail: detail.filter(|d| !d.is_empty()).map(str::to_string),
            created_at: Utc::now(),
        };
        let mut toasts = self.toasts.lock().unwrap_or_else(|e| e.into_inner());
        if toasts.len() >= MAX_PENDING_NOTIFICATIONS {
            toasts.pop_front();
        }
        toasts.push_back(toast);
    }

    /// Pending notifications, oldest first, without removing them.
    pub fn snapshot(&self) -> Vec<Toast> {
        self.toasts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Remove and return all pending notifications.
    pub fn drain(&self) -> Vec<Toast> {
        std::mem::take(&mut *self.toasts.lock().unwrap_or_else(|e| e.into_inner())).into()
    }
}

impl NotificationSink for NotificationCenter {
    fn add_error(&self, title: &str, message: &str, detail: Option<&str>) {
        tracing::error!("{}: {} {}", title, message, detail.unwrap_or_default());
        self.push(ToastKind::Error, title, Some(message), detail);
    }

    fn add_success(&self, message: &str) {
        tracing::info!("{}", message);
        self.push(ToastKind::Success, message, None, None);
    }

    fn add_danger(&self, message: &str) {
        tracing::warn!("{}", message);
        self.push(ToastKind::Danger, message, None, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifications_are_recorded_in_order() {
        let center = NotificationCenter::new();
        center.add_error("Query Failed", QUERY_FAILED_MESSAGE, Some("table not found"));
        center.add_success("Acceleration deleted");
        center.add_danger("Vacuum failed");

        let toasts = center.snapshot();
        assert_eq!(toasts.len(), 3);
        assert_eq!(toasts[0].kind, ToastKind::Error);
        assert_eq!(toasts[0].detail.as_deref(), Some("table not found"));
        assert_eq!(toasts[1].title, "Acceleration deleted");
        assert_eq!(toasts[2].kind, ToastKind::Danger);
    }

    #[test]
    fn test_drain_empties_the_queue() {
        let center = NotificationCenter::new();
        center.add_success("done");
        assert_eq!(center.drain().len(), 1);
        assert!(center.drain().is_empty());
    }

    #[test]
    fn test_empty_detail_is_omitted() {
        let center = NotificationCenter::new();
        center.add_error("Query Failed", QUERY_FAILED_MESSAGE, Some(""));
        assert!(center.snapshot()[0].detail.is_none());
    }

    #[test]
    fn test_undrained_queue_keeps_only_the_newest() {
        let center = NotificationCenter::new();
        for i in 0..MAX_PENDING_NOTIFICATIONS + 5 {
            center.add_danger(&format!("failure {}", i));
        }

        let toasts = center.drain();
        assert_eq!(toasts.len(), MAX_PENDING_NOTIFICATIONS);
        assert_eq!(toasts[0].title, "failure 5");
        assert_eq!(
            toasts.last().unwrap().title,
            format!("failure {}", MAX_PENDING_NOTIFICATIONS + 4)
        );
    }
}

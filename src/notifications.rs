use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::NotificationConfig;
use crate::core::{Alert, AlertPriority};

/// Desktop notification sender with cooldown to prevent spam.
pub struct Notifier {
    enabled: bool,
    min_priority: AlertPriority,
    cooldown: Duration,
    last_sent: Mutex<Option<Instant>>,
}

impl Notifier {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            enabled: config.enabled,
            min_priority: config.min_priority,
            cooldown: Duration::from_secs(config.cooldown_seconds),
            last_sent: Mutex::new(None),
        }
    }

    /// Try to send a desktop notification for a newly created alert.
    /// Returns true if a notification was sent, false if skipped.
    pub fn notify(&self, alert: &Alert) -> bool {
        if !self.should_notify(alert) {
            return false;
        }
        if !self.check_cooldown() {
            return false;
        }

        self.send_notification(alert);
        true
    }

    fn should_notify(&self, alert: &Alert) -> bool {
        self.enabled && alert.priority.rank() <= self.min_priority.rank()
    }

    /// Check and update cooldown. Returns true if enough time has passed.
    fn check_cooldown(&self) -> bool {
        let mut last = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if let Some(prev) = *last
            && now.duration_since(prev) < self.cooldown
        {
            return false;
        }
        *last = Some(now);
        true
    }

    /// Fire-and-forget: send the actual desktop notification.
    fn send_notification(&self, alert: &Alert) {
        let title = alert.title.clone();
        let mut body = alert.message.clone();
        if let Some(ref staff) = alert.assigned_staff {
            body.push_str(&format!(" (assigned to {staff})"));
        }

        // background thread so a slow notification daemon never stalls ingestion
        std::thread::spawn(move || {
            if let Err(e) = notify_rust::Notification::new()
                .summary(&title)
                .body(&body)
                .show()
            {
                tracing::debug!("Desktop notification failed: {e}");
            }
        });
    }
}

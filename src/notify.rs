use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::{Notification, Severity};

pub const DEFAULT_DISPLAY_DURATION: Duration = Duration::from_secs(6);

#[derive(Debug, Default)]
struct Slot {
    entry: Option<Notification>,
    shown_at: Option<Instant>,
}

/// Single-slot message channel. The latest `show` always wins; there is no
/// backlog.
#[derive(Debug)]
pub struct NotificationQueue {
    slot: Mutex<Slot>,
    display_for: Duration,
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_DURATION)
    }
}

impl NotificationQueue {
    pub fn new(display_for: Duration) -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            display_for,
        }
    }

    pub fn show(&self, message: impl Into<String>, severity: Severity) {
        let message = message.into();
        log::info!("[{}] {}", severity, message);
        let mut slot = self.slot.lock();
        slot.entry = Some(Notification {
            message,
            severity,
            visible: true,
        });
        slot.shown_at = Some(Instant::now());
    }

    pub fn success(&self, message: impl Into<String>) {
        self.show(message, Severity::Success);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.show(message, Severity::Warning);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.show(message, Severity::Error);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.show(message, Severity::Info);
    }

    /// Hides the current entry but keeps its content around.
    pub fn dismiss(&self) {
        let mut slot = self.slot.lock();
        if let Some(entry) = slot.entry.as_mut() {
            entry.visible = false;
        }
        slot.shown_at = None;
    }

    /// Hides the entry once it has been on screen for the display duration.
    /// Returns true if it hid something.
    pub fn expire_due(&self) -> bool {
        let mut slot = self.slot.lock();
        let due = slot
            .shown_at
            .is_some_and(|shown_at| shown_at.elapsed() >= self.display_for);
        if !due {
            return false;
        }
        slot.shown_at = None;
        if let Some(entry) = slot.entry.as_mut() {
            entry.visible = false;
        }
        true
    }

    /// The last entry shown, visible or not.
    pub fn current(&self) -> Option<Notification> {
        self.slot.lock().entry.clone()
    }

    pub fn visible(&self) -> Option<Notification> {
        self.current().filter(|entry| entry.visible)
    }
}

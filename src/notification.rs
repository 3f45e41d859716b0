//! Transient user notifications
//!
//! Services and controllers report outcomes through a [`Notifier`]; the UI
//! decides how to show them (toasts in the web view, log lines in the CLI).

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Sink for user-facing notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);

    fn success(&self, message: &str) {
        self.notify(Notice {
            level: NoticeLevel::Success,
            message: message.to_string(),
        });
    }

    fn info(&self, message: &str) {
        self.notify(Notice {
            level: NoticeLevel::Info,
            message: message.to_string(),
        });
    }

    fn error(&self, message: &str) {
        self.notify(Notice {
            level: NoticeLevel::Error,
            message: truncate(message, 200),
        });
    }
}

fn truncate(message: &str, max_chars: usize) -> String {
    if message.chars().count() > max_chars {
        let cut: String = message.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        message.to_string()
    }
}

/// Writes notices to the log. Used by the CLI and as the default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success | NoticeLevel::Info => log::info!("{}", notice.message),
            NoticeLevel::Error => log::error!("{}", notice.message),
        }
    }
}

/// Buffers notices until the UI drains them.
#[derive(Debug, Default, Clone)]
pub struct QueuedNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl QueuedNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock())
    }

    pub fn snapshot(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl Notifier for QueuedNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

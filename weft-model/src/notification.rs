use serde::{Deserialize, Serialize};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    #[default]
    Info,
}

/// Notification contract: `{type, message, title?, duration?}`.
///
/// `duration` is in milliseconds. `Some(0)` persists until dismissed; `None`
/// uses the runtime's configured default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSpec {
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl NotificationSpec {
    fn with_kind(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            title: None,
            duration: None,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::with_kind(NotificationKind::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_kind(NotificationKind::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_kind(NotificationKind::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::with_kind(NotificationKind::Info, message)
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the display duration in milliseconds. `0` means persistent.
    pub fn lasting(mut self, duration_ms: u64) -> Self {
        self.duration = Some(duration_ms);
        self
    }
}

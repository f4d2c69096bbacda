use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// User-visible message produced by a dashboard action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, message)
    }

    /// Actionable preconditions become warnings, everything else an error
    pub fn from_error(err: &AppError) -> Self {
        let level = if err.is_user_actionable() {
            NotificationLevel::Warning
        } else {
            NotificationLevel::Error
        };
        Self::new(level, err.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_error_levels() {
        let prompt = Notification::from_error(&AppError::WalletNotConnected);
        assert_eq!(prompt.level, NotificationLevel::Warning);
        assert_eq!(prompt.message, "Please connect your wallet first!");

        let failure = Notification::from_error(&AppError::ChainSubmissionFailed("reverted".into()));
        assert_eq!(failure.level, NotificationLevel::Error);
        assert!(failure.message.contains("reverted"));
    }
}

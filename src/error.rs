use crate::chain_client::ChainError;
use thiserror::Error;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// No signing connection, or the connection has no account
    #[error("Wallet not connected")]
    WalletNotConnected,

    /// Network or service failure (price service, chat endpoint, RPC reads)
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Price service returned an empty result set for the feed
    #[error("No data for feed: {0}")]
    FeedDataMissing(String),

    /// Contract has no quote for the feed within the age bound
    #[error("Stale or missing on-chain quote: {0}")]
    StaleOrMissingQuote(String),

    /// Transaction rejected, reverted, or unconfirmed
    #[error("Chain submission failed: {0}")]
    ChainSubmissionFailed(String),

    /// Chat endpoint answered with zero choices
    #[error("Chat completion returned no choices")]
    EmptyCompletion,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Message(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Transient failures the user may retry by hand; pollers retry on their next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::UpstreamUnavailable(_) | AppError::EmptyCompletion
        )
    }

    /// Precondition failures surfaced as a prompt rather than an error report
    pub fn is_user_actionable(&self) -> bool {
        matches!(self, AppError::WalletNotConnected)
    }

    /// Text shown in the dashboard notification for this error
    pub fn user_message(&self) -> String {
        match self {
            AppError::WalletNotConnected => "Please connect your wallet first!".to_string(),
            AppError::StaleOrMissingQuote(_) => {
                "Failed to read on-chain price. Make sure the price feed has been updated first."
                    .to_string()
            }
            AppError::ChainSubmissionFailed(reason) => {
                format!("Transaction failed: {}", reason)
            }
            AppError::FeedDataMissing(feed) => format!("No price data available for {}", feed),
            AppError::UpstreamUnavailable(_) | AppError::EmptyCompletion => {
                format!("{}. Please try again.", self)
            }
            other => other.to_string(),
        }
    }

    /// Map a chain failure on a write path (fee quote, submit, confirm)
    pub fn from_submission(err: ChainError) -> Self {
        match err {
            ChainError::NotConnected => AppError::WalletNotConnected,
            other => AppError::ChainSubmissionFailed(other.to_string()),
        }
    }

    /// Map a chain failure on a read-only call
    pub fn from_read(err: ChainError) -> Self {
        match err {
            ChainError::NotConnected => AppError::WalletNotConnected,
            other => AppError::UpstreamUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::UpstreamUnavailable("timeout".into()).is_retryable());
        assert!(AppError::EmptyCompletion.is_retryable());
        assert!(!AppError::ChainSubmissionFailed("reverted".into()).is_retryable());
        assert!(!AppError::WalletNotConnected.is_retryable());
    }

    #[test]
    fn test_submission_mapping() {
        let err = AppError::from_submission(ChainError::Reverted("insufficient fee".into()));
        match err {
            AppError::ChainSubmissionFailed(reason) => assert!(reason.contains("insufficient fee")),
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(AppError::from_submission(ChainError::NotConnected).is_user_actionable());
    }

    #[test]
    fn test_user_message() {
        let msg = AppError::WalletNotConnected.user_message();
        assert!(msg.contains("connect your wallet"));
    }
}

//! Error types for the health monitor.

use stagehand_types::{ChannelHealth, ErrorCode};
use thiserror::Error;

/// Errors that can occur while tracking or resolving channel health.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HealthError {
    /// Channel was never declared.
    #[error("channel not declared: {0}")]
    ChannelNotFound(String),

    /// Channel declared twice.
    #[error("channel already declared: {0}")]
    ChannelAlreadyDeclared(String),

    /// A critical-path channel with no fallback is unhealthy.
    #[error("critical channel {channel} is {health}, no fallback declared")]
    CriticalChannelDown { channel: String, health: ChannelHealth },

    /// The heartbeat source could not be polled.
    #[error("heartbeat source failed: {0}")]
    SourceFailed(String),
}

impl HealthError {
    pub fn code(&self) -> ErrorCode {
        match self {
            HealthError::ChannelNotFound(_) => ErrorCode::NotFound,
            HealthError::ChannelAlreadyDeclared(_) => ErrorCode::ValidationError,
            HealthError::CriticalChannelDown { .. } => ErrorCode::ExecutionFatal,
            HealthError::SourceFailed(_) => ErrorCode::ChannelDegraded,
        }
    }
}

/// Result type for health operations.
pub type HealthResult<T> = Result<T, HealthError>;

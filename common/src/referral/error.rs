// Referral hierarchy error types

use thiserror::Error;

use crate::UserId;

/// Errors that can occur in the referral hierarchy index
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReferralError {
    /// A user has at most one A-level referrer, bound once at registration
    #[error("User {0} has already bound a referrer")]
    AlreadyBound(UserId),

    /// Attempted to set self as referrer
    #[error("Cannot set self as referrer")]
    SelfReferral,

    /// Detected a cycle in the referral chain
    #[error("Circular reference detected in referral chain")]
    CircularReference,

    /// Referrer is not a registered user
    #[error("Referrer not found: {0}")]
    ReferrerNotFound(UserId),

    /// User not found in the referral index
    #[error("User not found in referral index: {0}")]
    UserNotFound(UserId),
}

/// Result type for referral operations
pub type ReferralResult<T> = Result<T, ReferralError>;

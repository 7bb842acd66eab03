//! Error types surfaced by registry backends.

use crate::types::Transport;
use thiserror::Error;

/// Failure reported by a `DeviceRegistry` operation.
///
/// The routing core never propagates these past logging: a failed registry
/// call collapses to a `false` result and the machine recomputes its actual
/// state from whatever the stack reports next.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The backend profile service for the transport is not bound.
    #[error("bluetooth service unavailable for {0}")]
    ServiceUnavailable(Transport),

    /// The stack refused the request.
    #[error("request rejected by bluetooth stack: {0}")]
    Rejected(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::ServiceUnavailable(Transport::Hfp);
        assert_eq!(err.to_string(), "bluetooth service unavailable for hfp");

        let err = RegistryError::Rejected("busy".to_string());
        assert!(err.to_string().contains("busy"));
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result of one tracking call attempt.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Success,
    FailedConnectivity,
    FailedServerResponse,
    FailedUnrecoverable,
}

/// Why a failed attempt failed, for picking the retry path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// No connectivity: wait for the network to come back.
    TransientNetwork,
    /// Bad status or I/O error: retry on a backoff timer.
    TransientServer,
    /// Malformed request: never retried.
    Permanent,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown result code {0}")]
pub struct UnknownResultCode(pub i64);

impl ResultCode {
    /// Stable numeric code used when the result is persisted.
    pub fn code(self) -> i64 {
        match self {
            ResultCode::Success => 0,
            ResultCode::FailedConnectivity => 1,
            ResultCode::FailedServerResponse => 2,
            ResultCode::FailedUnrecoverable => 3,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, UnknownResultCode> {
        match code {
            0 => Ok(ResultCode::Success),
            1 => Ok(ResultCode::FailedConnectivity),
            2 => Ok(ResultCode::FailedServerResponse),
            3 => Ok(ResultCode::FailedUnrecoverable),
            other => Err(UnknownResultCode(other)),
        }
    }

    /// Success and unrecoverable failures end the sequence.
    pub fn is_terminal(self) -> bool {
        matches!(self, ResultCode::Success | ResultCode::FailedUnrecoverable)
    }

    pub fn failure_class(self) -> Option<FailureClass> {
        match self {
            ResultCode::Success => None,
            ResultCode::FailedConnectivity => Some(FailureClass::TransientNetwork),
            ResultCode::FailedServerResponse => Some(FailureClass::TransientServer),
            ResultCode::FailedUnrecoverable => Some(FailureClass::Permanent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        for rc in [
            ResultCode::Success,
            ResultCode::FailedConnectivity,
            ResultCode::FailedServerResponse,
            ResultCode::FailedUnrecoverable,
        ] {
            assert_eq!(ResultCode::from_code(rc.code()), Ok(rc));
        }
        assert_eq!(ResultCode::from_code(7), Err(UnknownResultCode(7)));
    }

    #[test]
    fn only_success_and_unrecoverable_are_terminal() {
        assert!(ResultCode::Success.is_terminal());
        assert!(ResultCode::FailedUnrecoverable.is_terminal());
        assert!(!ResultCode::FailedConnectivity.is_terminal());
        assert!(!ResultCode::FailedServerResponse.is_terminal());
    }

    #[test]
    fn failure_classes() {
        assert_eq!(ResultCode::Success.failure_class(), None);
        assert_eq!(ResultCode::FailedConnectivity.failure_class(), Some(FailureClass::TransientNetwork));
        assert_eq!(ResultCode::FailedServerResponse.failure_class(), Some(FailureClass::TransientServer));
        assert_eq!(ResultCode::FailedUnrecoverable.failure_class(), Some(FailureClass::Permanent));
    }
}

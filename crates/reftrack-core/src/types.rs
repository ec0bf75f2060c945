use serde::{Deserialize, Serialize};

use crate::model::ResultCode;

/// Persisted state of the one in-flight attribution retry sequence.
///
/// `attempt_count` is the number of attempts already made.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub referrer: String,
    pub attempt_count: u32,
    pub last_failure_reason: ResultCode,
}

/// Job handed to a host task queue by the delegated strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackingJob {
    pub referrer: String,
    pub network_required: bool,
    pub backoff: BackoffKind,
    pub base_interval_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackoffKind {
    Linear,
    Exponential,
}

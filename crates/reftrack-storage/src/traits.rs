use reftrack_core::AttemptRecord;

/// Namespace of the single storage slot. Records are keyed by this, never by
/// referrer, so at most one retry sequence exists per installation.
pub const ATTEMPT_SLOT: &str = "reftrack.attempt";

/// Durable single-slot store for the in-flight attempt record.
///
/// `save` overwrites whatever the slot holds. Implementations must survive
/// process restarts: the store is the only way to resume a pending retry.
pub trait AttemptStore: Send + Sync {
    fn save(&self, record: &AttemptRecord) -> anyhow::Result<()>;
    fn load(&self) -> anyhow::Result<Option<AttemptRecord>>;
    fn clear(&self) -> anyhow::Result<()>;
}

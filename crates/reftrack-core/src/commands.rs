use crate::types::AttemptRecord;

/// Side effects requested by the functional core. The coordinator applies them
/// in order against the store, the connectivity gate and the retry timer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    ClearRecord,
    SetListening(bool),
    SaveRecord(AttemptRecord),
    ScheduleRetry { referrer: String, attempt: u32, delay_ms: u64 },
}

use crate::model::ResultCode;

/// How one coordinator run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Success or an unrecoverable failure; state cleared.
    Completed(ResultCode),
    /// Attempt ceiling passed; state cleared silently.
    Exhausted { reason: ResultCode },
    /// Retry pending; `attempt` attempts have been made so far.
    Deferred { attempt: u32, reason: ResultCode },
}

impl Outcome {
    pub fn is_final(&self) -> bool {
        !matches!(self, Outcome::Deferred { .. })
    }
}

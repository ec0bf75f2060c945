use std::sync::{Mutex, MutexGuard};

use reftrack_core::AttemptRecord;

use crate::traits::AttemptStore;

/// In-memory store for tests. Not durable.
#[derive(Default)]
pub struct InMemoryAttemptStore {
    slot: Mutex<Option<AttemptRecord>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: AttemptRecord) -> Self {
        Self { slot: Mutex::new(Some(record)) }
    }

    fn slot(&self) -> MutexGuard<'_, Option<AttemptRecord>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AttemptStore for InMemoryAttemptStore {
    fn save(&self, record: &AttemptRecord) -> anyhow::Result<()> {
        *self.slot() = Some(record.clone());
        Ok(())
    }

    fn load(&self) -> anyhow::Result<Option<AttemptRecord>> {
        Ok(self.slot().clone())
    }

    fn clear(&self) -> anyhow::Result<()> {
        *self.slot() = None;
        Ok(())
    }
}

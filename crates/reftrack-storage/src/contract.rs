use anyhow::{anyhow, Result};
use reftrack_core::{AttemptRecord, ResultCode};

use crate::traits::AttemptStore;

/// Shared store contract suite, run against every `AttemptStore` implementation.
/// Expects an empty store and leaves it empty.
pub fn run_store_contract_suite(store: &dyn AttemptStore) -> Result<()> {
    if store.load()?.is_some() {
        return Err(anyhow!("store must start empty for contract tests"));
    }

    // clear on an empty slot is fine
    store.clear()?;

    let first = AttemptRecord {
        referrer: "utm_source=xing&xing_conversion_id=first".to_string(),
        attempt_count: 1,
        last_failure_reason: ResultCode::FailedConnectivity,
    };
    store.save(&first)?;
    if store.load()?.as_ref() != Some(&first) {
        return Err(anyhow!("expected saved record to load back unchanged"));
    }

    // a different referrer overwrites the single slot
    let second = AttemptRecord {
        referrer: "utm_source=xing&xing_conversion_id=second".to_string(),
        attempt_count: 7,
        last_failure_reason: ResultCode::FailedServerResponse,
    };
    store.save(&second)?;
    if store.load()?.as_ref() != Some(&second) {
        return Err(anyhow!("expected second save to overwrite the slot"));
    }

    store.clear()?;
    if store.load()?.is_some() {
        return Err(anyhow!("expected slot to be empty after clear"));
    }
    store.clear()?;
    Ok(())
}

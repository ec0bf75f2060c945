use anyhow::{anyhow, Context, Result};
use std::path::Path;

use crate::Config;

pub fn doctor(root: &Path, cfg: &Config) -> Result<()> {
    let url = url::Url::parse(&cfg.endpoint.url).with_context(|| format!("endpoint url {}", cfg.endpoint.url))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow!("endpoint url must be http or https, got {}", url.scheme()));
    }

    if cfg.retry.max_attempts == 0 {
        return Err(anyhow!("retry.max_attempts must be at least 1"));
    }

    if cfg.endpoint.timeout_secs == 0 {
        return Err(anyhow!("endpoint.timeout_secs must be at least 1"));
    }

    let sysfs = Path::new(&cfg.connectivity.sysfs_root);
    if !sysfs.is_dir() {
        return Err(anyhow!(
            "connectivity root {} not found; set connectivity.sysfs_root",
            sysfs.display()
        ));
    }

    let db_path = cfg.db_path(root);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    Ok(())
}

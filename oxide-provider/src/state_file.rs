//! JSON files holding configurations and recorded state.

use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};

use crate::value::Attributes;

/// Load attributes from `path`. A missing file yields `None`.
pub async fn load(path: &Path) -> Result<Option<Attributes>> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    let attrs = serde_json::from_slice(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(attrs))
}

/// Load attributes that must exist.
pub async fn load_required(path: &Path) -> Result<Attributes> {
    load(path)
        .await?
        .with_context(|| format!("{} does not exist", path.display()))
}

/// Write attributes to `path`, replacing it atomically.
pub async fn save(path: &Path, attrs: &Attributes) -> Result<()> {
    let mut data = serde_json::to_vec_pretty(attrs)?;
    data.push(b'\n');

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &data)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

/// Remove `path` if it exists.
pub async fn remove(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}

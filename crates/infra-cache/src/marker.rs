// Verification marker (`.hash`)
// Its content equal to the expected hash is the only "up to date" signal.

use std::io::ErrorKind;
use std::path::Path;

use doorstop_harness_core::Result;

/// Marker content, or None if there is no marker
pub async fn read(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn matches(path: &Path, expected_hash: &str) -> Result<bool> {
    Ok(read(path).await?.as_deref() == Some(expected_hash))
}

/// Write via temp file + rename so readers never see a torn marker
pub async fn write(path: &Path, hash: &str) -> Result<()> {
    let tmp = path.with_file_name(format!(".hash.tmp-{}", uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp, hash).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

pub async fn remove(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

//! Output directory management and atomic file writes
//!
//! Every snapshot lands in `<output_dir>/<id>.json`. Writes go to a hidden
//! temp file in the same directory and are renamed into place, so a reader
//! sees either the previous file or the complete new one, never a prefix.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::{FetchError, Result};
use crate::types::Identifier;

/// Suffix of in-progress temp files
const TEMP_SUFFIX: &str = ".part";

/// Directory of per-identifier snapshot files
#[derive(Clone, Debug)]
pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    /// Create a store rooted at `dir` (nothing is touched until [`prepare`](Self::prepare))
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path of the snapshot for `id`
    pub fn path_for(&self, id: Identifier) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Create the directory if needed and remove temp files left by interrupted runs
    ///
    /// Returns the number of stale temp files removed.
    pub async fn prepare(&self) -> Result<usize> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if is_temp_name(name) {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        tracing::warn!(file = name, error = %e, "Failed to remove stale temp file");
                    }
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, dir = %self.dir.display(), "Removed stale temp files");
        }
        Ok(removed)
    }

    /// Atomically write the payload for `id`, returning the bytes written
    pub async fn write(&self, id: Identifier, payload: &[u8]) -> std::result::Result<usize, FetchError> {
        let path = self.path_for(id);
        write_atomic(&path, payload)
            .await
            .map_err(|e| FetchError::WriteFailure {
                path,
                reason: e.to_string(),
            })?;
        Ok(payload.len())
    }
}

/// Serialize `value` as pretty JSON and write it atomically to `path`
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(value)?;
    json.push(b'\n');
    write_atomic(path, &json).await?;
    Ok(())
}

/// Write `contents` to a sibling temp file, flush it, and rename it over `path`
///
/// On failure the temp file is removed and `path` is left untouched.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let temp_path = temp_path_for(path)?;

    let result: std::io::Result<()> = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if result.is_err() {
        // Best effort; the sweep in `prepare` catches anything left behind
        tokio::fs::remove_file(&temp_path).await.ok();
    }
    result
}

fn temp_path_for(path: &Path) -> std::io::Result<PathBuf> {
    let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("not a file path: {}", path.display()),
        )
    })?;
    let nonce: u32 = rand::random();
    Ok(path.with_file_name(format!(".{}.{:08x}{}", file_name, nonce, TEMP_SUFFIX)))
}

/// Whether `name` is a snapshot temp file, `.<digits>.json.<8 hex>.part`
fn is_temp_name(name: &str) -> bool {
    let Some(inner) = name
        .strip_prefix('.')
        .and_then(|n| n.strip_suffix(TEMP_SUFFIX))
    else {
        return false;
    };
    let Some((file_name, nonce)) = inner.rsplit_once('.') else {
        return false;
    };
    let Some(stem) = file_name.strip_suffix(".json") else {
        return false;
    };

    nonce.len() == 8
        && nonce.bytes().all(|b| b.is_ascii_hexdigit())
        && !stem.is_empty()
        && stem.bytes().all(|b| b.is_ascii_digit())
}

//! Temp-file-then-rename writes

use tracing::{debug, warn};

use crate::error::Result;
use crate::port::FilePort;

/// Suffix of the staging file next to the target.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Write `bytes` to `path` so a reader sees either the old file or the
/// complete new one.
///
/// The bytes go to `<path>.tmp`, the old file is deleted, and the temp file
/// is renamed into place. On any failure the temp file is removed before
/// the error is returned.
pub async fn write_atomic(files: &dyn FilePort, path: &str, bytes: &[u8]) -> Result<()> {
    let temp = format!("{}{}", path, TEMP_SUFFIX);

    let outcome = async {
        files.write(&temp, bytes).await?;
        if files.exists(path).await? {
            files.delete(path).await?;
        }
        files.rename(&temp, path).await
    }
    .await;

    match outcome {
        Ok(()) => {
            debug!("Wrote {} ({} bytes)", path, bytes.len());
            Ok(())
        }
        Err(err) => {
            if files.exists(&temp).await.unwrap_or(false) {
                if let Err(cleanup) = files.delete(&temp).await {
                    warn!("Could not remove {}: {}", temp, cleanup);
                }
            }
            Err(err.into())
        }
    }
}

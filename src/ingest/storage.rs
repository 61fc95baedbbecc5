use tracing::info;

use crate::archive::Archive;
use crate::backend::Backend;
use crate::error::ArchiveError;

pub const DEFAULT_BUCKET: &str = "archives";

/// Object key for an account's raw export.
pub fn storage_key(account_id: &str) -> String {
    format!("{account_id}/archive.json")
}

/// Store the raw export under the account's key, replacing any earlier upload.
pub async fn upload_archive_to_storage(
    backend: &dyn Backend,
    bucket: &str,
    archive: &Archive,
) -> Result<String, ArchiveError> {
    let key = storage_key(&archive.account.account_id);
    backend
        .put_object(bucket, &key, "application/json", archive.raw().to_vec())
        .await
        .map_err(ArchiveError::UploadFailed)?;
    info!(bucket, key = %key, bytes = archive.raw().len(), "stored raw archive");
    Ok(key)
}

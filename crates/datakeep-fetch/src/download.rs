use std::path::Path;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::trace;

use crate::error::{FetchError, Result};
use crate::http::BoxStream;

/// Stream `body` into a newly created file at `path`, returning the byte count.
///
/// The file is synced before returning. On failure a partially written file
/// is left in place; removing it is the caller's job.
pub async fn download_to_file<E>(
    mut body: BoxStream<'static, std::result::Result<Bytes, E>>,
    path: &Path,
) -> Result<u64>
where
    E: std::error::Error,
{
    let io_error = |source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(path).await.map_err(io_error)?;
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let bytes = chunk.map_err(|e| FetchError::Network(e.to_string()))?;
        file.write_all(&bytes).await.map_err(io_error)?;
        written += bytes.len() as u64;
    }

    file.flush().await.map_err(io_error)?;
    file.sync_all().await.map_err(io_error)?;

    trace!(path = %path.display(), bytes = written, "body written");
    Ok(written)
}

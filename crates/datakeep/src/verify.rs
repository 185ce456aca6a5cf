use std::io;
use std::path::PathBuf;

use datakeep_verify::{ExpectedDigest, Md5Hasher, VerificationError, hash_file};

/// Check the downloaded payload at `path` against a `Content-MD5` header
/// value, reading the file on the blocking pool.
///
/// A header that is neither base64 nor hex MD5 fails like a mismatch.
pub(crate) async fn check_md5(path: PathBuf, header: String) -> Result<(), VerificationError> {
    tokio::task::spawn_blocking(move || {
        let expected = ExpectedDigest::parse(&header, Md5Hasher::LEN)?;
        let actual = hash_file(&path, Md5Hasher::new())?;
        expected.verify(&actual)
    })
    .await
    .map_err(|e| VerificationError::Io(io::Error::other(e)))?
}

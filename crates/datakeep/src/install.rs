use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use datakeep_fs::{AtomicWriteOptions, FileStamp, atomic_replace, remove_if_exists, with_suffix};
use flate2::read::MultiGzDecoder;
use tracing::{debug, trace};

use crate::config::DataFileOptions;

const INFLATED_SUFFIX: &str = "_inflated";

#[derive(Debug, thiserror::Error)]
pub(crate) enum InstallError {
    #[error("failed to decompress '{path}': {source}")]
    Decompress { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Place(#[from] datakeep_fs::Error),

    #[error("install task failed: {0}")]
    Task(String),
}

/// Temporary files created during one cycle, removed when it ends.
#[derive(Debug, Default)]
pub(crate) struct ScratchFiles {
    paths: Vec<PathBuf>,
}

impl ScratchFiles {
    pub(crate) fn track(&mut self, path: PathBuf) { self.paths.push(path); }

    /// Remove every tracked file, returning the failures.
    pub(crate) async fn remove_all(self) -> Vec<datakeep_fs::Error> {
        if self.paths.is_empty() {
            return Vec::new();
        }

        let paths = self.paths;
        tokio::task::spawn_blocking(move || {
            paths
                .iter()
                .filter_map(|path| match remove_if_exists(path) {
                    Ok(removed) => {
                        trace!(path = %path.display(), removed, "scratch file cleaned");
                        None
                    }
                    Err(e) => Some(e),
                })
                .collect::<Vec<_>>()
        })
        .await
        .unwrap_or_else(|e| {
            vec![datakeep_fs::Error::Remove {
                path:   PathBuf::new(),
                source: io::Error::other(e),
            }]
        })
    }
}

/// The file an install left at the destination.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Installed {
    pub(crate) bytes: u64,
    pub(crate) stamp: FileStamp,
}

/// Put the downloaded payload at `options.path`, inflating it first when
/// `decompress` is set.
///
/// Readers of the destination see either the previous payload or the new
/// one, never a partial write.
pub(crate) async fn install(
    options: &DataFileOptions,
    download: &Path,
    scratch: &mut ScratchFiles,
) -> Result<Installed, InstallError> {
    let source = if options.decompress {
        let inflated = with_suffix(download, INFLATED_SUFFIX);
        scratch.track(inflated.clone());
        Some(inflated)
    } else {
        None
    };

    let download = download.to_path_buf();
    let destination = options.path.clone();
    tokio::task::spawn_blocking(move || -> Result<Installed, InstallError> {
        let payload = match &source {
            Some(inflated) => {
                let bytes = gunzip(&download, inflated)?;
                debug!(from = %download.display(), bytes, "payload decompressed");
                inflated
            }
            None => &download,
        };
        let bytes = atomic_replace(payload, &destination, AtomicWriteOptions::new().sync(true))?;
        let stamp = FileStamp::of(&destination)?;
        Ok(Installed { bytes, stamp })
    })
    .await
    .map_err(|e| InstallError::Task(e.to_string()))?
}

fn gunzip(archive: &Path, target: &Path) -> Result<u64, InstallError> {
    let decompress_error = |source| InstallError::Decompress {
        path: archive.to_path_buf(),
        source,
    };

    // Publishers may concatenate gzip members; every member is part of the payload.
    let input = File::open(archive).map_err(decompress_error)?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(input));
    let mut output = File::create(target).map_err(decompress_error)?;
    let written = io::copy(&mut decoder, &mut output).map_err(decompress_error)?;
    output.sync_all().map_err(decompress_error)?;
    Ok(written)
}

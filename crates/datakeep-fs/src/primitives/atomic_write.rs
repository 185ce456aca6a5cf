use std::fs;
use std::io;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::{Error, Result};

#[cfg(unix)]
const DEFAULT_PERMISSIONS: u32 = 0o644;

#[derive(Clone, Copy, Debug, Default)]
pub struct AtomicWriteOptions {
    pub sync: bool,
}

impl AtomicWriteOptions {
    pub fn new() -> Self { Self::default() }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

/// Copy `source` into a staging file next to `destination`, then rename it over
/// `destination`. Returns the number of bytes placed.
pub fn atomic_replace(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    options: AtomicWriteOptions,
) -> Result<u64> {
    let source = source.as_ref();
    let destination = destination.as_ref();

    let mut input = fs::File::open(source).map_err(|e| Error::Read {
        path: source.to_path_buf(),
        source: e,
    })?;
    let mut staged = stage_beside(destination)?;

    let copied = io::copy(&mut input, staged.as_file_mut()).map_err(|e| Error::Write {
        path: staged.path().to_path_buf(),
        source: e,
    })?;

    commit(staged, destination, options)?;
    Ok(copied)
}

// The staging file must share a filesystem with the destination for the
// rename to be atomic, so it lives in the destination's directory.
fn stage_beside(path: &Path) -> Result<NamedTempFile> {
    let parent = match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => {
            return Err(Error::NoParent {
                path: path.to_path_buf(),
            });
        }
    };

    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| Error::Write {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| Error::Write {
            path: parent.to_path_buf(),
            source: e,
        })
}

fn commit(staged: NamedTempFile, path: &Path, options: AtomicWriteOptions) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        // The replacement keeps the destination's mode, or gets 0o644 if it is new.
        let permissions = fs::metadata(path)
            .map(|meta| meta.permissions())
            .unwrap_or_else(|_| fs::Permissions::from_mode(DEFAULT_PERMISSIONS));
        fs::set_permissions(staged.path(), permissions).map_err(|e| Error::Write {
            path: staged.path().to_path_buf(),
            source: e,
        })?;
    }

    if options.sync {
        staged.as_file().sync_all().map_err(|e| Error::Write {
            path: staged.path().to_path_buf(),
            source: e,
        })?;
    }

    // A failed persist hands the staging file back; dropping it removes it.
    staged.persist(path).map_err(|e| Error::Write {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    Ok(())
}

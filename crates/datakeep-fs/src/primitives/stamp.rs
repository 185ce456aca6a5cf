use std::fs::{self, Metadata};
use std::path::Path;
use std::time::SystemTime;

use crate::{Error, Result};

/// Identity of a file at one moment: its length and modification time, plus
/// device and inode on unix. Any rewrite or replacement of the file yields a
/// different stamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStamp {
    len:      u64,
    modified: Option<SystemTime>,
    #[cfg(unix)]
    dev:      u64,
    #[cfg(unix)]
    ino:      u64,
}

impl FileStamp {
    pub fn of(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let meta = fs::metadata(path).map_err(|e| Error::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self::from_metadata(&meta))
    }

    pub fn from_metadata(meta: &Metadata) -> Self {
        #[cfg(unix)]
        use std::os::unix::fs::MetadataExt;

        Self {
            len: meta.len(),
            modified: meta.modified().ok(),
            #[cfg(unix)]
            dev: meta.dev(),
            #[cfg(unix)]
            ino: meta.ino(),
        }
    }
}

//! Filesystem primitives for installing refreshed data files.
//!
//! # Key Features
//!
//! - **Atomic Placement**: [`atomic_replace`] stages content beside the destination and
//!   renames it into place, so readers never observe a partial file
//! - **File Identity**: [`FileStamp`] records what an installed file looked like, so later
//!   changes to it can be told apart from the install itself
//! - **Scratch Naming**: [`stamped_path`] derives per-cycle download names from a stem and the
//!   current Unix time in milliseconds
//! - **Quiet Cleanup**: [`remove_if_exists`] treats an already-missing file as success

mod error;
mod primitives;

pub use error::{Error, Result};
pub use primitives::{
    AtomicWriteOptions, FileStamp, atomic_replace, remove_if_exists, stamped_path, with_suffix,
};

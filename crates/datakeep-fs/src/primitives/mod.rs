pub mod atomic_write;
pub mod scratch;
pub mod stamp;

pub use atomic_write::{AtomicWriteOptions, atomic_replace};
pub use scratch::{remove_if_exists, stamped_path, with_suffix};
pub use stamp::FileStamp;

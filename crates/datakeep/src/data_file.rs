use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use datakeep_fs::FileStamp;

use crate::config::{ConfigError, DataFileOptions};
use crate::error::EngineError;

/// The engine side of a data file.
///
/// The service never interprets the payload; it only asks the engine when
/// the installed copy was published, when a newer one is expected, and to
/// reload after a new copy lands at the data file's path.
pub trait DataFileEngine: Send + Sync {
    /// Name used in log messages.
    fn data_key(&self) -> &str;

    /// Reload the payload from the data file's path.
    fn refresh(&self) -> Result<(), EngineError>;

    /// Publish date of the installed payload, if one is loaded.
    fn date_published(&self) -> Result<Option<SystemTime>, EngineError> { Ok(None) }

    /// When the publisher is expected to release the next payload.
    fn next_update(&self) -> Result<Option<SystemTime>, EngineError> { Ok(None) }
}

/// One file an engine depends on, plus the state the service keeps for it.
pub struct DataFile {
    options:    DataFileOptions,
    engine:     Arc<dyn DataFileEngine>,
    updating:   AtomicBool,
    registered: AtomicBool,
    installed:  Mutex<Option<FileStamp>>,
}

impl DataFile {
    pub fn new(options: DataFileOptions, engine: Arc<dyn DataFileEngine>) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            options,
            engine,
            updating: AtomicBool::new(false),
            registered: AtomicBool::new(false),
            installed: Mutex::new(None),
        })
    }

    pub fn options(&self) -> &DataFileOptions { &self.options }

    pub fn identifier(&self) -> &str { &self.options.identifier }

    pub fn update_url(&self) -> &str { &self.options.update_url }

    pub fn path(&self) -> &Path { &self.options.path }

    pub fn engine(&self) -> &Arc<dyn DataFileEngine> { &self.engine }

    pub fn data_key(&self) -> &str { self.engine.data_key() }

    /// True while a refresh cycle owns this data file.
    pub fn is_updating(&self) -> bool { self.updating.load(Ordering::Acquire) }

    /// True while the data file is registered with a service.
    pub fn is_registered(&self) -> bool { self.registered.load(Ordering::Acquire) }

    pub fn refresh(&self) -> Result<(), EngineError> { self.engine.refresh() }

    /// Claim the data file for a refresh cycle.
    ///
    /// Returns `None` when another cycle already holds it. The flag clears
    /// when the guard is dropped or released.
    pub(crate) fn try_begin_update(&self) -> Option<UpdatingGuard<'_>> {
        self.updating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| UpdatingGuard {
                flag: &self.updating,
            })
    }

    pub(crate) fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::Release);
    }

    /// Remember what the file looked like right after the service installed it.
    pub(crate) fn record_install(&self, stamp: FileStamp) {
        *self
            .installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(stamp);
    }

    /// Whether `current` is still the copy the service last installed.
    pub(crate) fn is_installed_copy(&self, current: &FileStamp) -> bool {
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|installed| installed == current)
    }
}

impl std::fmt::Debug for DataFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFile")
            .field("options", &self.options)
            .field("data_key", &self.engine.data_key())
            .field("updating", &self.is_updating())
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// Holds the `updating` flag of a [`DataFile`] for the length of one cycle.
#[derive(Debug)]
pub(crate) struct UpdatingGuard<'a> {
    flag: &'a AtomicBool,
}

impl UpdatingGuard<'_> {
    pub(crate) fn release(self) {}
}

impl Drop for UpdatingGuard<'_> {
    fn drop(&mut self) { self.flag.store(false, Ordering::Release); }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullEngine;

    impl DataFileEngine for NullEngine {
        fn data_key(&self) -> &str { "null" }

        fn refresh(&self) -> Result<(), EngineError> { Ok(()) }
    }

    fn data_file() -> DataFile {
        DataFile::new(
            DataFileOptions::new("null", "https://example.com/data", "null.dat"),
            Arc::new(NullEngine),
        )
        .unwrap()
    }

    #[test]
    fn test_only_one_cycle_claims_the_file() {
        let file = data_file();

        let guard = file.try_begin_update().unwrap();
        assert!(file.is_updating());
        assert!(file.try_begin_update().is_none());

        guard.release();
        assert!(!file.is_updating());
        assert!(file.try_begin_update().is_some());
    }

    #[test]
    fn test_guard_clears_flag_on_drop() {
        let file = data_file();
        {
            let _guard = file.try_begin_update().unwrap();
        }
        assert!(!file.is_updating());
    }

    #[test]
    fn test_installed_copy_tracks_last_install() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("null.dat");
        std::fs::write(&path, b"installed").unwrap();
        let installed = FileStamp::of(&path).unwrap();
        let file = data_file();

        assert!(!file.is_installed_copy(&installed));

        file.record_install(installed);
        assert!(file.is_installed_copy(&installed));

        std::fs::write(&path, b"replaced by hand").unwrap();
        assert!(!file.is_installed_copy(&FileStamp::of(&path).unwrap()));
    }

    #[test]
    fn test_new_rejects_invalid_options() {
        let result = DataFile::new(
            DataFileOptions::new("", "https://example.com/data", "null.dat"),
            Arc::new(NullEngine),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_default_engine_hints_are_absent() {
        let engine = NullEngine;
        assert!(engine.date_published().unwrap().is_none());
        assert!(engine.next_update().unwrap().is_none());
    }
}

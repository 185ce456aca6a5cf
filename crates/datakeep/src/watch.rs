use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use datakeep_fs::FileStamp;
use notify::event::{CreateKind, ModifyKind};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, trace, warn};

use crate::config::ServiceConfig;
use crate::data_file::DataFile;
use crate::log::UpdateLog;
use crate::service::refresh_engine;

/// Start watching the path of `data_file` in the background.
///
/// The task first waits for the path to exist, then refreshes the engine
/// after each burst of external changes. Cancel the returned token to stop
/// it at any stage.
pub(crate) fn spawn(
    data_file: Arc<DataFile>,
    log: Arc<dyn UpdateLog>,
    config: ServiceConfig,
) -> CancellationToken {
    let cancel = CancellationToken::new();
    let task = WatchTask {
        data_file,
        log,
        config,
        cancel: cancel.clone(),
    };
    tokio::spawn(task.run());
    cancel
}

struct WatchTask {
    data_file: Arc<DataFile>,
    log:       Arc<dyn UpdateLog>,
    config:    ServiceConfig,
    cancel:    CancellationToken,
}

impl WatchTask {
    async fn run(self) {
        let identifier = self.data_file.identifier();
        if !self.wait_for_path().await {
            return;
        }

        let path = self.data_file.path();
        let (Some(directory), Some(file_name)) = (parent_dir(path), path.file_name()) else {
            return;
        };
        let file_name = file_name.to_os_string();

        // notify delivers on its own thread; the unbounded sender never blocks it.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = match notify::recommended_watcher(move |event: notify::Result<Event>| {
            let _ = tx.send(event);
        }) {
            Ok(watcher) => watcher,
            Err(e) => {
                self.log.log(
                    Level::ERROR,
                    &format!("Failed to create a watcher for '{}': {e}", path.display()),
                );
                return;
            }
        };
        if let Err(e) = watcher.watch(directory, RecursiveMode::NonRecursive) {
            self.log.log(
                Level::ERROR,
                &format!("Failed to watch '{}': {e}", directory.display()),
            );
            return;
        }
        info!(identifier, path = %path.display(), "watching data file");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                received = rx.recv() => match received {
                    None => break,
                    Some(Err(e)) => warn!(identifier, error = %e, "watch error"),
                    Some(Ok(event)) => {
                        if concerns(&event, &file_name) {
                            self.handle_burst(&mut rx, &file_name).await;
                        }
                    }
                },
            }
        }

        debug!(identifier, "watcher stopped");
    }

    /// Poll until the data file's path exists. Returns `false` when cancelled
    /// or when the retry limit runs out.
    async fn wait_for_path(&self) -> bool {
        let path = self.data_file.path();
        let mut attempts = 0u32;

        loop {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                return true;
            }

            if let Some(limit) = self.config.watch_retry_limit {
                if attempts >= limit {
                    self.log.log(
                        Level::WARN,
                        &format!(
                            "Gave up waiting for '{}' to exist after {attempts} attempts",
                            path.display()
                        ),
                    );
                    return false;
                }
            }
            attempts += 1;
            trace!(path = %path.display(), attempts, "waiting for data file");

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.config.watch_retry_interval) => {}
            }
        }
    }

    /// Let a burst of events on the data file settle, then refresh unless a
    /// refresh cycle owned the file during it or the file on disk is still
    /// the copy the service installed. Events for other files in the
    /// directory do not extend the burst.
    async fn handle_burst(
        &self,
        rx: &mut mpsc::UnboundedReceiver<notify::Result<Event>>,
        file_name: &OsString,
    ) {
        let debounce = self.config.watch_debounce;
        let mut during_update = self.data_file.is_updating();
        let mut quiet_at = Instant::now() + debounce;

        loop {
            match tokio::time::timeout_at(quiet_at, rx.recv()).await {
                Ok(Some(Ok(event))) if concerns(&event, file_name) => {
                    during_update |= self.data_file.is_updating();
                    quiet_at = Instant::now() + debounce;
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }
        during_update |= self.data_file.is_updating();

        if self.cancel.is_cancelled() {
            return;
        }
        if during_update || self.is_installed_copy().await {
            debug!(
                identifier = self.data_file.identifier(),
                "ignoring change made by an update cycle"
            );
            return;
        }

        info!(
            identifier = self.data_file.identifier(),
            "data file changed on disk, refreshing"
        );
        refresh_engine(&self.data_file, &*self.log).await;
    }

    async fn is_installed_copy(&self) -> bool {
        match tokio::fs::metadata(self.data_file.path()).await {
            Ok(meta) => self
                .data_file
                .is_installed_copy(&FileStamp::from_metadata(&meta)),
            Err(_) => false,
        }
    }
}

fn parent_dir(path: &Path) -> Option<&Path> {
    match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Some(Path::new(".")),
        other => other,
    }
}

fn concerns(event: &Event, file_name: &OsString) -> bool {
    let relevant = matches!(
        event.kind,
        EventKind::Create(CreateKind::File | CreateKind::Any)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any)
    );

    relevant
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use notify::event::{AccessKind, AccessMode, DataChange, RenameMode};

    use super::*;
    use crate::config::DataFileOptions;
    use crate::data_file::DataFileEngine;
    use crate::error::EngineError;
    use crate::log::MemoryLog;

    #[derive(Default)]
    struct CountingEngine {
        refreshes: AtomicUsize,
    }

    impl DataFileEngine for CountingEngine {
        fn data_key(&self) -> &str { "watched" }

        fn refresh(&self) -> Result<(), EngineError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> ServiceConfig {
        ServiceConfig::new()
            .watch_retry_interval(Duration::from_millis(50))
            .watch_debounce(Duration::from_millis(100))
    }

    fn watched(path: PathBuf) -> (Arc<DataFile>, Arc<CountingEngine>) {
        let engine = Arc::new(CountingEngine::default());
        let file = DataFile::new(
            DataFileOptions::new("watched", "https://example.com/data", path),
            engine.clone(),
        )
        .unwrap();
        (Arc::new(file), engine)
    }

    async fn wait_for(condition: impl Fn() -> bool, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        condition()
    }

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_concerns_filters_by_name_and_kind() {
        let name = OsString::from("device.dat");

        assert!(concerns(
            &event(EventKind::Modify(ModifyKind::Data(DataChange::Any)), "/data/device.dat"),
            &name
        ));
        assert!(concerns(
            &event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), "/data/device.dat"),
            &name
        ));
        assert!(concerns(
            &event(EventKind::Create(CreateKind::File), "/data/device.dat"),
            &name
        ));
        assert!(!concerns(
            &event(EventKind::Modify(ModifyKind::Data(DataChange::Any)), "/data/other.dat"),
            &name
        ));
        assert!(!concerns(
            &event(
                EventKind::Access(AccessKind::Close(AccessMode::Write)),
                "/data/device.dat"
            ),
            &name
        ));
    }

    #[test]
    fn test_parent_dir_of_bare_name() {
        assert_eq!(parent_dir(Path::new("device.dat")), Some(Path::new(".")));
        assert_eq!(parent_dir(Path::new("/data/device.dat")), Some(Path::new("/data")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_external_change_refreshes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.dat");
        std::fs::write(&path, b"v1").unwrap();
        let (file, engine) = watched(path.clone());

        let cancel = spawn(file, Arc::new(MemoryLog::new()), config());
        tokio::time::sleep(Duration::from_millis(300)).await;

        std::fs::write(&path, b"v2").unwrap();

        assert!(wait_for(|| engine.refreshes.load(Ordering::SeqCst) == 1, Duration::from_secs(5)).await);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(engine.refreshes.load(Ordering::SeqCst), 1);

        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_change_during_update_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.dat");
        std::fs::write(&path, b"v1").unwrap();
        let (file, engine) = watched(path.clone());

        let cancel = spawn(file.clone(), Arc::new(MemoryLog::new()), config());
        tokio::time::sleep(Duration::from_millis(300)).await;

        let guard = file.try_begin_update().unwrap();
        std::fs::write(&path, b"v2").unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        guard.release();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(engine.refreshes.load(Ordering::SeqCst), 0);
        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_waits_for_path_to_appear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.dat");
        let (file, engine) = watched(path.clone());

        let cancel = spawn(file, Arc::new(MemoryLog::new()), config());
        tokio::time::sleep(Duration::from_millis(200)).await;

        std::fs::write(&path, b"v1").unwrap();
        // Let the retry loop notice the file and place the watch.
        tokio::time::sleep(Duration::from_millis(400)).await;
        std::fs::write(&path, b"v2").unwrap();

        assert!(wait_for(|| engine.refreshes.load(Ordering::SeqCst) >= 1, Duration::from_secs(5)).await);
        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_change_after_install_refreshes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.dat");
        std::fs::write(&path, b"installed by the service").unwrap();
        let (file, engine) = watched(path.clone());
        file.record_install(FileStamp::of(&path).unwrap());

        let cancel = spawn(file, Arc::new(MemoryLog::new()), config());
        tokio::time::sleep(Duration::from_millis(300)).await;

        std::fs::write(&path, b"copied in by an operator").unwrap();

        assert!(wait_for(|| engine.refreshes.load(Ordering::SeqCst) == 1, Duration::from_secs(5)).await);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_sibling_events_do_not_extend_burst() {
        let dir = tempfile::tempdir().unwrap();
        let (file, engine) = watched(dir.path().join("device.dat"));
        let task = WatchTask {
            data_file: file,
            log:       Arc::new(MemoryLog::new()),
            config:    config(),
            cancel:    CancellationToken::new(),
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        // Another file in the directory keeps changing faster than the debounce.
        let chatter = tokio::spawn(async move {
            loop {
                let sibling = event(
                    EventKind::Modify(ModifyKind::Data(DataChange::Any)),
                    "/data/other.log",
                );
                if tx.send(Ok(sibling)).is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
        });

        let name = OsString::from("device.dat");
        tokio::time::timeout(Duration::from_secs(1), task.handle_burst(&mut rx, &name))
            .await
            .unwrap();
        chatter.abort();

        assert_eq!(engine.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_limit_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let (file, _engine) = watched(dir.path().join("never.dat"));
        let log = Arc::new(MemoryLog::new());

        let task = WatchTask {
            data_file: file,
            log:       log.clone(),
            config:    config().watch_retry_limit(Some(2)),
            cancel:    CancellationToken::new(),
        };

        assert!(!task.wait_for_path().await);
        assert_eq!(log.count(Level::WARN), 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let (file, _engine) = watched(dir.path().join("never.dat"));
        let cancel = CancellationToken::new();

        let task = WatchTask {
            data_file: file,
            log:       Arc::new(MemoryLog::new()),
            config:    config(),
            cancel:    cancel.clone(),
        };
        let handle = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_millis(120)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

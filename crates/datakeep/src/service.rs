use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use datakeep_fetch::HttpClient;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, warn};

use crate::config::ServiceConfig;
use crate::data_file::DataFile;
use crate::error::UpdateError;
use crate::fetch::UpdateOutcome;
use crate::log::{TracingLog, UpdateLog};
use crate::scheduler::Timer;
use crate::watch;

/// Keeps registered data files current.
///
/// Each registered [`DataFile`] gets its own pending timer and, when asked
/// for, its own watcher task. Services share nothing with each other, so
/// several can run side by side in one process. Cloning is cheap and every
/// clone drives the same registrations.
///
/// All methods that start background work must be called from within a
/// Tokio runtime.
pub struct UpdateService<C> {
    pub(crate) shared: Arc<Shared<C>>,
}

impl<C> Clone for UpdateService<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

pub(crate) struct Shared<C> {
    pub(crate) client:     C,
    pub(crate) log:        Arc<dyn UpdateLog>,
    pub(crate) config:     ServiceConfig,
    pub(crate) generation: AtomicU64,
    registrations:         Mutex<HashMap<String, Registration>>,
}

pub(crate) struct Registration {
    pub(crate) data_file: Arc<DataFile>,
    pub(crate) timer:     Option<Timer>,
    watcher:              Option<CancellationToken>,
}

impl Registration {
    fn stop(self) {
        if let Some(timer) = self.timer {
            timer.cancel();
        }
        if let Some(watcher) = self.watcher {
            watcher.cancel();
        }
        self.data_file.set_registered(false);
    }
}

impl<C> Shared<C> {
    pub(crate) fn registrations(&self) -> MutexGuard<'_, HashMap<String, Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C> Drop for Shared<C> {
    fn drop(&mut self) {
        let registrations = std::mem::take(
            self.registrations
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for (_, registration) in registrations {
            registration.stop();
        }
    }
}

impl<C: HttpClient + 'static> UpdateService<C> {
    /// A service that reports through `tracing`.
    pub fn new(client: C) -> Self {
        Self::with_config(client, ServiceConfig::default(), Arc::new(TracingLog))
    }

    pub fn with_config(client: C, config: ServiceConfig, log: Arc<dyn UpdateLog>) -> Self {
        Self {
            shared: Arc::new(Shared {
                client,
                log,
                config,
                generation: AtomicU64::new(0),
                registrations: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &ServiceConfig { &self.shared.config }

    /// Take `data_file` under management.
    ///
    /// Depending on its options this starts the first cycle right away
    /// (`update_on_start`), or arms it after the usual jittered delay
    /// (`auto_update`), and starts a watcher (`file_system_watcher`). Returns
    /// `false`, changing nothing, when a data file with the same identifier
    /// is already registered.
    pub fn register(&self, data_file: Arc<DataFile>) -> bool {
        let identifier = data_file.identifier().to_string();
        let options = data_file.options();

        {
            let mut registrations = self.shared.registrations();
            if registrations.contains_key(&identifier) {
                warn!(identifier = %identifier, "data file already registered");
                return false;
            }

            let watcher = options.file_system_watcher.then(|| {
                watch::spawn(
                    Arc::clone(&data_file),
                    Arc::clone(&self.shared.log),
                    self.shared.config.clone(),
                )
            });
            registrations.insert(
                identifier.clone(),
                Registration {
                    data_file: Arc::clone(&data_file),
                    timer: None,
                    watcher,
                },
            );
        }
        data_file.set_registered(true);

        if options.update_on_start {
            let service = self.clone();
            let target = Arc::clone(&data_file);
            tokio::spawn(async move {
                service.update(&target).await;
            });
        } else if options.auto_update {
            self.schedule_next(&data_file);
        }

        info!(
            identifier = %identifier,
            url = %options.update_url,
            update_on_start = options.update_on_start,
            auto_update = options.auto_update,
            watch = options.file_system_watcher,
            "data file registered"
        );
        true
    }

    /// Stop managing the data file registered under `identifier`.
    ///
    /// Its pending timer and watcher are cancelled. A cycle already running
    /// finishes but arms nothing. Returns the data file, if it was registered.
    pub fn deregister(&self, identifier: &str) -> Option<Arc<DataFile>> {
        let registration = self.shared.registrations().remove(identifier)?;
        let data_file = Arc::clone(&registration.data_file);
        registration.stop();

        info!(identifier, "data file deregistered");
        Some(data_file)
    }

    /// Deregister every data file.
    pub fn shutdown(&self) {
        let registrations = std::mem::take(&mut *self.shared.registrations());
        debug!(count = registrations.len(), "stopping update service");
        for (_, registration) in registrations {
            registration.stop();
        }
    }

    /// Run a cycle for the data file registered under `identifier` now,
    /// through the same in-flight gate as scheduled cycles.
    pub async fn update_now(&self, identifier: &str) -> Option<UpdateOutcome> {
        let data_file = self.data_file(identifier)?;
        Some(self.update(&data_file).await)
    }

    pub fn data_file(&self, identifier: &str) -> Option<Arc<DataFile>> {
        self.shared
            .registrations()
            .get(identifier)
            .map(|registration| Arc::clone(&registration.data_file))
    }

    pub fn is_registered(&self, identifier: &str) -> bool {
        self.shared.registrations().contains_key(identifier)
    }

    /// Whether a future cycle is armed for `identifier`.
    pub fn is_scheduled(&self, identifier: &str) -> bool {
        self.shared
            .registrations()
            .get(identifier)
            .and_then(|registration| registration.timer.as_ref())
            .is_some_and(Timer::is_pending)
    }

    pub fn registered(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = self.shared.registrations().keys().cloned().collect();
        identifiers.sort();
        identifiers
    }

    pub(crate) fn report(&self, error: &UpdateError) {
        self.shared.log.log(Level::ERROR, &error.to_string());
    }
}

#[cfg(feature = "reqwest")]
impl UpdateService<datakeep_fetch::ReqwestClient> {
    /// A service over the production HTTP client, using the configured
    /// request timeout.
    pub fn from_config(
        config: ServiceConfig,
        log: Arc<dyn UpdateLog>,
    ) -> datakeep_fetch::Result<Self> {
        let client = datakeep_fetch::ReqwestClient::with_timeout(config.request_timeout)?;
        Ok(Self::with_config(client, config, log))
    }
}

/// Ask the engine to reload, on the blocking pool. Failures are logged.
pub(crate) async fn refresh_engine(data_file: &Arc<DataFile>, log: &dyn UpdateLog) -> bool {
    let target = Arc::clone(data_file);
    let result = tokio::task::spawn_blocking(move || target.refresh())
        .await
        .unwrap_or_else(|e| Err(e.into()));

    match result {
        Ok(()) => {
            debug!(identifier = data_file.identifier(), "engine refreshed");
            true
        }
        Err(source) => {
            let error = UpdateError::Engine {
                engine: data_file.data_key().to_string(),
                path: data_file.path().to_path_buf(),
                source,
            };
            log.log(Level::ERROR, &error.to_string());
            false
        }
    }
}

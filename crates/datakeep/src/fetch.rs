use std::sync::Arc;

use datakeep_fetch::{
    CONTENT_MD5, FetchError, HttpClient, StatusClass, download_to_file, if_modified_since,
};
use datakeep_fs::stamped_path;
use datakeep_verify::VerificationError;
use tracing::{Level, debug, info};

use crate::data_file::DataFile;
use crate::error::UpdateError;
use crate::install::{ScratchFiles, install};
use crate::service::{UpdateService, refresh_engine};
use crate::verify::check_md5;

/// How one refresh cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Another cycle already owned the data file; nothing was done.
    Skipped,
    /// A new payload was placed at the data file's path.
    Installed { bytes: u64 },
    /// 304: the installed payload is current.
    NotModified,
    /// 429.
    RateLimited,
    /// 403.
    Forbidden,
    /// Any other non-2xx status.
    HttpStatus(u16),
    /// The request or the body transfer failed.
    NetworkFailure,
    /// The payload did not match its `Content-MD5`.
    IntegrityFailure,
    /// Writing, decompressing or placing the payload failed.
    FileSystemFailure,
}

impl UpdateOutcome {
    pub fn is_installed(&self) -> bool { matches!(self, UpdateOutcome::Installed { .. }) }
}

impl<C: HttpClient + 'static> UpdateService<C> {
    /// Run one refresh cycle for `data_file`.
    ///
    /// Returns [`UpdateOutcome::Skipped`] without any I/O when a cycle is
    /// already in flight for it. Otherwise the cycle fetches, verifies and
    /// installs as configured, arms the next cycle, clears the `updating`
    /// flag and removes its temporary files. Failures are reported through
    /// the service's [`UpdateLog`](crate::UpdateLog), never returned.
    pub async fn update(&self, data_file: &Arc<DataFile>) -> UpdateOutcome {
        let Some(guard) = data_file.try_begin_update() else {
            debug!(
                identifier = data_file.identifier(),
                "update already in progress"
            );
            return UpdateOutcome::Skipped;
        };

        let mut scratch = ScratchFiles::default();
        let outcome = self.run_cycle(data_file, &mut scratch).await;

        self.schedule_next(data_file);
        guard.release();

        for error in scratch.remove_all().await {
            self.report(&UpdateError::FileSystem {
                url:    data_file.update_url().to_string(),
                engine: data_file.data_key().to_string(),
                source: Box::new(error),
            });
        }

        debug!(identifier = data_file.identifier(), ?outcome, "update cycle finished");
        outcome
    }

    async fn run_cycle(&self, data_file: &Arc<DataFile>, scratch: &mut ScratchFiles) -> UpdateOutcome {
        let options = data_file.options();
        let url = options.update_url.as_str();
        let engine = data_file.data_key();

        let headers = conditional_headers(data_file);
        debug!(url, engine, conditional = !headers.is_empty(), "requesting data file");

        let response = match self.shared.client.get(url, &headers).await {
            Ok(response) => response,
            Err(e) => {
                self.report(&UpdateError::Network {
                    url:    url.to_string(),
                    engine: engine.to_string(),
                    reason: e.to_string(),
                });
                return UpdateOutcome::NetworkFailure;
            }
        };

        match StatusClass::of(response.status) {
            StatusClass::Success => {}
            StatusClass::NotModified => {
                self.shared.log.log(
                    Level::WARN,
                    &format!("No data update available from '{url}' for engine '{engine}'"),
                );
                return UpdateOutcome::NotModified;
            }
            class => {
                self.report(&UpdateError::HttpStatus {
                    url:    url.to_string(),
                    engine: engine.to_string(),
                    status: response.status,
                });
                return match class {
                    StatusClass::TooManyRequests => UpdateOutcome::RateLimited,
                    StatusClass::Forbidden => UpdateOutcome::Forbidden,
                    _ => UpdateOutcome::HttpStatus(response.status),
                };
            }
        }

        let file_system_error = |source: Box<dyn std::error::Error + Send + Sync>| {
            UpdateError::FileSystem {
                url: url.to_string(),
                engine: engine.to_string(),
                source,
            }
        };

        let expected_md5 = response.header(CONTENT_MD5).map(str::to_string);

        if let Err(e) = tokio::fs::create_dir_all(&options.temp_data_directory).await {
            self.report(&file_system_error(Box::new(e)));
            return UpdateOutcome::FileSystemFailure;
        }

        let download = stamped_path(&options.temp_data_directory, &options.identifier);
        scratch.track(download.clone());

        let bytes = match download_to_file(response.body, &download).await {
            Ok(bytes) => bytes,
            Err(FetchError::Network(reason)) => {
                self.report(&UpdateError::Network {
                    url: url.to_string(),
                    engine: engine.to_string(),
                    reason,
                });
                return UpdateOutcome::NetworkFailure;
            }
            Err(e) => {
                self.report(&file_system_error(Box::new(e)));
                return UpdateOutcome::FileSystemFailure;
            }
        };
        debug!(url, engine, bytes, path = %download.display(), "payload downloaded");

        if options.verify_md5 {
            match expected_md5 {
                Some(header) => match check_md5(download.clone(), header).await {
                    Ok(()) => debug!(url, engine, "content hash verified"),
                    Err(VerificationError::Io(e)) => {
                        self.report(&file_system_error(Box::new(e)));
                        return UpdateOutcome::FileSystemFailure;
                    }
                    Err(source) => {
                        self.report(&UpdateError::Integrity {
                            url: url.to_string(),
                            engine: engine.to_string(),
                            source,
                        });
                        return UpdateOutcome::IntegrityFailure;
                    }
                },
                None => debug!(url, engine, "no Content-MD5 header, skipping verification"),
            }
        }

        let installed = match install(options, &download, scratch).await {
            Ok(installed) => installed,
            Err(e) => {
                self.report(&file_system_error(Box::new(e)));
                return UpdateOutcome::FileSystemFailure;
            }
        };
        data_file.record_install(installed.stamp);
        info!(
            url,
            engine,
            bytes = installed.bytes,
            path = %options.path.display(),
            "data file installed"
        );

        refresh_engine(data_file, &*self.shared.log).await;
        UpdateOutcome::Installed {
            bytes: installed.bytes,
        }
    }
}

/// `If-Modified-Since` from the engine's publish date, when enabled and
/// available. A failing engine hint yields an unconditional request.
fn conditional_headers(data_file: &DataFile) -> Vec<(String, String)> {
    if !data_file.options().verify_if_modified_since {
        return Vec::new();
    }

    match data_file.engine().date_published() {
        Ok(published) => published.and_then(if_modified_since).into_iter().collect(),
        Err(e) => {
            debug!(
                identifier = data_file.identifier(),
                error = %e,
                "publish date unavailable, requesting unconditionally"
            );
            Vec::new()
        }
    }
}

//! Keeps engine data files current without interrupting their readers.
//!
//! A [`DataFile`] pairs a local path with the URL its payload is published
//! at and the [`DataFileEngine`] that reads it. Registered with an
//! [`UpdateService`], it is refreshed on a jittered polling cadence: each
//! cycle issues a conditional GET, streams the body to a scratch file,
//! checks `Content-MD5`, optionally gunzips, and atomically replaces the
//! installed file before asking the engine to reload. An optional watcher
//! reloads the engine when the file is changed by someone else.
//!
//! # Key Features
//!
//! - **One Cycle at a Time**: a per-file `updating` flag gates scheduled,
//!   manual and watcher-triggered work
//! - **Atomic Install**: readers see the old payload or the new one, never
//!   a partial file
//! - **Absorbed Failures**: network, status, integrity and file system
//!   failures are reported through an [`UpdateLog`] and retried on the next
//!   cycle
//! - **Independent Services**: timers and watchers belong to the service
//!   that armed them
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use datakeep::{
//!     DataFile, DataFileEngine, DataFileOptions, EngineError, ReqwestClient, UpdateService,
//! };
//!
//! struct DeviceEngine;
//!
//! impl DataFileEngine for DeviceEngine {
//!     fn data_key(&self) -> &str { "device" }
//!
//!     fn refresh(&self) -> Result<(), EngineError> { Ok(()) }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let options = DataFileOptions::new(
//!     "device-data",
//!     "https://example.com/device-data.gz",
//!     "/var/lib/engine/device.dat",
//! )
//! .decompress(true)
//! .file_system_watcher(true);
//!
//! let service = UpdateService::new(ReqwestClient::new()?);
//! service.register(Arc::new(DataFile::new(options, Arc::new(DeviceEngine))?));
//!
//! // Timers and watchers stop when the service is dropped, so it must
//! // live as long as the engine does.
//! std::future::pending::<()>().await;
//! # drop(service);
//! # Ok(())
//! # }
//! ```

mod config;
mod data_file;
mod error;
mod fetch;
mod install;
mod log;
mod scheduler;
mod service;
mod verify;
mod watch;

pub use config::{ConfigError, DataFileOptions, ServiceConfig};
pub use data_file::{DataFile, DataFileEngine};
pub use error::{EngineError, UpdateError};
pub use fetch::UpdateOutcome;
pub use log::{LogEntry, MemoryLog, TracingLog, UpdateLog};
pub use scheduler::SchedulingError;
pub use service::UpdateService;

pub use datakeep_fetch::{BoxStream, HttpClient, Response};
#[cfg(feature = "reqwest")]
pub use datakeep_fetch::ReqwestClient;
pub use tracing::Level;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime};

use datakeep_fetch::HttpClient;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::data_file::DataFile;
use crate::error::{EngineError, UpdateError};
use crate::service::UpdateService;

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("engine could not report its next update: {0}")]
    Hint(#[source] EngineError),

    #[error("a delay of {minutes} minutes cannot be represented")]
    OutOfRange { minutes: u64 },
}

// Stand-in deadline for delays the clock cannot represent.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// The pending cycle of one registered data file.
#[derive(Debug)]
pub(crate) struct Timer {
    generation: u64,
    handle:     JoinHandle<()>,
}

impl Timer {
    pub(crate) fn cancel(self) { self.handle.abort(); }

    pub(crate) fn is_pending(&self) -> bool { !self.handle.is_finished() }
}

/// Uniform jitter in whole minutes over `1..=maximum`; a zero maximum still
/// yields one minute.
pub(crate) fn jitter_minutes(maximum: u64, rng: &mut fastrand::Rng) -> u64 {
    rng.u64(1..=maximum.max(1))
}

/// Polling interval plus jitter.
pub(crate) fn polling_delay(
    interval: u64,
    maximum_randomisation: u64,
    rng: &mut fastrand::Rng,
) -> Result<Duration, SchedulingError> {
    let minutes = interval
        .checked_add(jitter_minutes(maximum_randomisation, rng))
        .ok_or(SchedulingError::OutOfRange { minutes: interval })?;
    let secs = minutes
        .checked_mul(60)
        .ok_or(SchedulingError::OutOfRange { minutes })?;
    Ok(Duration::from_secs(secs))
}

/// Time left until the publisher's announced next release, zero when the
/// hint is absent or already past.
pub(crate) fn publish_offset(next_update: Option<SystemTime>, now: SystemTime) -> Duration {
    next_update
        .and_then(|at| at.duration_since(now).ok())
        .unwrap_or_default()
}

pub(crate) fn next_delay(
    data_file: &DataFile,
    now: SystemTime,
    rng: &mut fastrand::Rng,
) -> Result<Duration, SchedulingError> {
    let hint = data_file
        .engine()
        .next_update()
        .map_err(SchedulingError::Hint)?;
    let options = data_file.options();
    let delay = polling_delay(
        options.polling_interval,
        options.update_time_maximum_randomisation,
        rng,
    )?;
    Ok(publish_offset(hint, now).saturating_add(delay))
}

impl<C: HttpClient + 'static> UpdateService<C> {
    /// Arm the next cycle for `data_file`, replacing any pending one.
    ///
    /// Nothing is armed when `auto_update` is off or the data file is no
    /// longer registered with this service.
    pub(crate) fn schedule_next(&self, data_file: &Arc<DataFile>) {
        if !data_file.options().auto_update {
            debug!(identifier = data_file.identifier(), "auto update disabled");
            return;
        }

        match next_delay(data_file, SystemTime::now(), &mut fastrand::Rng::new()) {
            Ok(delay) => {
                self.arm(data_file, delay);
            }
            Err(source) => self.report(&UpdateError::Scheduling {
                url: data_file.update_url().to_string(),
                engine: data_file.data_key().to_string(),
                source,
            }),
        }
    }

    fn arm(&self, data_file: &Arc<DataFile>, delay: Duration) -> bool {
        let identifier = data_file.identifier();
        let mut registrations = self.shared.registrations();
        let Some(registration) = registrations
            .get_mut(identifier)
            .filter(|registration| Arc::ptr_eq(&registration.data_file, data_file))
        else {
            debug!(identifier, "data file not registered, nothing scheduled");
            return false;
        };

        if let Some(previous) = registration.timer.take() {
            previous.cancel();
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::downgrade(&self.shared);
        let target = Arc::clone(data_file);
        let now = tokio::time::Instant::now();
        let deadline = now
            .checked_add(delay)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let service = UpdateService { shared };
            service.release_timer(&target, generation);
            service.update(&target).await;
        });

        registration.timer = Some(Timer { generation, handle });
        info!(identifier, delay_secs = delay.as_secs(), "next update scheduled");
        true
    }

    /// Forget the timer that is now firing so the cycle it starts can arm
    /// the next one without aborting itself.
    fn release_timer(&self, data_file: &DataFile, generation: u64) {
        let mut registrations = self.shared.registrations();
        if let Some(registration) = registrations.get_mut(data_file.identifier()) {
            if registration
                .timer
                .as_ref()
                .is_some_and(|timer| timer.generation == generation)
            {
                registration.timer = None;
            }
        }
    }
}

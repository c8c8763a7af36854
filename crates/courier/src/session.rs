//! Background polling that keeps the server-side session alive, or warns
//! the user before it expires.
//!
//! Two modes exist, fixed when the loop starts:
//! - **touch**: every `frequency`, extend the session. The first failure is
//!   reported to the [`Notifier`] and ends the loop.
//! - **check**: every `check_frequency`, ask how long the session has left.
//!   Below `warning_limit` the user is asked once whether to extend it, and
//!   the next check waits `warning_limit` instead.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use courier_common::error::RemoteError;
use courier_common::{RemoteCall, SESSION_TIME_REMAINING_METHOD, SESSION_TOUCH_METHOD, SiteConfig};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::managers::{Dispatcher, Transport};
use crate::runtime::{JoinHandle, Runtime, run_async};
use crate::strings::{StringRequest, StringResolver};

/// Lower bound of the warning threshold.
pub const MIN_WARNING_LIMIT: Duration = Duration::from_secs(15 * 60);

/// Polling intervals for check mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveSettings {
    /// Interval between two checks while the session is not about to expire.
    pub check_frequency: Duration,
    /// Remaining lifetime below which the user is warned. Also the interval
    /// to the next check after a warning.
    pub warning_limit: Duration,
}

impl KeepaliveSettings {
    /// Checks ten times per session lifetime and warns below twice the check
    /// interval, but never below [`MIN_WARNING_LIMIT`].
    pub fn from_session_timeout(session_timeout: Duration) -> Self {
        let check_frequency = session_timeout / 10;
        Self {
            check_frequency,
            warning_limit: (check_frequency * 2).max(MIN_WARNING_LIMIT),
        }
    }

    /// Settings for the session lifetime configured on the site.
    pub fn from_site_config(config: &SiteConfig) -> Self {
        Self::from_session_timeout(Duration::from_secs(config.sessiontimeout))
    }
}

/// Where the keepalive loop reports to the user.
pub trait Notifier: Send + Sync + 'static {
    /// Reports a failed call.
    fn exception(&self, error: &RemoteError);

    /// Asks a yes/no question. Returns `true` when the user accepted.
    fn confirm(&self, title: &str, question: &str, yes_label: &str, no_label: &str) -> bool;
}

/// [`Notifier`] that only writes to the log and never confirms.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn exception(&self, error: &RemoteError) {
        error!("Session keepalive failed: {}", error);
    }

    fn confirm(&self, title: &str, question: &str, _yes_label: &str, _no_label: &str) -> bool {
        warn!("{}: {}", title, question);
        false
    }
}

/// Which kind of polling a keepalive loop does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveMode {
    /// Extend the session every `frequency`.
    Touch {
        /// Interval between two touches.
        frequency: Duration,
    },
    /// Watch the remaining session lifetime.
    Check,
}

/// Observable state of a [`SessionKeepalive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveStatus {
    /// No loop has been started, or it was stopped.
    Stopped,
    /// A loop was started in the given mode. A loop that ended after a
    /// failure still counts as running until [`SessionKeepalive::stop`].
    Running(KeepaliveMode),
}

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new loop was spawned.
    Started(KeepaliveMode),
    /// A loop was already running; nothing changed.
    AlreadyRunning(KeepaliveMode),
}

enum KeepaliveState<H> {
    Stopped,
    Running { mode: KeepaliveMode, task: H },
}

/// One poll of the session endpoints, without any scheduling.
pub struct SessionMonitor<T: Transport, RT: Runtime = tokio::runtime::Handle> {
    dispatcher: Dispatcher<T, RT>,
    strings: Arc<dyn StringResolver>,
    notifier: Arc<dyn Notifier>,
    settings: KeepaliveSettings,
}

impl<T: Transport, RT: Runtime> SessionMonitor<T, RT> {
    /// Creates a monitor.
    pub fn new(
        dispatcher: Dispatcher<T, RT>,
        strings: Arc<dyn StringResolver>,
        notifier: Arc<dyn Notifier>,
        settings: KeepaliveSettings,
    ) -> Self {
        Self {
            dispatcher,
            strings,
            notifier,
            settings,
        }
    }

    /// The intervals this monitor polls with.
    pub fn settings(&self) -> KeepaliveSettings {
        self.settings
    }

    /// Extends the session once.
    pub async fn touch_once(&self) -> Result<(), RemoteError> {
        self.dispatcher
            .call_one(RemoteCall::new(SESSION_TOUCH_METHOD))
            .wait()
            .await
            .map(|_| ())
    }

    /// Asks the server how long the session has left.
    pub async fn time_remaining(&self) -> Result<Duration, RemoteError> {
        let payload = self
            .dispatcher
            .call_one(RemoteCall::new(SESSION_TIME_REMAINING_METHOD))
            .wait()
            .await?;
        remaining_seconds(&payload).map(|seconds| Duration::from_secs(seconds.max(0) as u64))
    }

    /// Checks the remaining lifetime once and returns the delay until the
    /// next check.
    ///
    /// When the session is about to expire the user is asked once whether to
    /// extend it; a failed string lookup is reported but does not end the
    /// loop.
    pub async fn check_once(&self) -> Result<Duration, RemoteError> {
        let remaining = self.time_remaining().await?;
        if remaining >= self.settings.warning_limit {
            debug!("Session has {:?} left", remaining);
            return Ok(self.settings.check_frequency);
        }

        warn!("Session expires in {:?}", remaining);
        let prompt = [
            StringRequest::new("inactive", "moodle"),
            StringRequest::new("sessiontimeoutsoon", "error"),
        ];
        match self.strings.get_strings(&prompt).await {
            Ok(strings) if strings.len() == 2 => {
                if self
                    .notifier
                    .confirm(&strings[0], &strings[1], "Extend session", "Cancel")
                {
                    if let Err(err) = self.touch_once().await {
                        self.notifier.exception(&err);
                    }
                }
            }
            Ok(strings) => self.notifier.exception(&RemoteError::Serialization(format!(
                "expected 2 prompt strings, got {}",
                strings.len()
            ))),
            Err(err) => self.notifier.exception(&err),
        }

        Ok(self.settings.warning_limit)
    }

    async fn run(self: Arc<Self>, mode: KeepaliveMode) {
        match mode {
            KeepaliveMode::Touch { frequency } => loop {
                tokio::time::sleep(frequency).await;
                if let Err(err) = self.touch_once().await {
                    self.notifier.exception(&err);
                    break;
                }
            },
            KeepaliveMode::Check => {
                let mut delay = self.settings.check_frequency;
                loop {
                    tokio::time::sleep(delay).await;
                    match self.check_once().await {
                        Ok(next) => delay = next,
                        Err(err) => {
                            self.notifier.exception(&err);
                            break;
                        }
                    }
                }
            }
        }
        debug!("Keepalive loop ended");
    }
}

/// Accepts a bare number of seconds or a `{timeremaining: ...}` record.
fn remaining_seconds(payload: &Value) -> Result<i64, RemoteError> {
    let seconds = match payload {
        Value::Object(record) => record.get("timeremaining"),
        other => Some(other),
    };
    seconds
        .and_then(|value| value.as_i64().or_else(|| value.as_f64().map(|f| f as i64)))
        .ok_or_else(|| {
            RemoteError::Serialization(format!("unexpected time remaining payload: {}", payload))
        })
}

/// The keepalive loop of one page.
///
/// A state machine with two states, stopped and running. Starting while
/// running is rejected with [`StartOutcome::AlreadyRunning`] and leaves the
/// running loop untouched.
pub struct SessionKeepalive<T: Transport, RT: Runtime = tokio::runtime::Handle> {
    monitor: Arc<SessionMonitor<T, RT>>,
    runtime: RT,
    state: Mutex<KeepaliveState<RT::JoinHandle>>,
}

impl<T: Transport, RT: Runtime> SessionKeepalive<T, RT> {
    /// Creates a stopped keepalive around `monitor`.
    pub fn new(monitor: SessionMonitor<T, RT>) -> Self {
        let runtime = monitor.dispatcher.runtime().clone();
        Self {
            monitor: Arc::new(monitor),
            runtime,
            state: Mutex::new(KeepaliveState::Stopped),
        }
    }

    /// Starts watching the remaining session lifetime.
    pub fn init(&self) -> StartOutcome {
        self.start(KeepaliveMode::Check)
    }

    /// Starts touching the session every `frequency`. A zero frequency
    /// falls back to watching the remaining lifetime.
    pub fn keepalive(&self, frequency: Duration) -> StartOutcome {
        if frequency.is_zero() {
            self.start(KeepaliveMode::Check)
        } else {
            self.start(KeepaliveMode::Touch { frequency })
        }
    }

    /// Starts the loop in `mode` unless one is already running.
    pub fn start(&self, mode: KeepaliveMode) -> StartOutcome {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let KeepaliveState::Running { mode: running, .. } = &*state {
            debug!("Keepalive already running in {:?} mode", running);
            return StartOutcome::AlreadyRunning(*running);
        }

        debug!("Starting keepalive in {:?} mode", mode);
        let task = run_async(Arc::clone(&self.monitor).run(mode), &self.runtime);
        *state = KeepaliveState::Running { mode, task };
        StartOutcome::Started(mode)
    }

    /// Stops the loop. Returns `false` when it was not running.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *state, KeepaliveState::Stopped) {
            KeepaliveState::Running { mut task, .. } => {
                task.abort();
                debug!("Keepalive stopped");
                true
            }
            KeepaliveState::Stopped => false,
        }
    }

    /// Current state.
    pub fn status(&self) -> KeepaliveStatus {
        match &*self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            KeepaliveState::Stopped => KeepaliveStatus::Stopped,
            KeepaliveState::Running { mode, .. } => KeepaliveStatus::Running(*mode),
        }
    }

    /// The poll logic driven by the loop.
    pub fn monitor(&self) -> &SessionMonitor<T, RT> {
        &self.monitor
    }
}

impl<T: Transport, RT: Runtime> Drop for SessionKeepalive<T, RT> {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Rate-limited reporting for events that can fire thousands of times a
//! second, such as audio buffer overflows.
//!
//! Events are counted inside a collection window. When the window closes,
//! one report carrying the coalesced count is handed to the sink and the
//! next window is twice as long, up to a cap. Quiet time between windows
//! shrinks the interval back towards its base length.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use parking_lot::Mutex;

use crate::config::OverflowLogConfig;

/// Receives one report per closed collection window.
pub type LogSink = Arc<dyn Fn(&StaggeredReport<'_>) + Send + Sync>;

/// A sink that forwards reports to `tracing` at warn level.
pub fn tracing_sink() -> LogSink {
    Arc::new(|report: &StaggeredReport<'_>| tracing::warn!("{report}"))
}

#[derive(Debug, Clone)]
pub struct StaggeredReport<'a> {
    pub timestamp: DateTime<Local>,
    pub label: &'a str,
    /// Events coalesced since the previous report.
    pub count: u64,
    /// Length of the window the events were collected in.
    pub window: Duration,
}

impl fmt::Display for StaggeredReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({} times in {} milliseconds)",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.label,
            self.count,
            self.window.as_millis()
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StaggerPolicy {
    pub base_interval: Duration,
    /// Number of interval sizes available; the largest is
    /// `base_interval * 2^(max_factor - 1)`.
    pub max_factor: u32,
    pub cooldown: Duration,
}

impl Default for StaggerPolicy {
    fn default() -> Self {
        Self::from(&OverflowLogConfig::default())
    }
}

impl From<&OverflowLogConfig> for StaggerPolicy {
    fn from(config: &OverflowLogConfig) -> Self {
        Self {
            base_interval: config.base_interval(),
            max_factor: config.max_interval_factor.max(1),
            cooldown: config.cooldown(),
        }
    }
}

struct Window {
    collecting: bool,
    count: u64,
    started: Instant,
    last_closed: Option<Instant>,
    interval: Duration,
    factor: u32,
}

impl Window {
    fn new(policy: &StaggerPolicy) -> Self {
        Self {
            collecting: false,
            count: 0,
            started: Instant::now(),
            last_closed: None,
            interval: policy.base_interval,
            factor: 1,
        }
    }

    fn open(&mut self, now: Instant, policy: &StaggerPolicy) {
        if let Some(closed) = self.last_closed {
            let mut quiet = now.saturating_duration_since(closed);
            if policy.cooldown.is_zero() {
                self.interval = policy.base_interval;
                self.factor = 1;
            }
            while quiet > policy.cooldown && self.factor > 1 {
                quiet -= policy.cooldown;
                self.factor -= 1;
                self.interval /= 2;
            }
        }
        self.collecting = true;
        self.count = 0;
        self.started = now;
    }

    /// Closes the window if its deadline has passed, returning the
    /// coalesced count and window length.
    fn close_if_expired(
        &mut self,
        now: Instant,
        policy: &StaggerPolicy,
    ) -> Option<(u64, Duration)> {
        if !self.collecting {
            return None;
        }
        let deadline = self.started + self.interval;
        if now < deadline {
            return None;
        }
        let closed = (self.count, self.interval);
        self.collecting = false;
        self.last_closed = Some(deadline);
        if self.factor < policy.max_factor {
            self.factor += 1;
            self.interval *= 2;
        }
        Some(closed)
    }
}

/// Coalesces repeated occurrences of one labeled event into periodic
/// reports. Callable from any thread; the sink runs on whichever thread
/// closes the window, outside the logger's lock.
pub struct StaggeredLogger {
    label: String,
    policy: StaggerPolicy,
    sink: LogSink,
    window: Mutex<Window>,
}

impl StaggeredLogger {
    pub fn new(label: impl Into<String>, sink: LogSink) -> Self {
        Self::with_policy(label, sink, StaggerPolicy::default())
    }

    pub fn with_policy(label: impl Into<String>, sink: LogSink, policy: StaggerPolicy) -> Self {
        Self {
            label: label.into(),
            window: Mutex::new(Window::new(&policy)),
            policy,
            sink,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current window length.
    pub fn interval(&self) -> Duration {
        self.window.lock().interval
    }

    /// Records one occurrence of the event.
    pub fn log(&self) {
        self.log_at(Instant::now());
    }

    /// Emits the pending count if the current window has run its course.
    pub fn poll(&self) {
        self.poll_at(Instant::now());
    }

    /// Emits any pending count immediately, regardless of the window.
    pub fn flush(&self) {
        let now = Instant::now();
        let closed = {
            let mut window = self.window.lock();
            if window.collecting && window.count > 0 {
                window.collecting = false;
                window.last_closed = Some(now);
                Some((window.count, now.saturating_duration_since(window.started)))
            } else {
                None
            }
        };
        self.emit(closed);
    }

    pub(crate) fn log_at(&self, now: Instant) {
        let closed = {
            let mut window = self.window.lock();
            let closed = window.close_if_expired(now, &self.policy);
            if !window.collecting {
                window.open(now, &self.policy);
            }
            window.count += 1;
            closed
        };
        self.emit(closed);
    }

    pub(crate) fn poll_at(&self, now: Instant) {
        let closed = self.window.lock().close_if_expired(now, &self.policy);
        self.emit(closed);
    }

    fn emit(&self, closed: Option<(u64, Duration)>) {
        let Some((count, window)) = closed else {
            return;
        };
        let report = StaggeredReport {
            timestamp: Local::now(),
            label: &self.label,
            count,
            window,
        };
        (self.sink)(&report);
    }
}

impl Drop for StaggeredLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

impl fmt::Debug for StaggeredLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaggeredLogger")
            .field("label", &self.label)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

//! Bounded fragment queue between the sound synthesis loop (producer) and
//! the host audio callback (consumer).
//!
//! Nothing is copied: each call hands one fragment handle in and takes one
//! back out. The pool holds `capacity + 2` fragments so the producer and
//! the consumer can each keep a working buffer outside the ring.

use parking_lot::Mutex;

use crate::config::{AudioConfig, OverflowLogConfig};
use crate::error::QueueError;

use super::pool::{Fragment, FragmentPool};
use super::staggered_logger::{LogSink, StaggerPolicy, StaggeredLogger};

pub const OVERFLOW_LABEL: &str = "audio buffer overflow";

/// Outcome of [`AudioQueue::dequeue`].
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeued {
    /// The oldest filled fragment; the caller now owns it.
    Filled(Fragment),
    /// Nothing to play. The fragment passed in is handed straight back.
    Empty(Option<Fragment>),
}

/// Which pool indices sit where, taken under the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub size: usize,
    pub head: usize,
    pub ring: Vec<usize>,
    pub producer_spare: Option<usize>,
    pub consumer_spare: Option<usize>,
}

struct QueueState {
    ring: Vec<Fragment>,
    size: usize,
    head: usize,
    producer_spare: Option<Fragment>,
    consumer_spare: Option<Fragment>,
    ignore_overflows: bool,
}

pub struct AudioQueue {
    fragment_size: usize,
    capacity: usize,
    stereo: bool,
    pool: FragmentPool,
    state: Mutex<QueueState>,
    overflow_logger: StaggeredLogger,
}

impl AudioQueue {
    pub fn new(
        fragment_size: usize,
        capacity: usize,
        stereo: bool,
        sink: LogSink,
    ) -> Result<Self, QueueError> {
        Self::with_overflow_policy(fragment_size, capacity, stereo, sink, StaggerPolicy::default())
    }

    pub fn from_config(
        audio: &AudioConfig,
        overflow_log: &OverflowLogConfig,
        sink: LogSink,
    ) -> Result<Self, QueueError> {
        Self::with_overflow_policy(
            audio.fragment_size,
            audio.capacity,
            audio.stereo,
            sink,
            StaggerPolicy::from(overflow_log),
        )
    }

    pub fn with_overflow_policy(
        fragment_size: usize,
        capacity: usize,
        stereo: bool,
        sink: LogSink,
        policy: StaggerPolicy,
    ) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidConfig("capacity must be at least 1".into()));
        }
        if fragment_size == 0 {
            return Err(QueueError::InvalidConfig("fragment_size must be at least 1".into()));
        }

        let channels = if stereo { 2 } else { 1 };
        let (pool, mut handles) = FragmentPool::new(fragment_size * channels, capacity + 2);
        let consumer_spare = handles.pop();
        let producer_spare = handles.pop();

        tracing::debug!(
            fragment_size,
            capacity,
            channels,
            "audio queue allocated {} fragments",
            pool.len()
        );

        Ok(Self {
            fragment_size,
            capacity,
            stereo,
            pool,
            state: Mutex::new(QueueState {
                ring: handles,
                size: 0,
                head: 0,
                producer_spare,
                consumer_spare,
                ignore_overflows: true,
            }),
            overflow_logger: StaggeredLogger::with_policy(OVERFLOW_LABEL, sink, policy),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of filled fragments waiting in the ring.
    ///
    /// The value is stale as soon as the lock is released; treat it as a
    /// hint (e.g. for priming), never as a guarantee about the next call.
    pub fn size(&self) -> usize {
        self.state.lock().size
    }

    /// Samples per channel in one fragment.
    pub fn fragment_size(&self) -> usize {
        self.fragment_size
    }

    pub fn is_stereo(&self) -> bool {
        self.stereo
    }

    pub fn channels(&self) -> usize {
        if self.stereo { 2 } else { 1 }
    }

    /// Submits a filled fragment and returns the next one to fill.
    ///
    /// Pass `None` on the first call to receive the producer's working
    /// buffer. When the ring is full the oldest filled fragment is dropped
    /// to make room.
    pub fn enqueue(&self, fragment: Option<Fragment>) -> Result<Fragment, QueueError> {
        let fragment = self.check_owned(fragment)?;

        let (fragment, report_overflow) = {
            let mut state = self.state.lock();
            let Some(mut fragment) = fragment else {
                return state.producer_spare.take().ok_or(QueueError::ProducerExhausted);
            };

            let tail = (state.head + state.size) % self.capacity;
            std::mem::swap(&mut state.ring[tail], &mut fragment);

            let report_overflow = if state.size < self.capacity {
                state.size += 1;
                false
            } else {
                state.head = (state.head + 1) % self.capacity;
                !state.ignore_overflows
            };
            (fragment, report_overflow)
        };

        if report_overflow {
            self.overflow_logger.log();
        } else {
            self.overflow_logger.poll();
        }
        Ok(fragment)
    }

    /// Returns a played fragment and takes the oldest filled one.
    ///
    /// Pass `None` on the first call; the consumer's spare is used as the
    /// returned buffer. Underflow is not an error: the input comes back in
    /// [`Dequeued::Empty`] and the caller should play silence.
    pub fn dequeue(&self, fragment: Option<Fragment>) -> Result<Dequeued, QueueError> {
        let fragment = self.check_owned(fragment)?;

        let mut state = self.state.lock();
        if state.size == 0 {
            return Ok(Dequeued::Empty(fragment));
        }

        let mut fragment = match fragment {
            Some(fragment) => fragment,
            None => state.consumer_spare.take().ok_or(QueueError::ConsumerExhausted)?,
        };

        let head = state.head;
        std::mem::swap(&mut state.ring[head], &mut fragment);
        state.size -= 1;
        state.head = (head + 1) % self.capacity;

        Ok(Dequeued::Filled(fragment))
    }

    /// Hands the consumer's last working buffer back at shutdown.
    ///
    /// Calling again with `None` after a successful close is a no-op. A
    /// buffer offered while the spare slot is already filled is rejected
    /// and handed back inside the error.
    pub fn close_sink(&self, fragment: Option<Fragment>) -> Result<(), QueueError> {
        let fragment = self.check_owned(fragment)?;

        let mut state = self.state.lock();
        match fragment {
            Some(fragment) if state.consumer_spare.is_some() => {
                Err(QueueError::UnknownReturn(fragment))
            }
            Some(fragment) => {
                state.consumer_spare = Some(fragment);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Toggles overflow reporting. Overflowing always drops the oldest
    /// fragment; this only decides whether the overflow logger hears about
    /// it. Reporting starts disabled so priming stays quiet.
    pub fn ignore_overflows(&self, ignore: bool) {
        self.state.lock().ignore_overflows = ignore;
    }

    pub fn overflows_ignored(&self) -> bool {
        self.state.lock().ignore_overflows
    }

    /// Read access to a fragment's samples.
    ///
    /// Panics if `fragment` was handed out by a different queue.
    pub fn samples<'a>(&'a self, fragment: &'a Fragment) -> &'a [i16] {
        self.pool.samples(fragment)
    }

    /// Write access to a fragment's samples.
    ///
    /// Panics if `fragment` was handed out by a different queue.
    pub fn samples_mut<'a>(&'a self, fragment: &'a mut Fragment) -> &'a mut [i16] {
        self.pool.samples_mut(fragment)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock();
        QueueSnapshot {
            size: state.size,
            head: state.head,
            ring: state.ring.iter().map(Fragment::index).collect(),
            producer_spare: state.producer_spare.as_ref().map(Fragment::index),
            consumer_spare: state.consumer_spare.as_ref().map(Fragment::index),
        }
    }

    /// Emits any overflow count still held by the rate limiter.
    pub fn flush_overflow_log(&self) {
        self.overflow_logger.flush();
    }

    /// Passes `fragment` through, or hands it back in the error when it
    /// was minted by another queue's pool.
    fn check_owned(&self, fragment: Option<Fragment>) -> Result<Option<Fragment>, QueueError> {
        match fragment {
            Some(fragment) if !self.pool.owns(&fragment) => {
                Err(QueueError::ForeignFragment(fragment))
            }
            fragment => Ok(fragment),
        }
    }
}

impl std::fmt::Debug for AudioQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioQueue")
            .field("fragment_size", &self.fragment_size)
            .field("capacity", &self.capacity)
            .field("stereo", &self.stereo)
            .finish_non_exhaustive()
    }
}

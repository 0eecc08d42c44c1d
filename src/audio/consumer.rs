use std::sync::Arc;

use crate::error::QueueError;

use super::pool::Fragment;
use super::queue::{AudioQueue, Dequeued};

/// Consumer side of the queue, driven from the host audio callback.
///
/// Copies queued samples into whatever buffer size the device asks for,
/// keeping a read cursor inside the current fragment, and pads with silence
/// when the queue runs dry. The working fragment goes back to the queue via
/// `close_sink` when the reader is closed or dropped.
pub struct FragmentReader {
    queue: Arc<AudioQueue>,
    current: Option<Fragment>,
    /// i16 values of `current` already played.
    cursor: usize,
    fragment_len: usize,
    started: bool,
    closed: bool,
    underflows: u64,
}

impl FragmentReader {
    pub fn new(queue: Arc<AudioQueue>) -> Self {
        let fragment_len = queue.fragment_size() * queue.channels();
        Self {
            queue,
            current: None,
            cursor: fragment_len,
            fragment_len,
            started: false,
            closed: false,
            underflows: 0,
        }
    }

    pub fn queue(&self) -> &Arc<AudioQueue> {
        &self.queue
    }

    /// Callbacks that ran out of queued audio before filling their buffer.
    pub fn underflows(&self) -> u64 {
        self.underflows
    }

    /// Fills `out` with interleaved samples in the queue's channel layout.
    /// Returns how many values came from the queue; the rest are zero.
    ///
    /// The first call ends priming: overflow reporting is switched on,
    /// since from now on a full queue means the device is falling behind.
    pub fn fill(&mut self, out: &mut [i16]) -> Result<usize, QueueError> {
        if !self.started {
            self.started = true;
            self.queue.ignore_overflows(false);
            tracing::debug!("audio sink started pulling, overflow reporting enabled");
        }

        let mut written = 0;
        while written < out.len() {
            if self.cursor >= self.fragment_len {
                match self.queue.dequeue(self.current.take())? {
                    Dequeued::Filled(fragment) => {
                        self.current = Some(fragment);
                        self.cursor = 0;
                    }
                    Dequeued::Empty(returned) => {
                        self.current = returned;
                        self.underflows += 1;
                        break;
                    }
                }
            }
            let Some(fragment) = self.current.as_ref() else {
                break;
            };
            let samples = self.queue.samples(fragment);
            let n = (self.fragment_len - self.cursor).min(out.len() - written);
            out[written..written + n].copy_from_slice(&samples[self.cursor..self.cursor + n]);
            self.cursor += n;
            written += n;
        }

        out[written..].fill(0);
        Ok(written)
    }

    /// Hands the working fragment back to the queue.
    pub fn close(mut self) -> Result<(), QueueError> {
        self.close_sink()
    }

    fn close_sink(&mut self) -> Result<(), QueueError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.queue.close_sink(self.current.take())
    }
}

impl Drop for FragmentReader {
    fn drop(&mut self) {
        if let Err(e) = self.close_sink() {
            tracing::warn!("closing audio sink failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::producer::FragmentWriter;
    use crate::audio::staggered_logger::{LogSink, StaggeredReport};

    fn queue(fragment_size: usize, capacity: usize, stereo: bool) -> Arc<AudioQueue> {
        let sink: LogSink = Arc::new(|_: &StaggeredReport<'_>| {});
        Arc::new(AudioQueue::new(fragment_size, capacity, stereo, sink).unwrap())
    }

    #[test]
    fn test_underflow_plays_silence() {
        let queue = queue(4, 2, false);
        let mut reader = FragmentReader::new(Arc::clone(&queue));
        let mut out = [7i16; 6];
        assert_eq!(reader.fill(&mut out).unwrap(), 0);
        assert_eq!(out, [0; 6]);
        assert_eq!(reader.underflows(), 1);
    }

    #[test]
    fn test_first_fill_enables_overflow_reporting() {
        let queue = queue(4, 2, false);
        let mut reader = FragmentReader::new(Arc::clone(&queue));
        assert!(queue.overflows_ignored());
        reader.fill(&mut [0; 2]).unwrap();
        assert!(!queue.overflows_ignored());
    }

    #[test]
    fn test_fill_crosses_fragment_boundaries() {
        let queue = queue(3, 4, false);
        let mut writer = FragmentWriter::new(Arc::clone(&queue)).unwrap();
        let mut reader = FragmentReader::new(Arc::clone(&queue));
        writer.write(&[1, 2, 3, 4, 5, 6]).unwrap();

        let mut out = [0i16; 4];
        assert_eq!(reader.fill(&mut out).unwrap(), 4);
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(reader.fill(&mut out).unwrap(), 2);
        assert_eq!(out, [5, 6, 0, 0]);
        assert_eq!(reader.underflows(), 1);
    }

    #[test]
    fn test_resumes_after_underflow() {
        let queue = queue(2, 2, true);
        let mut writer = FragmentWriter::new(Arc::clone(&queue)).unwrap();
        let mut reader = FragmentReader::new(Arc::clone(&queue));
        let mut out = [0i16; 4];
        reader.fill(&mut out).unwrap();

        writer.push_frame(10, 11).unwrap();
        writer.push_frame(20, 21).unwrap();
        assert_eq!(reader.fill(&mut out).unwrap(), 4);
        assert_eq!(out, [10, 11, 20, 21]);
    }

    #[test]
    fn test_drop_returns_working_fragment() {
        let queue = queue(2, 2, false);
        let mut writer = FragmentWriter::new(Arc::clone(&queue)).unwrap();
        writer.write(&[1, 2]).unwrap();
        let mut reader = FragmentReader::new(Arc::clone(&queue));
        reader.fill(&mut [0; 2]).unwrap();
        assert_eq!(queue.snapshot().consumer_spare, None);
        drop(reader);
        assert!(queue.snapshot().consumer_spare.is_some());
    }

    #[test]
    fn test_close_without_playing_is_a_no_op() {
        let queue = queue(2, 2, false);
        let before = queue.snapshot();
        let reader = FragmentReader::new(Arc::clone(&queue));
        reader.close().unwrap();
        assert_eq!(queue.snapshot(), before);
    }
}

use std::sync::Arc;

use crate::error::QueueError;

use super::pool::Fragment;
use super::queue::AudioQueue;

/// Producer side of the queue: collects samples from the synthesis loop
/// into the fragment it holds and submits each fragment once it is full.
pub struct FragmentWriter {
    queue: Arc<AudioQueue>,
    current: Option<Fragment>,
    /// i16 values already written into `current`.
    position: usize,
    submitted: u64,
}

impl FragmentWriter {
    pub fn new(queue: Arc<AudioQueue>) -> Result<Self, QueueError> {
        let current = queue.enqueue(None)?;
        Ok(Self {
            queue,
            current: Some(current),
            position: 0,
            submitted: 0,
        })
    }

    pub fn queue(&self) -> &Arc<AudioQueue> {
        &self.queue
    }

    /// Frames written into the working fragment that have not been
    /// submitted yet.
    pub fn pending_frames(&self) -> usize {
        self.position / self.queue.channels()
    }

    /// Fragments handed to the queue so far.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Adds one frame. A mono queue receives the average of both channels.
    pub fn push_frame(&mut self, left: i16, right: i16) -> Result<(), QueueError> {
        let Some(fragment) = self.current.as_mut() else {
            return Err(QueueError::ProducerExhausted);
        };
        let samples = self.queue.samples_mut(fragment);
        if self.queue.is_stereo() {
            samples[self.position] = left;
            samples[self.position + 1] = right;
            self.position += 2;
        } else {
            samples[self.position] = ((i32::from(left) + i32::from(right)) / 2) as i16;
            self.position += 1;
        }

        if self.position == samples.len() {
            self.submit()?;
        }
        Ok(())
    }

    /// Copies already interleaved samples, submitting as many fragments as
    /// fill up along the way.
    pub fn write(&mut self, mut interleaved: &[i16]) -> Result<(), QueueError> {
        while !interleaved.is_empty() {
            let Some(fragment) = self.current.as_mut() else {
                return Err(QueueError::ProducerExhausted);
            };
            let samples = self.queue.samples_mut(fragment);
            let n = (samples.len() - self.position).min(interleaved.len());
            samples[self.position..self.position + n].copy_from_slice(&interleaved[..n]);
            self.position += n;
            interleaved = &interleaved[n..];

            if self.position == samples.len() {
                self.submit()?;
            }
        }
        Ok(())
    }

    fn submit(&mut self) -> Result<(), QueueError> {
        let filled = self.current.take();
        self.current = Some(self.queue.enqueue(filled)?);
        self.position = 0;
        self.submitted += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::Dequeued;
    use crate::audio::staggered_logger::{LogSink, StaggeredReport};

    fn queue(fragment_size: usize, capacity: usize, stereo: bool) -> Arc<AudioQueue> {
        let sink: LogSink = Arc::new(|_: &StaggeredReport<'_>| {});
        Arc::new(AudioQueue::new(fragment_size, capacity, stereo, sink).unwrap())
    }

    fn drain_one(queue: &AudioQueue) -> Vec<i16> {
        match queue.dequeue(None).unwrap() {
            Dequeued::Filled(fragment) => queue.samples(&fragment).to_vec(),
            Dequeued::Empty(_) => panic!("queue unexpectedly empty"),
        }
    }

    #[test]
    fn test_submits_when_fragment_fills() {
        let queue = queue(4, 2, true);
        let mut writer = FragmentWriter::new(Arc::clone(&queue)).unwrap();
        for i in 0..3 {
            writer.push_frame(i, -i).unwrap();
        }
        assert_eq!(queue.size(), 0);
        assert_eq!(writer.pending_frames(), 3);
        writer.push_frame(3, -3).unwrap();
        assert_eq!(queue.size(), 1);
        assert_eq!(writer.submitted(), 1);
        assert_eq!(writer.pending_frames(), 0);
        assert_eq!(drain_one(&queue), vec![0, 0, 1, -1, 2, -2, 3, -3]);
    }

    #[test]
    fn test_mono_queue_averages_channels() {
        let queue = queue(2, 1, false);
        let mut writer = FragmentWriter::new(Arc::clone(&queue)).unwrap();
        writer.push_frame(100, 300).unwrap();
        writer.push_frame(i16::MAX, i16::MAX).unwrap();
        assert_eq!(drain_one(&queue), vec![200, i16::MAX]);
    }

    #[test]
    fn test_write_spans_fragment_boundaries() {
        let queue = queue(3, 4, false);
        let mut writer = FragmentWriter::new(Arc::clone(&queue)).unwrap();
        writer.write(&[1, 2, 3, 4, 5, 6, 7]).unwrap();
        assert_eq!(queue.size(), 2);
        assert_eq!(writer.pending_frames(), 1);
        assert_eq!(drain_one(&queue), vec![1, 2, 3]);
    }

    #[test]
    fn test_only_one_writer_per_queue() {
        let queue = queue(4, 2, false);
        let _writer = FragmentWriter::new(Arc::clone(&queue)).unwrap();
        assert!(matches!(
            FragmentWriter::new(queue),
            Err(QueueError::ProducerExhausted)
        ));
    }
}

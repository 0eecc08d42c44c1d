use std::sync::Arc;

use crate::audio::queue::AudioQueue;
use crate::error::AppError;

use super::Sound;

/// Backend for running without an audio device. It holds on to the queue
/// but never consumes, so the producer overflows quietly: priming never
/// ends and overflow reporting stays off.
#[derive(Debug, Default)]
pub struct NullSound {
    queue: Option<Arc<AudioQueue>>,
}

impl Sound for NullSound {
    fn open(&mut self, queue: Arc<AudioQueue>) -> Result<(), AppError> {
        tracing::debug!("null sound opened");
        self.queue = Some(queue);
        Ok(())
    }

    fn close(&mut self) {
        self.queue = None;
    }

    fn is_open(&self) -> bool {
        self.queue.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::staggered_logger::{LogSink, StaggeredReport};

    #[test]
    fn test_open_close() {
        let sink: LogSink = Arc::new(|_: &StaggeredReport<'_>| {});
        let queue = Arc::new(AudioQueue::new(4, 2, true, sink).unwrap());
        let mut sound = NullSound::default();
        sound.open(Arc::clone(&queue)).unwrap();
        assert!(sound.is_open());
        assert!(queue.overflows_ignored());
        sound.close();
        assert!(!sound.is_open());
        assert_eq!(Arc::strong_count(&queue), 1);
    }
}

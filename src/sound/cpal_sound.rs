use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};

use crate::audio::consumer::FragmentReader;
use crate::audio::queue::AudioQueue;
use crate::error::AppError;

use super::{map_frames, Sound};

/// Frames converted per pass inside the callback; sized so the scratch
/// buffer is allocated once, before the stream starts.
const SCRATCH_FRAMES: usize = 4096;

/// Plays the queue through the default output device.
///
/// The stream runs at the queue's sample rate. Channel layout is adapted to
/// the device, sample rate is not.
pub struct CpalSound {
    sample_rate: u32,
    stream: Option<cpal::Stream>,
}

impl CpalSound {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            stream: None,
        }
    }
}

impl Sound for CpalSound {
    fn open(&mut self, queue: Arc<AudioQueue>) -> Result<(), AppError> {
        self.close();

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AppError::Audio("no audio output device found".into()))?;

        let supported = device
            .default_output_config()
            .map_err(|e| AppError::Audio(e.to_string()))?;
        let sample_format = supported.sample_format();
        tracing::info!(
            "audio: device {}ch {sample_format:?}, queue {} Hz {}ch, {} x {} frames",
            supported.channels(),
            self.sample_rate,
            queue.channels(),
            queue.capacity(),
            queue.fragment_size()
        );

        let config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let reader = FragmentReader::new(queue);
        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, reader)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, reader)?,
            fmt => {
                return Err(AppError::Audio(format!(
                    "unsupported audio sample format: {fmt:?}"
                )))
            }
        };

        stream.play().map_err(|e| AppError::Audio(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        // dropping the stream drops the callback, whose reader closes the sink
        if self.stream.take().is_some() {
            tracing::debug!("cpal stream closed");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for CpalSound {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut reader: FragmentReader,
) -> Result<cpal::Stream, AppError>
where
    T: SizedSample + FromSample<i16>,
{
    let device_channels = config.channels as usize;
    let queue_channels = reader.queue().channels();
    let mut scratch = vec![0i16; SCRATCH_FRAMES * queue_channels];

    device
        .build_output_stream(
            config,
            move |out: &mut [T], _: &cpal::OutputCallbackInfo| {
                for chunk in out.chunks_mut(SCRATCH_FRAMES * device_channels) {
                    let frames = chunk.len() / device_channels;
                    let src = &mut scratch[..frames * queue_channels];
                    if let Err(e) = reader.fill(src) {
                        tracing::error!("audio callback: {e}");
                        src.fill(0);
                    }
                    map_frames(src, queue_channels, chunk, device_channels, |s| {
                        <T as Sample>::from_sample(s)
                    });
                }
            },
            |e| tracing::error!("audio stream error: {e}"),
            None,
        )
        .map_err(|e| AppError::Audio(e.to_string()))
}

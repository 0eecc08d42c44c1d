//! Host audio backends that pull fragments out of an [`AudioQueue`].

pub mod cpal_sound;
pub mod null_sound;

use std::sync::Arc;

use crate::audio::queue::AudioQueue;
use crate::config::{AudioConfig, Backend};
use crate::error::AppError;

pub use cpal_sound::CpalSound;
pub use null_sound::NullSound;

pub trait Sound {
    /// Starts consuming from `queue`. Reopening closes the previous stream.
    fn open(&mut self, queue: Arc<AudioQueue>) -> Result<(), AppError>;

    /// Stops consuming and returns the consumer's working fragment.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Picks the backend named in the config.
pub fn create_sound(config: &AudioConfig) -> Box<dyn Sound> {
    match config.backend {
        Backend::Cpal => {
            tracing::info!("using cpal sound backend at {} Hz", config.sample_rate);
            Box::new(CpalSound::new(config.sample_rate))
        }
        Backend::Null => {
            tracing::info!("sound disabled, using null backend");
            Box::new(NullSound::default())
        }
    }
}

/// Copies interleaved frames from the queue's layout to the device's.
///
/// Mono is duplicated across all device channels, stereo is averaged down
/// for a mono device, and device channels past the second get silence.
/// Converts as many whole frames as fit in both buffers.
pub(crate) fn map_frames<T: Copy>(
    src: &[i16],
    src_channels: usize,
    dst: &mut [T],
    dst_channels: usize,
    convert: impl Fn(i16) -> T,
) {
    let silence = convert(0);
    for (frame_in, frame_out) in src
        .chunks_exact(src_channels)
        .zip(dst.chunks_exact_mut(dst_channels))
    {
        match (src_channels, dst_channels) {
            (1, _) => frame_out.fill(convert(frame_in[0])),
            (_, 1) => {
                let mixed = (i32::from(frame_in[0]) + i32::from(frame_in[1])) / 2;
                frame_out[0] = convert(mixed as i16);
            }
            _ => {
                frame_out[0] = convert(frame_in[0]);
                frame_out[1] = convert(frame_in[1]);
                frame_out[2..].fill(silence);
            }
        }
    }
}

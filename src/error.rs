use thiserror::Error;

use crate::audio::pool::Fragment;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("audio backend error: {0}")]
    Audio(String),
}

/// Misuse of the fragment handoff protocol. These indicate a bug in the
/// caller, not a runtime condition the queue can recover from.
///
/// Variants raised for a handle the caller passed in carry that handle, so
/// a rejected call never costs its owner a fragment.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("enqueue called empty: producer spare already issued")]
    ProducerExhausted,
    #[error("dequeue called empty: consumer spare already issued")]
    ConsumerExhausted,
    #[error("attempt to return unknown buffer {} on close_sink", .0.index())]
    UnknownReturn(Fragment),
    #[error("fragment {} belongs to a different queue", .0.index())]
    ForeignFragment(Fragment),
    #[error("invalid queue configuration: {0}")]
    InvalidConfig(String),
}

impl QueueError {
    /// Takes back the handle a rejected call was given, if any.
    pub fn into_fragment(self) -> Option<Fragment> {
        match self {
            Self::UnknownReturn(fragment) | Self::ForeignFragment(fragment) => Some(fragment),
            _ => None,
        }
    }
}

//! Real-time spectrum analysis over a live or file-sourced audio stream
//!
//! A device callback writes samples into a shared ring buffer and publishes its
//! position; a [`SpectrumAnalyzer`] driven by the caller's own clock reads behind
//! that position and turns the samples into perceptually weighted, smoothed and
//! normalized frequency bins.
//!
//! # Quick start
//! ```no_run
//! use audioscope::{Config, CpalBackend, SpectrumAnalyzer, StreamEngine};
//!
//! let config = Config::default();
//! let mut engine = StreamEngine::new(config.engine.clone(), Box::new(CpalBackend::new())).unwrap();
//! let mut analyzer = SpectrumAnalyzer::new(&config.analyzer).unwrap();
//!
//! engine.start_playback("song.ogg", None).unwrap();
//! loop {
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//!     analyzer.analyze(&engine, 16);
//!     let bins = analyzer.result();
//!     # let _ = bins;
//!     # break;
//! }
//! ```

pub mod audio;

use std::path::PathBuf;

pub use audio::backend::{ActiveDevice, AudioBackend, CpalBackend, ManualBackend};
pub use audio::config::{AnalyzerConfig, Config, EngineConfig};
pub use audio::fft::SpectrumAnalyzer;
pub use audio::stream::StreamEngine;
pub use audio::{AudioMode, DeviceConfig, DeviceInfo, DeviceKind, StreamInfo};

/// Error type for device, decoding and configuration failures
#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    /// Device index past the end of the enumerated list
    #[error("no {kind} device at index {index}")]
    InvalidDevice { kind: DeviceKind, index: usize },

    #[error("failed to open device: {0}")]
    DeviceOpen(String),

    #[error("failed to start device: {0}")]
    DeviceStart(String),

    /// Host or driver level failure outside a specific device
    #[error("audio backend error: {0}")]
    Backend(String),

    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("no playback device is open")]
    DeviceNotOpen,

    #[error("sound bank is full ({0} sounds)")]
    TooManySounds(usize),

    #[error("no sound with handle {0}")]
    InvalidHandle(usize),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AudioError {
    /// Negative result code for callers that speak in integers.
    ///
    /// `-1` for configuration and device failures, `-2` when a resource is
    /// missing or exhausted, `-3` for invalid configuration values.
    pub fn code(&self) -> i32 {
        match self {
            AudioError::DeviceNotOpen | AudioError::TooManySounds(_) => -2,
            AudioError::Config(_) => -3,
            AudioError::InvalidDevice { .. }
            | AudioError::DeviceOpen(_)
            | AudioError::DeviceStart(_)
            | AudioError::Backend(_)
            | AudioError::Decode { .. }
            | AudioError::InvalidHandle(_)
            | AudioError::Io(_) => -1,
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, AudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AudioError::DeviceNotOpen.code(), -2);
        assert_eq!(AudioError::TooManySounds(32).code(), -2);
        assert_eq!(AudioError::InvalidHandle(3).code(), -1);
        assert_eq!(AudioError::Config("bad".into()).code(), -3);
        assert_eq!(
            AudioError::InvalidDevice {
                kind: DeviceKind::Capture,
                index: 9
            }
            .code(),
            -1
        );
    }

    #[test]
    fn test_error_messages() {
        let err = AudioError::InvalidDevice {
            kind: DeviceKind::Playback,
            index: 4,
        };
        assert_eq!(err.to_string(), "no playback device at index 4");

        let err = AudioError::Decode {
            path: PathBuf::from("missing.ogg"),
            reason: "not found".into(),
        };
        assert_eq!(err.to_string(), "failed to decode missing.ogg: not found");
    }
}

pub mod backend;
pub mod config;
pub mod decoder;
pub mod fft;
pub mod lookup;
pub mod producer;
pub mod ring_buffer;
pub mod stream;
pub mod track;

use std::fmt;

/// What the open device is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioMode {
    #[default]
    Idle,
    Playback,
    Capture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Playback,
    Capture,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Playback => write!(f, "playback"),
            DeviceKind::Capture => write!(f, "capture"),
        }
    }
}

/// One entry of a device listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
}

/// Format requested from a backend when opening a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub period_frames: usize,
}

/// Stream format as negotiated on the last device open.
///
/// Read-only between reconfigurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub mode: AudioMode,
    pub channels: usize,
    pub sample_rate: u32,
    pub period_frames: usize,
    pub bytes_per_frame: usize,
    pub predecode_periods: usize,
}

impl StreamInfo {
    pub fn idle(predecode_periods: usize) -> Self {
        Self {
            mode: AudioMode::Idle,
            channels: 2,
            sample_rate: 0,
            period_frames: 0,
            bytes_per_frame: 0,
            predecode_periods,
        }
    }

    /// Interleaved samples the reader trails the writer by in playback
    pub fn predecode_lag(&self) -> usize {
        self.predecode_periods * self.period_frames * self.channels
    }
}

impl fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "mode:              {:?}", self.mode)?;
        writeln!(f, "channels:          {}", self.channels)?;
        writeln!(f, "sample rate:       {} Hz", self.sample_rate)?;
        writeln!(f, "period:            {} frames", self.period_frames)?;
        writeln!(f, "bytes per frame:   {}", self.bytes_per_frame)?;
        write!(f, "predecode periods: {}", self.predecode_periods)
    }
}

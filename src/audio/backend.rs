use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig, SupportedBufferSize};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

use super::producer::Producer;
use super::{DeviceConfig, DeviceInfo, DeviceKind};
use crate::{AudioError, Result};

/// Anything that can enumerate devices and drive a [`Producer`].
pub trait AudioBackend {
    fn devices(&self, kind: DeviceKind) -> Result<Vec<DeviceInfo>>;

    /// Open and start a device, moving `producer` into its callback.
    ///
    /// `index` selects from [`devices`](Self::devices); `None` picks the
    /// host default.
    fn open(
        &mut self,
        kind: DeviceKind,
        index: Option<usize>,
        config: DeviceConfig,
        producer: Producer,
    ) -> Result<Box<dyn ActiveDevice>>;
}

/// A running device. Dropping it stops the callback before returning.
pub trait ActiveDevice {
    fn name(&self) -> &str;
}

/// Hardware devices through the default cpal host
pub struct CpalBackend {
    host: cpal::Host,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    fn list(&self, kind: DeviceKind) -> Result<Vec<cpal::Device>> {
        let devices = match kind {
            DeviceKind::Playback => self.host.output_devices().map_err(backend_error)?.collect(),
            DeviceKind::Capture => self.host.input_devices().map_err(backend_error)?.collect(),
        };
        Ok(devices)
    }

    fn default_device(&self, kind: DeviceKind) -> Option<cpal::Device> {
        match kind {
            DeviceKind::Playback => self.host.default_output_device(),
            DeviceKind::Capture => self.host.default_input_device(),
        }
    }

    /// Ask for the period size when the device advertises support for it.
    fn buffer_size(device: &cpal::Device, kind: DeviceKind, period_frames: usize) -> BufferSize {
        let supported = match kind {
            DeviceKind::Playback => device.default_output_config().map(|c| c.buffer_size().clone()),
            DeviceKind::Capture => device.default_input_config().map(|c| c.buffer_size().clone()),
        };
        match (supported, u32::try_from(period_frames)) {
            (Ok(SupportedBufferSize::Range { min, max }), Ok(frames))
                if (min..=max).contains(&frames) =>
            {
                BufferSize::Fixed(frames)
            }
            _ => {
                debug!("Device does not accept a {} frame period, using its default", period_frames);
                BufferSize::Default
            }
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn backend_error(err: impl std::fmt::Display) -> AudioError {
    AudioError::Backend(err.to_string())
}

struct CpalDevice {
    name: String,
    _stream: cpal::Stream,
}

impl ActiveDevice for CpalDevice {
    fn name(&self) -> &str {
        &self.name
    }
}

impl AudioBackend for CpalBackend {
    fn devices(&self, kind: DeviceKind) -> Result<Vec<DeviceInfo>> {
        let default_name = self.default_device(kind).and_then(|d| d.name().ok());
        let devices = self
            .list(kind)?
            .iter()
            .map(|device| {
                let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
                let is_default = default_name.as_deref() == Some(name.as_str());
                DeviceInfo { name, is_default }
            })
            .collect();
        Ok(devices)
    }

    fn open(
        &mut self,
        kind: DeviceKind,
        index: Option<usize>,
        config: DeviceConfig,
        mut producer: Producer,
    ) -> Result<Box<dyn ActiveDevice>> {
        let device = match index {
            Some(index) => self
                .list(kind)?
                .into_iter()
                .nth(index)
                .ok_or(AudioError::InvalidDevice { kind, index })?,
            None => self
                .default_device(kind)
                .ok_or_else(|| AudioError::DeviceOpen(format!("no default {kind} device available")))?,
        };
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: Self::buffer_size(&device, kind, config.period_frames),
        };
        info!(
            "Creating {} stream on '{}' with {} channels at {} Hz",
            kind, name, config.channels, config.sample_rate
        );

        let error_callback = |err: cpal::StreamError| warn!("Audio stream error: {}", err);
        let stream = match kind {
            DeviceKind::Playback => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| producer.on_playback(data),
                error_callback,
                None,
            ),
            DeviceKind::Capture => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| producer.on_capture(data),
                error_callback,
                None,
            ),
        }
        .map_err(|e| AudioError::DeviceOpen(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::DeviceStart(e.to_string()))?;

        Ok(Box::new(CpalDevice {
            name,
            _stream: stream,
        }))
    }
}

/// Backend pumped by hand from the caller's thread.
///
/// Used for offline rendering, tests and benchmarks. Clones share the same
/// device slot, so one clone can be handed to a [`StreamEngine`] while another
/// drives the callbacks.
///
/// [`StreamEngine`]: crate::StreamEngine
#[derive(Clone, Default)]
pub struct ManualBackend {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    producer: Option<Producer>,
    config: Option<DeviceConfig>,
    generation: u64,
    fail_next_open: bool,
}

struct ManualDevice {
    state: Arc<Mutex<ManualState>>,
    generation: u64,
}

impl ActiveDevice for ManualDevice {
    fn name(&self) -> &str {
        ManualBackend::DEVICE_NAME
    }
}

impl Drop for ManualDevice {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.generation == self.generation {
            state.producer = None;
            state.config = None;
        }
    }
}

impl ManualBackend {
    pub const DEVICE_NAME: &'static str = "manual";

    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` fail with [`AudioError::DeviceOpen`].
    pub fn fail_next_open(&self) {
        self.state.lock().fail_next_open = true;
    }

    /// Format of the currently open device
    pub fn config(&self) -> Option<DeviceConfig> {
        self.state.lock().config
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().producer.is_some()
    }

    /// Deliver captured samples. Returns false when no device is open.
    pub fn pump_capture(&self, input: &[f32]) -> bool {
        match self.state.lock().producer.as_mut() {
            Some(producer) => {
                producer.on_capture(input);
                true
            }
            None => false,
        }
    }

    /// Request output samples. Returns false when no device is open.
    pub fn pump_playback(&self, output: &mut [f32]) -> bool {
        match self.state.lock().producer.as_mut() {
            Some(producer) => {
                producer.on_playback(output);
                true
            }
            None => false,
        }
    }
}

impl AudioBackend for ManualBackend {
    fn devices(&self, _kind: DeviceKind) -> Result<Vec<DeviceInfo>> {
        Ok(vec![DeviceInfo {
            name: Self::DEVICE_NAME.to_string(),
            is_default: true,
        }])
    }

    fn open(
        &mut self,
        kind: DeviceKind,
        index: Option<usize>,
        config: DeviceConfig,
        producer: Producer,
    ) -> Result<Box<dyn ActiveDevice>> {
        if let Some(index) = index.filter(|&i| i > 0) {
            return Err(AudioError::InvalidDevice { kind, index });
        }

        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_open) {
            return Err(AudioError::DeviceOpen("manual device refused to open".into()));
        }

        state.generation += 1;
        state.producer = Some(producer);
        state.config = Some(config);

        Ok(Box::new(ManualDevice {
            state: Arc::clone(&self.state),
            generation: state.generation,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::producer::SharedStream;
    use crate::audio::{AudioMode, StreamInfo};

    fn capture_producer(shared: &Arc<SharedStream>) -> Producer {
        shared.ring.reset(2);
        let info = StreamInfo {
            mode: AudioMode::Capture,
            channels: 2,
            sample_rate: 44100,
            period_frames: 4,
            bytes_per_frame: 8,
            predecode_periods: 1,
        };
        Producer::new(Arc::clone(shared), &info)
    }

    fn device_config() -> DeviceConfig {
        DeviceConfig {
            sample_rate: 44100,
            channels: 2,
            period_frames: 4,
        }
    }

    #[test]
    fn test_manual_pump_requires_open_device() {
        let backend = ManualBackend::new();
        assert!(!backend.pump_capture(&[0.0; 8]));
        assert!(!backend.pump_playback(&mut [0.0; 8]));
    }

    #[test]
    fn test_manual_open_pump_and_drop() {
        let shared = Arc::new(SharedStream::new(16, 1));
        let mut backend = ManualBackend::new();
        let handle = backend.clone();

        let device = backend
            .open(DeviceKind::Capture, None, device_config(), capture_producer(&shared))
            .unwrap();
        assert_eq!(device.name(), "manual");
        assert_eq!(handle.config(), Some(device_config()));

        assert!(handle.pump_capture(&[0.5; 8]));
        assert_eq!(shared.ring.try_consume(), Some(0));

        drop(device);
        assert!(!handle.is_open());
        assert!(!handle.pump_capture(&[0.5; 8]));
    }

    #[test]
    fn test_manual_rejects_bad_index_and_forced_failure() {
        let shared = Arc::new(SharedStream::new(16, 1));
        let mut backend = ManualBackend::new();

        let err = backend
            .open(DeviceKind::Capture, Some(3), device_config(), capture_producer(&shared))
            .err()
            .unwrap();
        assert!(matches!(err, AudioError::InvalidDevice { index: 3, .. }));

        backend.fail_next_open();
        let err = backend
            .open(DeviceKind::Capture, Some(0), device_config(), capture_producer(&shared))
            .err()
            .unwrap();
        assert_eq!(err.code(), -1);
        assert!(!backend.is_open());

        assert!(backend
            .open(DeviceKind::Capture, Some(0), device_config(), capture_producer(&shared))
            .is_ok());
    }

    #[test]
    fn test_stale_device_drop_keeps_newer_device() {
        let shared = Arc::new(SharedStream::new(16, 1));
        let mut backend = ManualBackend::new();

        let first = backend
            .open(DeviceKind::Capture, None, device_config(), capture_producer(&shared))
            .unwrap();
        let second = backend
            .open(DeviceKind::Capture, None, device_config(), capture_producer(&shared))
            .unwrap();
        drop(first);
        assert!(backend.is_open());
        drop(second);
        assert!(!backend.is_open());
    }

    #[test]
    fn test_manual_lists_one_default_device() {
        let devices = ManualBackend::new().devices(DeviceKind::Playback).unwrap();
        assert_eq!(devices.len(), 1);
        assert!(devices[0].is_default);
    }
}

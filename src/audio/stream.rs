use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;

use super::backend::{ActiveDevice, AudioBackend};
use super::config::EngineConfig;
use super::decoder::decode_file;
use super::producer::{Producer, SharedStream};
use super::ring_buffer::RingBuffer;
use super::track::Track;
use super::{AudioMode, DeviceConfig, DeviceInfo, DeviceKind, StreamInfo};
use crate::{AudioError, Result};

/// Owns the device, the ring buffer and the loaded song and sounds.
///
/// At most one device is open at a time. Opening a device always tears down
/// the current one first, so a failed open leaves the engine [`AudioMode::Idle`].
pub struct StreamEngine {
    config: EngineConfig,
    backend: Box<dyn AudioBackend>,
    shared: Arc<SharedStream>,
    info: StreamInfo,
    device: Option<Box<dyn ActiveDevice>>,
}

impl StreamEngine {
    pub fn new(config: EngineConfig, backend: Box<dyn AudioBackend>) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(SharedStream::new(config.buffer_frames, config.max_sounds));
        let info = StreamInfo::idle(config.predecode_periods);

        Ok(Self {
            config,
            backend,
            shared,
            info,
            device: None,
        })
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }

    pub fn mode(&self) -> AudioMode {
        self.info.mode
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device.as_ref().map(|device| device.name())
    }

    pub fn devices(&self, kind: DeviceKind) -> Result<Vec<DeviceInfo>> {
        self.backend.devices(kind)
    }

    /// Whether the analyzer should read real audio right now.
    ///
    /// Capture is always live; playback only while the song is producing frames.
    pub fn is_playing(&self) -> bool {
        match self.info.mode {
            AudioMode::Capture => true,
            AudioMode::Playback => self.shared.is_playing(),
            AudioMode::Idle => false,
        }
    }

    pub(crate) fn ring(&self) -> &RingBuffer {
        &self.shared.ring
    }

    pub fn open_playback_device(&mut self, index: Option<usize>) -> Result<()> {
        self.open(DeviceKind::Playback, index)
    }

    pub fn open_capture_device(&mut self, index: Option<usize>) -> Result<()> {
        self.open(DeviceKind::Capture, index)
    }

    fn open(&mut self, kind: DeviceKind, index: Option<usize>) -> Result<()> {
        self.close_device();

        let (mode, sample_rate, channels) = match kind {
            DeviceKind::Playback => (
                AudioMode::Playback,
                self.config.playback_sample_rate,
                self.config.playback_channels,
            ),
            DeviceKind::Capture => (
                AudioMode::Capture,
                self.config.capture_sample_rate,
                self.config.capture_channels,
            ),
        };
        let info = StreamInfo {
            mode,
            channels: usize::from(channels),
            sample_rate,
            period_frames: self.config.period_frames,
            bytes_per_frame: usize::from(channels) * std::mem::size_of::<f32>(),
            predecode_periods: self.config.predecode_periods,
        };

        // No callback is running here, the old device was dropped above
        self.shared.ring.reset(info.channels);
        self.shared.set_playing(false);

        let producer = Producer::new(Arc::clone(&self.shared), &info);
        let device_config = DeviceConfig {
            sample_rate,
            channels,
            period_frames: self.config.period_frames,
        };
        let device = self.backend.open(kind, index, device_config, producer).map_err(|e| {
            warn!("Failed to open {} device: {}", kind, e);
            e
        })?;

        info!("Opened {} device '{}'", kind, device.name());
        debug!("Stream info:\n{}", info);

        self.info = info;
        self.device = Some(device);
        Ok(())
    }

    /// Stop and release the open device, if any. Loaded tracks are kept.
    pub fn close_device(&mut self) {
        if let Some(device) = self.device.take() {
            let name = device.name().to_string();
            drop(device);
            info!("Closed {} device '{}'", self.kind_label(), name);
        }
        self.info = StreamInfo::idle(self.config.predecode_periods);
        self.shared.set_playing(false);
    }

    fn kind_label(&self) -> &'static str {
        match self.info.mode {
            AudioMode::Capture => "capture",
            AudioMode::Playback => "playback",
            AudioMode::Idle => "idle",
        }
    }

    /// Decode `path`, open a playback device and start the song.
    ///
    /// The file is decoded before anything else, so a missing or empty file
    /// leaves the current device untouched.
    pub fn start_playback<P: AsRef<Path>>(&mut self, path: P, device: Option<usize>) -> Result<()> {
        let track = decode_file(path)?;
        self.open_playback_device(device)?;
        self.install_song(track);
        Ok(())
    }

    pub fn start_capture(&mut self, device: Option<usize>) -> Result<()> {
        self.open_capture_device(device)
    }

    /// Replace the current song and start it from the beginning.
    pub fn play_song<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.require_playback()?;
        let track = decode_file(path)?;
        self.install_song(track);
        Ok(())
    }

    fn install_song(&mut self, mut track: Track) {
        if track.sample_rate() != self.info.sample_rate {
            warn!(
                "{:?} is {} Hz but the device runs at {} Hz; it will play at the wrong speed",
                track.path(),
                track.sample_rate(),
                self.info.sample_rate
            );
        }
        track.start();
        info!("Playing song {:?}", track.path());

        let previous = {
            let mut bank = self.shared.bank.lock();
            self.shared.ring.silence();
            let previous = bank.song.replace(track);
            self.shared.publish_song(bank.song.as_ref());
            previous
        };
        drop(previous);
    }

    pub fn pause_song(&mut self) -> Result<()> {
        self.require_playback()?;
        if let Some(song) = self.shared.bank.lock().song.as_mut() {
            song.stop();
        }
        Ok(())
    }

    /// Continue the song, rewinding first if it already finished.
    pub fn resume_song(&mut self) -> Result<()> {
        self.require_playback()?;
        let mut bank = self.shared.bank.lock();
        if let Some(song) = bank.song.as_mut() {
            if song.at_end() {
                song.seek(0);
            }
            song.start();
        }
        self.shared.publish_song(bank.song.as_ref());
        Ok(())
    }

    /// Song position in seconds, 0 with no song loaded.
    ///
    /// Reads the position last published by the device callback and never
    /// touches the sound bank.
    pub fn song_cursor(&self) -> f32 {
        self.shared.song_cursor()
    }

    /// Song length in seconds, 0 with no song loaded.
    pub fn song_length(&self) -> f32 {
        self.shared.song_length()
    }

    pub fn is_song_finished(&self) -> bool {
        self.shared.is_song_finished()
    }

    /// Negative values clamp to silence.
    pub fn set_music_volume(&self, volume: f32) {
        self.shared.set_music_volume(volume);
    }

    pub fn set_other_volume(&self, volume: f32) {
        self.shared.set_other_volume(volume);
    }

    pub fn music_volume(&self) -> f32 {
        self.shared.music_volume()
    }

    pub fn other_volume(&self) -> f32 {
        self.shared.other_volume()
    }

    /// Decode a one-shot sound and return its handle.
    pub fn load_sound<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let max_sounds = self.config.max_sounds;
        if self.shared.bank.lock().is_full() {
            warn!("Failed to load sound {:?}, exceeded max number of sounds", path.as_ref());
            return Err(AudioError::TooManySounds(max_sounds));
        }

        let track = decode_file(path)?;
        let mut bank = self.shared.bank.lock();
        if bank.is_full() {
            return Err(AudioError::TooManySounds(max_sounds));
        }
        bank.sounds.push(track);
        self.shared.publish_sound_count(bank.sounds.len());
        Ok(bank.sounds.len() - 1)
    }

    /// Trigger a loaded sound.
    ///
    /// A sound that is already playing restarts only once its cursor has
    /// passed `repeat_delay` seconds.
    pub fn play_sound(&mut self, handle: usize, repeat_delay: f32) -> Result<()> {
        if self.mode() != AudioMode::Playback {
            warn!("Attempting to play sound before opening playback device");
            return Err(AudioError::DeviceNotOpen);
        }

        let mut bank = self.shared.bank.lock();
        let sound = bank
            .sounds
            .get_mut(handle)
            .ok_or(AudioError::InvalidHandle(handle))?;

        if sound.is_playing() {
            if sound.cursor_secs() > repeat_delay {
                sound.seek(0);
            }
        } else {
            sound.start();
        }
        Ok(())
    }

    pub fn clear_sounds(&mut self) {
        let mut bank = self.shared.bank.lock();
        bank.sounds.clear();
        self.shared.publish_sound_count(0);
    }

    pub fn sound_count(&self) -> usize {
        self.shared.sound_count()
    }

    fn require_playback(&self) -> Result<()> {
        if self.mode() == AudioMode::Playback {
            Ok(())
        } else {
            Err(AudioError::DeviceNotOpen)
        }
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        self.close_device();
    }
}

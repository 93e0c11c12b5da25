//! Device-thread side of the stream engine
//!
//! A [`Producer`] is moved into the backend's callback when a device opens. It
//! never allocates and never waits on the sound bank: when the control thread
//! holds the bank, that period is rendered as silence. Song position and the
//! sound count are mirrored into atomics so status queries stay off the bank.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use super::ring_buffer::{reader_pos_for, RingBuffer};
use super::track::{FrameSource, SoundBank, Track};
use super::{AudioMode, StreamInfo};

/// State shared between the control thread, the device callback and the analyzer
#[derive(Debug)]
pub struct SharedStream {
    pub ring: RingBuffer,
    pub bank: Mutex<SoundBank>,
    playing: AtomicBool,
    music_volume: AtomicU32,
    other_volume: AtomicU32,
    song: SongStatus,
    sound_count: AtomicUsize,
}

/// Lock-free copy of the song position, refreshed whenever the bank changes it
#[derive(Debug, Default)]
struct SongStatus {
    cursor: AtomicUsize,
    frames: AtomicUsize,
    /// Zero while no song is loaded
    sample_rate: AtomicU32,
}

impl SharedStream {
    pub fn new(buffer_frames: usize, max_sounds: usize) -> Self {
        Self {
            ring: RingBuffer::new(buffer_frames),
            bank: Mutex::new(SoundBank::new(max_sounds)),
            playing: AtomicBool::new(false),
            music_volume: AtomicU32::new(1.0f32.to_bits()),
            other_volume: AtomicU32::new(1.0f32.to_bits()),
            song: SongStatus::default(),
            sound_count: AtomicUsize::new(0),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub fn music_volume(&self) -> f32 {
        f32::from_bits(self.music_volume.load(Ordering::Relaxed))
    }

    pub fn set_music_volume(&self, volume: f32) {
        self.music_volume
            .store(non_negative(volume).to_bits(), Ordering::Relaxed);
    }

    pub fn other_volume(&self) -> f32 {
        f32::from_bits(self.other_volume.load(Ordering::Relaxed))
    }

    pub fn set_other_volume(&self, volume: f32) {
        self.other_volume
            .store(non_negative(volume).to_bits(), Ordering::Relaxed);
    }

    /// Mirror `song` into the status atomics. Call with the bank held.
    pub fn publish_song(&self, song: Option<&Track>) {
        let (cursor, frames, sample_rate) = song.map_or((0, 0, 0), |track| {
            (track.cursor_frames(), track.frames(), track.sample_rate())
        });
        self.song.frames.store(frames, Ordering::Relaxed);
        self.song.sample_rate.store(sample_rate, Ordering::Relaxed);
        self.song.cursor.store(cursor, Ordering::Release);
    }

    /// Song position in seconds, 0 with no song loaded.
    pub fn song_cursor(&self) -> f32 {
        let cursor = self.song.cursor.load(Ordering::Acquire);
        match self.song.sample_rate.load(Ordering::Relaxed) {
            0 => 0.0,
            rate => cursor as f32 / rate as f32,
        }
    }

    pub fn song_length(&self) -> f32 {
        match self.song.sample_rate.load(Ordering::Relaxed) {
            0 => 0.0,
            rate => self.song.frames.load(Ordering::Relaxed) as f32 / rate as f32,
        }
    }

    pub fn is_song_finished(&self) -> bool {
        let cursor = self.song.cursor.load(Ordering::Acquire);
        self.song.sample_rate.load(Ordering::Relaxed) != 0
            && cursor >= self.song.frames.load(Ordering::Relaxed)
    }

    pub fn sound_count(&self) -> usize {
        self.sound_count.load(Ordering::Relaxed)
    }

    /// Call with the bank held after adding or removing sounds.
    pub fn publish_sound_count(&self, count: usize) {
        self.sound_count.store(count, Ordering::Relaxed);
    }
}

/// Negative and NaN volumes become silence.
fn non_negative(volume: f32) -> f32 {
    if volume > 0.0 {
        volume
    } else {
        0.0
    }
}

/// Callback half of an open device
pub struct Producer {
    shared: Arc<SharedStream>,
    mode: AudioMode,
    channels: usize,
    period_samples: usize,
    lag: usize,
    writer_pos: usize,
    /// One period of song audio before it reaches the ring
    scratch: Vec<f32>,
}

impl Producer {
    /// Must be created after the ring has been reset for `info`.
    pub fn new(shared: Arc<SharedStream>, info: &StreamInfo) -> Self {
        let channels = info.channels.max(1);
        let period_samples = info.period_frames.max(1) * channels;
        Self {
            shared,
            mode: info.mode,
            channels,
            period_samples,
            lag: info.predecode_lag(),
            writer_pos: 0,
            scratch: vec![0.0; period_samples],
        }
    }

    pub fn mode(&self) -> AudioMode {
        self.mode
    }

    /// Input callback: store captured frames and publish with no lag.
    pub fn on_capture(&mut self, input: &[f32]) {
        if self.mode != AudioMode::Capture {
            return;
        }
        for chunk in input.chunks(self.period_samples) {
            self.capture_period(chunk);
        }
    }

    fn capture_period(&mut self, input: &[f32]) {
        let ring = &self.shared.ring;
        let len = ring.len();
        let input = &input[..input.len() - input.len() % self.channels];
        if len == 0 || input.is_empty() {
            return;
        }

        ring.write(self.writer_pos, input);
        let reader_pos = reader_pos_for(AudioMode::Capture, self.writer_pos, self.lag, len);
        self.writer_pos = (self.writer_pos + input.len()) % len;
        ring.publish(self.writer_pos, reader_pos);
    }

    /// Output callback: mix sounds, then run the song through the ring and
    /// play it back `lag` samples later.
    pub fn on_playback(&mut self, output: &mut [f32]) {
        output.fill(0.0);

        let shared = Arc::clone(&self.shared);
        let Some(mut bank) = shared.bank.try_lock() else {
            return;
        };

        for chunk in output.chunks_mut(self.period_samples) {
            self.playback_period(&mut bank, chunk);
        }
        shared.publish_song(bank.song.as_ref());
    }

    fn playback_period(&mut self, bank: &mut SoundBank, output: &mut [f32]) {
        let shared = &*self.shared;
        let channels = self.channels;

        let other_volume = shared.other_volume();
        for sound in bank.sounds.iter_mut() {
            sound.mix_into(output, channels, other_volume);
        }

        if self.mode != AudioMode::Playback {
            return;
        }

        let samples = output.len() - output.len() % channels;
        let scratch = &mut self.scratch[..samples];
        let frames = match bank.song.as_mut() {
            Some(song) => song.read_frames(scratch, channels),
            None => 0,
        };
        if frames == 0 {
            shared.set_playing(false);
            return;
        }
        shared.set_playing(true);
        scratch[frames * channels..].fill(0.0);

        let ring = &shared.ring;
        let len = ring.len();
        if len == 0 {
            return;
        }
        ring.write(self.writer_pos, scratch);
        let reader_pos = reader_pos_for(AudioMode::Playback, self.writer_pos, self.lag, len);

        let music_volume = shared.music_volume();
        for (i, out) in output[..samples].iter_mut().enumerate() {
            *out += ring.sample(reader_pos + i) * music_volume;
        }

        self.writer_pos = (self.writer_pos + samples) % len;
        ring.publish(self.writer_pos, reader_pos);
    }
}

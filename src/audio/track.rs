use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Pull-style source of interleaved frames
pub trait FrameSource {
    /// Fill up to `dest.len() / channels` frames, returning how many were written.
    ///
    /// Zero means the source has nothing more to give.
    fn read_frames(&mut self, dest: &mut [f32], channels: usize) -> usize;
}

/// A decoded sound held in memory with its own play cursor.
///
/// Samples are stored at the file's native channel count and mapped to the
/// device layout on every read, so a track survives device reconfiguration.
#[derive(Debug, Clone)]
pub struct Track {
    path: PathBuf,
    samples: Arc<[f32]>,
    channels: usize,
    sample_rate: u32,
    /// Position in source frames
    cursor: usize,
    playing: bool,
}

impl Track {
    pub fn new(path: impl Into<PathBuf>, samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            path: path.into(),
            samples: samples.into(),
            channels: usize::from(channels.max(1)),
            sample_rate,
            cursor: 0,
            playing: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn at_end(&self) -> bool {
        self.cursor >= self.frames()
    }

    /// Start from the current cursor, rewinding first if already at the end.
    pub fn start(&mut self) {
        if self.at_end() {
            self.cursor = 0;
        }
        self.playing = true;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn seek(&mut self, frame: usize) {
        self.cursor = frame.min(self.frames());
    }

    pub fn cursor_frames(&self) -> usize {
        self.cursor
    }

    pub fn cursor_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.cursor as f32 / self.sample_rate as f32
    }

    pub fn length_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f32 / self.sample_rate as f32
    }

    /// Add the next frames into `out`, scaled by `volume`.
    pub fn mix_into(&mut self, out: &mut [f32], channels: usize, volume: f32) -> usize {
        self.pull(out, channels, |dest, sample| *dest += sample * volume)
    }

    /// Walk frames from the cursor, handing each mapped sample to `put`.
    fn pull(&mut self, out: &mut [f32], channels: usize, mut put: impl FnMut(&mut f32, f32)) -> usize {
        if !self.playing || channels == 0 {
            return 0;
        }

        let wanted = out.len() / channels;
        let available = self.frames().saturating_sub(self.cursor);
        let frames = wanted.min(available);
        let src_channels = self.channels;

        for (frame, dest) in out.chunks_exact_mut(channels).take(frames).enumerate() {
            let start = (self.cursor + frame) * src_channels;
            let src = &self.samples[start..start + src_channels];
            for (ch, sample) in dest.iter_mut().enumerate() {
                put(sample, map_channel(src, ch, channels));
            }
        }

        self.cursor += frames;
        if self.at_end() {
            self.playing = false;
        }
        frames
    }
}

impl FrameSource for Track {
    fn read_frames(&mut self, dest: &mut [f32], channels: usize) -> usize {
        self.pull(dest, channels, |out, sample| *out = sample)
    }
}

/// Sample for output channel `ch` given one source frame.
#[inline]
fn map_channel(src: &[f32], ch: usize, out_channels: usize) -> f32 {
    if src.len() == out_channels {
        src[ch]
    } else if out_channels == 1 {
        src.iter().sum::<f32>() / src.len() as f32
    } else {
        src[ch.min(src.len() - 1)]
    }
}

/// Song and one-shot sounds reachable from the device callback
#[derive(Debug)]
pub struct SoundBank {
    pub song: Option<Track>,
    pub sounds: Vec<Track>,
    max_sounds: usize,
}

impl SoundBank {
    pub fn new(max_sounds: usize) -> Self {
        Self {
            song: None,
            sounds: Vec::with_capacity(max_sounds),
            max_sounds,
        }
    }

    pub fn max_sounds(&self) -> usize {
        self.max_sounds
    }

    pub fn is_full(&self) -> bool {
        self.sounds.len() >= self.max_sounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn stereo_ramp(frames: usize) -> Track {
        let samples = (0..frames)
            .flat_map(|i| [i as f32, -(i as f32)])
            .collect();
        Track::new("ramp.wav", samples, 2, 100)
    }

    #[test]
    fn test_stopped_track_reads_nothing() {
        let mut track = stereo_ramp(8);
        let mut dest = [1.0; 8];
        assert_eq!(track.read_frames(&mut dest, 2), 0);
        assert_eq!(dest, [1.0; 8]);
    }

    #[test]
    fn test_read_advances_and_finishes() {
        let mut track = stereo_ramp(6);
        track.start();

        let mut dest = [0.0; 8];
        assert_eq!(track.read_frames(&mut dest, 2), 4);
        assert_eq!(dest, [0.0, -0.0, 1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
        assert!(track.is_playing());

        assert_eq!(track.read_frames(&mut dest, 2), 2);
        assert_eq!(&dest[..4], &[4.0, -4.0, 5.0, -5.0]);
        assert!(track.at_end());
        assert!(!track.is_playing());
        assert_eq!(track.read_frames(&mut dest, 2), 0);
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let mut track = Track::new("s.wav", vec![1.0, 0.0, 0.5, 0.5], 2, 100);
        track.start();
        let mut dest = [0.0; 2];
        assert_eq!(track.read_frames(&mut dest, 1), 2);
        assert_eq!(dest, [0.5, 0.5]);
    }

    #[test]
    fn test_mono_to_stereo_duplicates() {
        let mut track = Track::new("m.wav", vec![0.25, 0.75], 1, 100);
        track.start();
        let mut dest = [0.0; 4];
        assert_eq!(track.read_frames(&mut dest, 2), 2);
        assert_eq!(dest, [0.25, 0.25, 0.75, 0.75]);
    }

    #[test]
    fn test_mix_adds_scaled() {
        let mut track = Track::new("m.wav", vec![1.0, 1.0], 1, 100);
        track.start();
        let mut out = [0.5; 4];
        track.mix_into(&mut out, 2, 0.5);
        assert_eq!(out, [1.0; 4]);
    }

    #[test]
    fn test_start_at_end_rewinds() {
        let mut track = stereo_ramp(4);
        track.seek(100);
        assert!(track.at_end());
        track.start();
        assert!(!track.at_end());
        assert_relative_eq!(track.cursor_secs(), 0.0);
    }

    #[test]
    fn test_time_queries() {
        let mut track = stereo_ramp(250);
        assert_relative_eq!(track.length_secs(), 2.5);
        track.seek(50);
        assert_relative_eq!(track.cursor_secs(), 0.5);
    }

    #[test]
    fn test_sound_bank_capacity() {
        let mut bank = SoundBank::new(2);
        assert!(!bank.is_full());
        bank.sounds.push(stereo_ramp(1));
        bank.sounds.push(stereo_ramp(1));
        assert!(bank.is_full());
        assert_eq!(bank.max_sounds(), 2);
    }
}

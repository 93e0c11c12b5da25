use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::lookup::ControlPoint;
use crate::AudioError;

/// Frame-count and device settings for the stream engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ring buffer length in frames. Storage is allocated for two channels.
    pub buffer_frames: usize,
    /// Periods of decoded audio kept between writer and reader during playback
    pub predecode_periods: usize,
    /// Frames delivered per device callback
    pub period_frames: usize,
    pub playback_sample_rate: u32,
    pub playback_channels: u16,
    pub capture_sample_rate: u32,
    pub capture_channels: u16,
    /// Upper bound on loaded one-shot sounds
    pub max_sounds: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_frames: 4096 * 10,
            predecode_periods: 5,
            period_frames: 4096,
            playback_sample_rate: 48000,
            playback_channels: 2,
            capture_sample_rate: 44100,
            capture_channels: 2,
            max_sounds: 32,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> crate::Result<()> {
        for channels in [self.playback_channels, self.capture_channels] {
            if !(1..=2).contains(&channels) {
                return Err(AudioError::Config(format!(
                    "channel count must be 1 or 2, got {channels}"
                )));
            }
        }
        if self.period_frames == 0 {
            return Err(AudioError::Config("period_frames must be greater than 0".into()));
        }
        if self.playback_sample_rate == 0 || self.capture_sample_rate == 0 {
            return Err(AudioError::Config("sample rates must be greater than 0".into()));
        }
        let lag = self.predecode_periods * self.period_frames;
        if self.buffer_frames <= lag + self.period_frames {
            return Err(AudioError::Config(format!(
                "buffer_frames ({}) must exceed the predecode lag plus one period ({})",
                self.buffer_frames,
                lag + self.period_frames
            )));
        }
        Ok(())
    }
}

/// Transform size, bin layout and perceptual curves for the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub fft_size: usize,
    pub bin_count: usize,
    /// Normalized bin position (0..1) to upper frequency in Hz
    pub freq_points: Vec<ControlPoint>,
    /// Frequency in Hz to loudness correction in dB
    pub weight_points: Vec<ControlPoint>,
    /// Starting normalization ceiling
    pub initial_max: f32,
    /// Cursor lead (in samples) tolerated before snapping back to the producer
    pub max_desync: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            bin_count: 1024,
            freq_points: vec![
                [0.0, 35.0],
                [0.2, 450.0],
                [0.3, 700.0],
                [0.4, 1200.0],
                [0.5, 1700.0],
                [0.6, 2600.0],
                [0.7, 4100.0],
                [0.8, 6500.0],
                [0.9, 10000.0],
                [1.0, 20000.0],
            ],
            // Roughly inverted equal-loudness, flat below 315 Hz
            weight_points: vec![
                [63.0, -5.0],
                [200.0, -5.0],
                [250.0, -5.0],
                [315.0, -5.0],
                [400.0, -4.8],
                [500.0, -3.2],
                [630.0, -1.9],
                [800.0, -0.8],
                [1000.0, 0.0],
                [1250.0, 0.6],
                [1600.0, 1.0],
                [2000.0, 1.2],
                [2500.0, 3.3],
                [3150.0, 4.2],
                [4000.0, 5.0],
            ],
            initial_max: 2.5,
            max_desync: 1500,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.fft_size < 2 || self.fft_size % 2 != 0 {
            return Err(AudioError::Config(format!(
                "fft_size must be an even number of at least 2, got {}",
                self.fft_size
            )));
        }
        if self.bin_count == 0 {
            return Err(AudioError::Config("bin_count must be greater than 0".into()));
        }
        if self.initial_max <= 0.0 {
            return Err(AudioError::Config("initial_max must be positive".into()));
        }
        check_curve("freq_points", &self.freq_points)?;
        check_curve("weight_points", &self.weight_points)
    }
}

fn check_curve(name: &str, points: &[ControlPoint]) -> crate::Result<()> {
    if points.is_empty() {
        return Err(AudioError::Config(format!("{name} must not be empty")));
    }
    if points.windows(2).any(|pair| pair[0][0] >= pair[1][0]) {
        return Err(AudioError::Config(format!(
            "{name} must be strictly increasing in x"
        )));
    }
    Ok(())
}

/// Everything a caller persists between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub analyzer: AnalyzerConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.engine.validate()?;
        config.analyzer.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(AnalyzerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_buffer_must_cover_predecode_lag() {
        let config = EngineConfig {
            buffer_frames: 4096 * 6,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), -3);
    }

    #[test]
    fn test_unsorted_curve_rejected() {
        let config = AnalyzerConfig {
            weight_points: vec![[100.0, 0.0], [50.0, 1.0]],
            ..AnalyzerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audioscope.json");
        std::fs::write(&path, r#"{ "analyzer": { "bin_count": 64 } }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.analyzer.bin_count, 64);
        assert_eq!(config.analyzer.fft_size, 4096);
        assert_eq!(config.engine.predecode_periods, 5);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.json");
        let mut config = Config::default();
        config.engine.max_sounds = 4;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.engine.max_sounds, 4);
        assert_eq!(loaded.analyzer.freq_points.len(), 10);
    }
}

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::config::AnalyzerConfig;
use super::lookup::SpectrumTables;
use super::ring_buffer::RingBuffer;
use super::stream::StreamEngine;
use super::AudioMode;

const ATTACK: f32 = 0.2;
const RELEASE: f32 = 0.9;
const LEVEL_ATTACK: f32 = 0.5;
const LEVEL_RELEASE: f32 = 0.9;
const LEVEL_GAIN: f32 = 5.0;

/// Time-driven spectrum analyzer reading behind a [`StreamEngine`].
///
/// Every call to [`analyze`](Self::analyze) advances an internal cursor by the
/// elapsed wall-clock time, resyncs it to the producer when it drifts, and
/// rebuilds the output bins.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    tables: SpectrumTables,

    // Transform buffers
    input: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,

    raw: Vec<f32>,
    averaged: Vec<f32>,
    result: Vec<f32>,

    cursor: usize,
    running_max: f32,
    level: f32,
    max_desync: usize,
}

impl SpectrumAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> crate::Result<Self> {
        config.validate()?;
        let fft_size = config.fft_size;
        let bins = config.bin_count;

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Ok(Self {
            fft,
            fft_size,
            tables: SpectrumTables::build(config),
            input: vec![0.0; fft_size],
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
            raw: vec![0.0; bins],
            averaged: vec![0.0; bins],
            result: vec![0.0; bins],
            cursor: 0,
            running_max: config.initial_max,
            level: 0.0,
            max_desync: config.max_desync,
        })
    }

    /// Run one analysis tick covering `elapsed_msec` of wall-clock time.
    pub fn analyze(&mut self, engine: &StreamEngine, elapsed_msec: u32) {
        let info = engine.info();
        let ring = engine.ring();
        let len = ring.len();
        let channels = info.channels.max(1);

        let advance = (u64::from(info.sample_rate) * u64::from(elapsed_msec) / 1000) as usize;
        self.advance(advance * channels, len);

        if let Some(reader_pos) = ring.try_consume() {
            self.resync(reader_pos);
        }

        if engine.is_playing() && len > 0 {
            // Capture shows audio a full window behind the newest samples
            let origin = match info.mode {
                AudioMode::Capture => {
                    let back = (self.fft_size * channels) % len;
                    (self.cursor + len - back) % len
                }
                _ => self.cursor,
            };
            self.read_window(ring, origin, channels);
        } else {
            self.input.fill(0.0);
        }

        self.level = smooth_level(&self.input, self.level);
        self.transform();

        let half = self.fft_size / 2;
        read_into_bins(&mut self.raw, &self.tables.freqs, &self.buffer[..half], info.sample_rate);
        apply_weighting(&mut self.raw, &self.tables.weights);
        apply_averaging(&self.raw, &mut self.averaged);
        apply_smoothing(&self.averaged, &mut self.result);
        self.running_max = normalize(&mut self.result, self.running_max);
    }

    fn advance(&mut self, samples: usize, len: usize) {
        if len == 0 {
            self.cursor = 0;
            return;
        }
        self.cursor = (self.cursor + samples) % len;
    }

    /// Snap to the published position if behind it or too far ahead.
    pub(crate) fn resync(&mut self, reader_pos: usize) {
        if self.cursor < reader_pos || self.cursor - reader_pos > self.max_desync {
            self.cursor = reader_pos;
        }
    }

    /// Downmix, window and stage `fft_size` samples starting at `origin`.
    fn read_window(&mut self, ring: &RingBuffer, origin: usize, channels: usize) {
        let mut pos = origin;
        for (sample, &weight) in self.input.iter_mut().zip(&self.tables.window) {
            *sample = if channels == 2 {
                (ring.sample(pos) * weight + ring.sample(pos + 1) * weight) / 2.0
            } else {
                ring.sample(pos) * weight
            };
            pos += channels;
        }
    }

    fn transform(&mut self) {
        for (slot, &sample) in self.buffer.iter_mut().zip(&self.input) {
            *slot = Complex::new(sample, 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);
    }

    /// Output bins, nominally in `[0, 1]`, lowest frequency first
    pub fn result(&self) -> &[f32] {
        &self.result
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Normalization ceiling; only ever grows
    pub fn running_max(&self) -> f32 {
        self.running_max
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Upper frequency of each output bin in Hz
    pub fn frequencies(&self) -> &[f32] {
        &self.tables.freqs
    }

    pub fn bin_count(&self) -> usize {
        self.result.len()
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}

/// Average transform magnitudes into the non-uniform output bins.
///
/// Output bins that a single transform bin jumps over copy the bin before
/// them. Bins above the last transform frequency hold the last finished value.
pub(crate) fn read_into_bins(
    out: &mut [f32],
    freqs: &[f32],
    spectrum: &[Complex<f32>],
    sample_rate: u32,
) {
    let bin_count = out.len().min(freqs.len());
    if bin_count == 0 || spectrum.is_empty() {
        out.fill(0.0);
        return;
    }

    let nyquist = sample_rate as f32 / 2.0;
    let step = nyquist / spectrum.len() as f32;
    let mut current = 0;
    let mut count = 0usize;
    out[0] = 0.0;

    for (i, value) in spectrum.iter().enumerate() {
        let freq = i as f32 * step;
        if freq > freqs[current] {
            finish_bin(out, current, count);
            count = 0;
            current += 1;

            while current < bin_count && freq > freqs[current] {
                out[current] = out[current - 1];
                current += 1;
            }
            if current >= bin_count {
                break;
            }
            out[current] = 0.0;
        }

        out[current] += value.norm();
        count += 1;
    }

    if current < bin_count {
        finish_bin(out, current, count);
        let last = out[current];
        out[current + 1..bin_count].fill(last);
    }
}

fn finish_bin(out: &mut [f32], bin: usize, count: usize) {
    if count > 0 {
        out[bin] /= count as f32;
    }
}

/// Log compression followed by the perceptual weight.
pub(crate) fn apply_weighting(data: &mut [f32], weights: &[f32]) {
    for (value, &weight) in data.iter_mut().zip(weights) {
        *value = ((*value + 0.5).log10() + 0.31) * weight;
    }
}

/// Exponential moving average, quick to rise and slow to fall.
pub(crate) fn apply_averaging(current: &[f32], averaged: &mut [f32]) {
    for (avg, &value) in averaged.iter_mut().zip(current) {
        let alpha = if value > *avg { ATTACK } else { RELEASE };
        *avg = alpha * *avg + (1.0 - alpha) * value;
    }
}

/// Average each bin with its neighbours, over a wider span at low frequencies.
///
/// The sum is added onto `out`, which still holds last tick's normalized
/// result, so the display decays instead of jumping.
pub(crate) fn apply_smoothing(input: &[f32], out: &mut [f32]) {
    let size = input.len();
    for (i, slot) in out.iter_mut().enumerate().take(size) {
        let width = (((size - i) as f32 / size as f32) * 7.0) as usize + 2;
        let divisor = (width * 2) as f32;

        let mut sum = 0.0;
        for j in 0..width {
            if j <= i {
                sum += input[i - j] / divisor;
            }
            if i + j < size {
                sum += input[i + j] / divisor;
            }
        }
        *slot += sum;
    }
}

/// Raise `max` to the frame peak if needed, then scale by it.
pub(crate) fn normalize(data: &mut [f32], max: f32) -> f32 {
    let max = data.iter().copied().fold(max, f32::max);
    for value in data.iter_mut() {
        *value /= max;
    }
    max
}

/// RMS of the windowed input, scaled and smoothed against `prev`.
pub(crate) fn smooth_level(samples: &[f32], prev: f32) -> f32 {
    if samples.is_empty() {
        return prev;
    }
    let mean_square = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let level = mean_square.sqrt() * LEVEL_GAIN;
    let alpha = if level > prev { LEVEL_ATTACK } else { LEVEL_RELEASE };
    alpha * prev + (1.0 - alpha) * level
}

//! Circular sample store shared by the device callback and the analyzer
//!
//! One producer (the device callback) writes interleaved samples and then
//! publishes a writer/reader position pair; one consumer (the analyzer) picks
//! up the latest pair and reads samples behind it.
//!
//! - Sample cells are individual atomics, so the copy itself never takes a lock
//! - The position pair travels through a short `parking_lot::Mutex` section,
//!   which also orders the preceding sample stores before the consumer's reads
//! - Storage is allocated once for two channels; a mono stream uses half of it

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use super::AudioMode;

/// Largest channel count the storage is sized for
pub const MAX_CHANNELS: usize = 2;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Positions {
    writer_pos: usize,
    reader_pos: usize,
    new_data: bool,
}

/// Fixed-capacity interleaved sample buffer with a published cursor pair
#[derive(Debug)]
pub struct RingBuffer {
    samples: Box<[AtomicU32]>,
    /// Active size in samples; `<= samples.len()`
    active_len: AtomicUsize,
    positions: Mutex<Positions>,
}

impl RingBuffer {
    /// Allocate storage for `frames` frames of up to [`MAX_CHANNELS`] channels.
    pub fn new(frames: usize) -> Self {
        let capacity = frames * MAX_CHANNELS;
        let samples = (0..capacity)
            .map(|_| AtomicU32::new(0.0f32.to_bits()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            samples,
            active_len: AtomicUsize::new(capacity),
            positions: Mutex::new(Positions::default()),
        }
    }

    /// Allocated size in samples
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Active size in samples
    pub fn len(&self) -> usize {
        self.active_len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resize the active region for `channels` and fill everything with silence.
    ///
    /// Only call this while no device callback is running.
    pub fn reset(&self, channels: usize) {
        let channels = channels.clamp(1, MAX_CHANNELS);
        let active = self.capacity() / MAX_CHANNELS * channels;
        self.silence();
        self.active_len.store(active, Ordering::Release);
        *self.positions.lock() = Positions::default();
    }

    /// Zero every sample without touching the positions.
    pub fn silence(&self) {
        for cell in self.samples.iter() {
            cell.store(0.0f32.to_bits(), Ordering::Relaxed);
        }
    }

    /// Copy `data` in starting at `pos`, wrapping at the active size.
    ///
    /// Producer side. Allocation-free and lock-free; `data` must not be
    /// longer than the active size.
    pub fn write(&self, pos: usize, data: &[f32]) {
        let len = self.len();
        debug_assert!(data.len() <= len, "write larger than the ring buffer");
        if len == 0 {
            return;
        }

        let pos = pos % len;
        let tail = (len - pos).min(data.len());
        let (first, second) = data.split_at(tail);

        for (cell, &sample) in self.samples[pos..pos + tail].iter().zip(first) {
            cell.store(sample.to_bits(), Ordering::Relaxed);
        }
        for (cell, &sample) in self.samples[..second.len()].iter().zip(second) {
            cell.store(sample.to_bits(), Ordering::Relaxed);
        }
    }

    /// Sample at `index`, wrapped into the active region.
    #[inline]
    pub fn sample(&self, index: usize) -> f32 {
        let len = self.len();
        if len == 0 {
            return 0.0;
        }
        f32::from_bits(self.samples[index % len].load(Ordering::Relaxed))
    }

    /// Fill `dest` with consecutive samples starting at `pos`, wrapping.
    pub fn read_wrapped(&self, pos: usize, dest: &mut [f32]) {
        let len = self.len();
        if len == 0 {
            dest.fill(0.0);
            return;
        }
        let mut index = pos % len;
        for out in dest.iter_mut() {
            *out = f32::from_bits(self.samples[index].load(Ordering::Relaxed));
            index += 1;
            if index == len {
                index = 0;
            }
        }
    }

    /// Store a new position pair and raise the new-data flag.
    pub fn publish(&self, writer_pos: usize, reader_pos: usize) {
        let mut positions = self.positions.lock();
        positions.writer_pos = writer_pos;
        positions.reader_pos = reader_pos;
        positions.new_data = true;
    }

    /// Take the reader position if anything was published since the last call.
    pub fn try_consume(&self) -> Option<usize> {
        let mut positions = self.positions.lock();
        if positions.new_data {
            positions.new_data = false;
            Some(positions.reader_pos)
        } else {
            None
        }
    }

    /// Last published writer position (diagnostics only)
    pub fn writer_pos(&self) -> usize {
        self.positions.lock().writer_pos
    }
}

/// Where the consumer should read for a given writer position.
///
/// Playback trails the writer by `lag` samples so the analyzer only ever sees
/// audio that has already been decoded; capture has nothing to look ahead of.
pub fn reader_pos_for(mode: AudioMode, writer_pos: usize, lag: usize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    match mode {
        AudioMode::Playback => (writer_pos + len - lag % len) % len,
        AudioMode::Capture | AudioMode::Idle => writer_pos % len,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize, offset: f32) -> Vec<f32> {
        (0..len).map(|i| offset + i as f32).collect()
    }

    #[test]
    fn test_new_buffer_is_silent() {
        let rb = RingBuffer::new(16);
        assert_eq!(rb.capacity(), 32);
        assert_eq!(rb.len(), 32);
        let mut dest = vec![1.0; 32];
        rb.read_wrapped(0, &mut dest);
        assert!(dest.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_write_then_read_without_wrap() {
        let rb = RingBuffer::new(16);
        let data = ramp(8, 1.0);
        rb.write(4, &data);

        let mut dest = vec![0.0; 8];
        rb.read_wrapped(4, &mut dest);
        assert_eq!(dest, data);
    }

    #[test]
    fn test_wrapping_write_round_trips() {
        let rb = RingBuffer::new(16);
        let len = rb.len();
        for channels in [1usize, 2] {
            for frames in 1..=len / channels {
                let data = ramp(frames * channels, 100.0);
                for writer_pos in (0..len).step_by(channels) {
                    if writer_pos + data.len() <= len {
                        continue;
                    }
                    rb.write(writer_pos, &data);
                    let mut dest = vec![0.0; data.len()];
                    rb.read_wrapped(writer_pos, &mut dest);
                    assert_eq!(dest, data, "pos {writer_pos}, frames {frames}, channels {channels}");
                }
            }
        }
    }

    #[test]
    fn test_wrapping_write_lands_at_head() {
        let rb = RingBuffer::new(4);
        rb.write(6, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(rb.sample(6), 1.0);
        assert_eq!(rb.sample(7), 2.0);
        assert_eq!(rb.sample(0), 3.0);
        assert_eq!(rb.sample(1), 4.0);
    }

    #[test]
    fn test_reset_halves_for_mono_and_silences() {
        let rb = RingBuffer::new(16);
        rb.write(0, &[0.5; 32]);
        rb.publish(8, 4);

        rb.reset(1);
        assert_eq!(rb.len(), 16);
        assert_eq!(rb.try_consume(), None);
        let mut dest = vec![1.0; 32];
        rb.read_wrapped(0, &mut dest);
        assert!(dest.iter().all(|&s| s == 0.0));

        rb.reset(2);
        assert_eq!(rb.len(), 32);
    }

    #[test]
    fn test_publish_then_consume_once() {
        let rb = RingBuffer::new(16);
        assert_eq!(rb.try_consume(), None);

        rb.publish(12, 8);
        assert_eq!(rb.writer_pos(), 12);
        assert_eq!(rb.try_consume(), Some(8));
        assert_eq!(rb.try_consume(), None);

        rb.publish(14, 10);
        rb.publish(16, 12);
        assert_eq!(rb.try_consume(), Some(12));
    }

    #[test]
    fn test_playback_reader_trails_by_lag() {
        let len = 1000;
        let lag = 5 * 40 * 2;
        for writer_pos in (0..len).step_by(2) {
            let reader = reader_pos_for(AudioMode::Playback, writer_pos, lag, len);
            assert!(reader < len);
            assert_eq!((reader + lag) % len, writer_pos);
        }
    }

    #[test]
    fn test_capture_reader_matches_writer() {
        for writer_pos in [0, 2, 500, 998] {
            assert_eq!(reader_pos_for(AudioMode::Capture, writer_pos, 400, 1000), writer_pos);
        }
    }

    #[test]
    fn test_concurrent_publish_and_consume() {
        use std::sync::Arc;

        let rb = Arc::new(RingBuffer::new(64));
        let producer = {
            let rb = Arc::clone(&rb);
            std::thread::spawn(move || {
                let mut pos = 0;
                for value in 1..=200 {
                    rb.write(pos, &[value as f32; 8]);
                    rb.publish((pos + 8) % rb.len(), pos);
                    pos = (pos + 8) % rb.len();
                }
            })
        };

        let mut seen = 0;
        while seen < 50 {
            if let Some(reader) = rb.try_consume() {
                assert_eq!(reader % 8, 0);
                let mut dest = [0.0; 8];
                rb.read_wrapped(reader, &mut dest);
                assert!(dest.iter().all(|&s| s >= 1.0));
                seen += 1;
            }
            if producer.is_finished() {
                break;
            }
        }
        producer.join().unwrap();
    }
}

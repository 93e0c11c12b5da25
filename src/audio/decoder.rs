use log::{debug, info};
use rodio::{Decoder, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::track::Track;
use crate::{AudioError, Result};

/// Decode a whole audio file into memory as interleaved `f32` samples.
///
/// Any format rodio (and its symphonia codecs) understands is accepted. A file
/// that decodes to zero frames is an error, as is one that cannot be opened.
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<Track> {
    let path = path.as_ref();
    let decode_err = |reason: String| AudioError::Decode {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| decode_err(e.to_string()))?;
    let source = Decoder::new(BufReader::new(file)).map_err(|e| decode_err(e.to_string()))?;

    let channels = source.channels();
    let sample_rate = source.sample_rate();
    debug!("Decoding {:?}: {} channels at {} Hz", path, channels, sample_rate);

    if channels == 0 {
        return Err(decode_err("stream reports zero channels".into()));
    }

    let mut samples: Vec<f32> = source.convert_samples::<f32>().collect();
    samples.truncate(samples.len() - samples.len() % usize::from(channels));
    if samples.is_empty() {
        return Err(decode_err("no audio frames".into()));
    }

    let track = Track::new(path, samples, channels, sample_rate);
    info!(
        "Loaded audio file: {:?} ({}Hz, {} frames, {:.2}s)",
        path,
        sample_rate,
        track.frames(),
        track.length_secs()
    );
    Ok(track)
}

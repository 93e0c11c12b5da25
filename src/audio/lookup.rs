use super::config::AnalyzerConfig;

/// A single `[x, y]` point on a piecewise-linear curve.
pub type ControlPoint = [f32; 2];

/// Linear interpolation across control points sorted by increasing x.
///
/// Queries outside the covered range clamp to the nearest endpoint's y, so
/// the curve is never extrapolated.
pub fn interpolate(points: &[ControlPoint], x: f32) -> f32 {
    debug_assert!(!points.is_empty(), "control points must not be empty");
    debug_assert!(
        points.windows(2).all(|pair| pair[0][0] < pair[1][0]),
        "control points must be strictly increasing in x"
    );

    let [first_x, first_y] = points[0];
    if x < first_x {
        return first_y;
    }

    for pair in points.windows(2) {
        let [ax, ay] = pair[0];
        let [bx, by] = pair[1];
        if bx > x {
            let mix = (x - ax) / (bx - ax);
            return ay + (by - ay) * mix;
        }
    }

    points[points.len() - 1][1]
}

/// Upper frequency boundary (Hz) of every output bin.
///
/// `points` map a normalized bin position in `[0, 1]` to Hz.
pub fn frequency_table(points: &[ControlPoint], bins: usize) -> Vec<f32> {
    (0..bins)
        .map(|i| interpolate(points, i as f32 / bins as f32))
        .collect()
}

/// Linear gain for every bin, looked up from a dB curve keyed by frequency.
///
/// Dividing by 30 rather than 20 softens the correction.
pub fn weight_table(freqs: &[f32], points: &[ControlPoint]) -> Vec<f32> {
    freqs
        .iter()
        .map(|&freq| 10f32.powf(interpolate(points, freq) / 30.0))
        .collect()
}

/// Raised-cosine window, `0.54 * (1 - cos(2πn/N))`.
pub fn hamming_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|n| {
            let phase = 2.0 * std::f64::consts::PI * n as f64 / size as f64;
            (0.54 * (1.0 - phase.cos())) as f32
        })
        .collect()
}

/// The three immutable tables a spectrum analyzer is built around.
#[derive(Debug, Clone)]
pub struct SpectrumTables {
    pub freqs: Vec<f32>,
    pub weights: Vec<f32>,
    pub window: Vec<f32>,
}

impl SpectrumTables {
    pub fn build(config: &AnalyzerConfig) -> Self {
        let freqs = frequency_table(&config.freq_points, config.bin_count);
        let weights = weight_table(&freqs, &config.weight_points);
        let window = hamming_window(config.fft_size);

        Self {
            freqs,
            weights,
            window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const CURVE: [ControlPoint; 4] = [[0.0, 35.0], [0.2, 450.0], [0.5, 1700.0], [1.0, 20000.0]];

    #[test]
    fn test_interpolate_clamps_outside_range() {
        assert_eq!(interpolate(&CURVE, -1.0), 35.0);
        assert_eq!(interpolate(&CURVE, 1.5), 20000.0);
        assert_eq!(interpolate(&CURVE, f32::MAX), 20000.0);
    }

    #[test]
    fn test_interpolate_exact_at_control_points() {
        for [x, y] in CURVE {
            assert_eq!(interpolate(&CURVE, x), y);
        }
    }

    #[test]
    fn test_interpolate_between_points() {
        assert_relative_eq!(interpolate(&CURVE, 0.1), 242.5, epsilon = 1e-3);
        assert_relative_eq!(interpolate(&CURVE, 0.35), 1075.0, epsilon = 1e-3);
    }

    #[test]
    fn test_single_point_curve_is_constant() {
        let flat = [[10.0, 3.0]];
        assert_eq!(interpolate(&flat, 0.0), 3.0);
        assert_eq!(interpolate(&flat, 10.0), 3.0);
        assert_eq!(interpolate(&flat, 99.0), 3.0);
    }

    #[test]
    fn test_frequency_table_is_monotonic() {
        let freqs = frequency_table(&CURVE, 256);
        assert_eq!(freqs.len(), 256);
        assert_eq!(freqs[0], 35.0);
        assert!(freqs.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(*freqs.last().unwrap() < 20000.0);
    }

    #[test]
    fn test_weight_table_uses_softened_db() {
        let weights = weight_table(&[100.0, 1000.0, 4000.0], &[[100.0, -6.0], [1000.0, 0.0], [4000.0, 6.0]]);
        assert_relative_eq!(weights[0], 10f32.powf(-0.2), epsilon = 1e-6);
        assert_relative_eq!(weights[1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(weights[2], 10f32.powf(0.2), epsilon = 1e-6);
    }

    #[test]
    fn test_hamming_window_shape() {
        let window = hamming_window(8);
        assert_eq!(window.len(), 8);
        assert_relative_eq!(window[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(window[4], 1.08, epsilon = 1e-6);
        assert_relative_eq!(window[2], window[6], epsilon = 1e-6);
    }
}

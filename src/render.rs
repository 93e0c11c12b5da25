use std::fmt::Write;

const BLOCKS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Fold `bins` into `columns` values by taking the peak of each group.
pub fn fold_columns(bins: &[f32], columns: usize) -> Vec<f32> {
    if columns == 0 || bins.is_empty() {
        return Vec::new();
    }
    (0..columns)
        .map(|c| {
            let start = c * bins.len() / columns;
            let end = ((c + 1) * bins.len() / columns).max(start + 1).min(bins.len());
            bins[start..end].iter().copied().fold(0.0, f32::max)
        })
        .collect()
}

/// Multi-row bar chart of values in `[0, 1]`.
pub fn bars(values: &[f32], rows: usize) -> String {
    let mut out = String::new();
    for row in (0..rows).rev() {
        for &value in values {
            let height = value.clamp(0.0, 1.0) * rows as f32;
            let fill = ((height - row as f32) * 8.0).round().clamp(0.0, 8.0) as usize;
            out.push(BLOCKS[fill]);
        }
        out.push('\n');
    }
    out
}

/// Horizontal meter, `value` is clamped to `[0, max]`.
pub fn meter(label: &str, value: f32, max: f32, width: usize) -> String {
    let ratio = if max > 0.0 { (value / max).clamp(0.0, 1.0) } else { 0.0 };
    let filled = (ratio * width as f32).round() as usize;
    let mut out = String::with_capacity(label.len() + width + 16);
    let _ = write!(
        out,
        "{label:>6} [{}{}] {value:.2}",
        "#".repeat(filled),
        "-".repeat(width - filled)
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_takes_group_peak() {
        let bins = [0.1, 0.9, 0.2, 0.3, 0.5, 0.4];
        assert_eq!(fold_columns(&bins, 3), vec![0.9, 0.3, 0.5]);
    }

    #[test]
    fn test_fold_more_columns_than_bins() {
        let folded = fold_columns(&[0.5, 1.0], 4);
        assert_eq!(folded.len(), 4);
        assert_eq!(folded, vec![0.5, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn test_bars_shape() {
        let chart = bars(&[0.0, 1.0], 2);
        assert_eq!(chart, " █\n █\n");
    }

    #[test]
    fn test_meter_clamps() {
        assert_eq!(meter("lvl", 2.0, 1.0, 4), "   lvl [####] 2.00");
        assert_eq!(meter("lvl", 0.5, 1.0, 4), "   lvl [##--] 0.50");
    }
}

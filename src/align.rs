/// Resamples `source` to `target_len` entries by nearest-index mapping:
/// target position `k` reads source index `round(k * (S-1) / (L-1))`, with a
/// single-entry target reading index 0. Endpoints map exactly, interior
/// positions approximately, so transition shape is preserved rather than
/// exact timing.
pub fn resample_nearest(source: &[String], target_len: usize) -> Vec<String> {
    if source.is_empty() || target_len == 0 {
        return Vec::new();
    }
    if source.len() == target_len {
        return source.to_vec();
    }

    let last_source = (source.len() - 1) as f64;

    (0..target_len)
        .map(|position| {
            let index = if target_len == 1 {
                0
            } else {
                let scaled = position as f64 * last_source / (target_len - 1) as f64;
                scaled.round() as usize
            };
            source[index].clone()
        })
        .collect()
}

/// Reconciles two sequences to a common length for pointwise comparison.
/// Equal lengths pass through unchanged; otherwise the shorter sequence is
/// stretched to the longer one's length. The longer sequence is never
/// truncated.
pub fn align_lengths(
    predicted: Vec<String>,
    actual: Vec<String>,
) -> (Vec<String>, Vec<String>, bool) {
    if predicted.len() == actual.len() {
        return (predicted, actual, false);
    }

    if predicted.len() < actual.len() {
        let stretched = resample_nearest(&predicted, actual.len());
        (stretched, actual, true)
    } else {
        let stretched = resample_nearest(&actual, predicted.len());
        (predicted, stretched, true)
    }
}

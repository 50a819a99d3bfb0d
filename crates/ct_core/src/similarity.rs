//! Change magnitude as a percentage: 100 for identical text, near 0 for text
//! with nothing in common.

/// Normalized Levenshtein similarity over characters, scaled to `[0, 100]`
/// and rounded to `decimals` places.
pub fn similarity_with_precision(previous: &str, current: &str, decimals: u32) -> f64 {
    if previous == current {
        return 100.0;
    }
    let ratio = strsim::normalized_levenshtein(previous, current);
    round_to(ratio * 100.0, decimals).clamp(0.0, 100.0)
}

pub fn similarity(previous: &str, current: &str) -> f64 {
    similarity_with_precision(previous, current, 2)
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

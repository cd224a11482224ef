//! Block loudness and BS.1770 gating math.
//!
//! Loudness values travel as LUFS; averaging always happens in the energy
//! domain (`E = 10^((L + 0.691) / 10)`) and converts back at the end.

/// Blocks below this absolute level never contribute to integrated loudness.
pub const ABSOLUTE_GATE_LUFS: f64 = -70.0;
/// Relative gate: blocks more than this far below the provisional program
/// loudness are discarded.
pub const RELATIVE_GATE_LU: f64 = 10.0;
/// Gating block length.
pub const BLOCK_SIZE_MS: f64 = 400.0;
/// Gating block overlap (hop = block × 0.25).
pub const BLOCK_OVERLAP: f64 = 0.75;
/// Short-term loudness window.
pub const SHORT_TERM_WINDOW_MS: f64 = 3000.0;
/// Momentary loudness window.
pub const MOMENTARY_WINDOW_MS: f64 = 400.0;

/// Energy (summed per-channel mean square) to LUFS. Zero energy is silence.
#[inline]
pub(crate) fn loudness_from_energy(energy: f64) -> f64 {
    if energy > 0.0 {
        -0.691 + 10.0 * energy.log10()
    } else {
        f64::NEG_INFINITY
    }
}

/// LUFS back to the energy domain.
#[inline]
pub(crate) fn energy_from_loudness(lufs: f64) -> f64 {
    10.0_f64.powf((lufs + 0.691) / 10.0)
}

/// Energy-domain mean of a set of block loudness values, as LUFS.
fn mean_loudness(blocks: &[f64]) -> f64 {
    if blocks.is_empty() {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = blocks.iter().map(|&l| energy_from_loudness(l)).sum();
    loudness_from_energy(sum / blocks.len() as f64)
}

/// Integrated loudness without gating: energy mean of all finite blocks.
pub(crate) fn ungated_loudness(blocks: &[f64]) -> f64 {
    let finite: Vec<f64> = blocks.iter().copied().filter(|l| l.is_finite()).collect();
    mean_loudness(&finite)
}

/// Integrated loudness with absolute and relative gating applied.
///
/// An empty gated set means "no measurable loudness" and yields `-inf`.
pub(crate) fn gated_loudness(blocks: &[f64]) -> f64 {
    let mut survivors: Vec<f64> = blocks
        .iter()
        .copied()
        .filter(|&l| l.is_finite() && l >= ABSOLUTE_GATE_LUFS)
        .collect();
    if survivors.is_empty() {
        return f64::NEG_INFINITY;
    }

    let relative_threshold = mean_loudness(&survivors) - RELATIVE_GATE_LU;
    survivors.retain(|&l| l >= relative_threshold);
    mean_loudness(&survivors)
}

/// Loudness range from a short-term series: 95th minus 10th percentile of
/// the values above the absolute gate. Returns `(range, p10, p95)`.
pub(crate) fn loudness_range(short_term: &[f64]) -> Option<(f64, f64, f64)> {
    let mut values: Vec<f64> = short_term
        .iter()
        .copied()
        .filter(|&l| l.is_finite() && l > ABSOLUTE_GATE_LUFS)
        .collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).expect("finite values"));

    let p10 = values[(values.len() as f64 * 0.10).floor() as usize];
    let p95_index = ((values.len() as f64 * 0.95).floor() as usize).min(values.len() - 1);
    let p95 = values[p95_index];

    Some((p95 - p10, p10, p95))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_energy_loudness_roundtrip() {
        for &lufs in &[-70.0, -23.0, -0.691, 0.0] {
            assert_relative_eq!(
                loudness_from_energy(energy_from_loudness(lufs)),
                lufs,
                epsilon = 1e-9
            );
        }
        assert_eq!(loudness_from_energy(0.0), f64::NEG_INFINITY);
    }

    #[test]
    fn test_gated_loudness_of_uniform_blocks() {
        let blocks = vec![-23.0; 20];
        assert_relative_eq!(gated_loudness(&blocks), -23.0, epsilon = 1e-9);
    }

    #[test]
    fn test_absolute_gate_discards_quiet_blocks() {
        let mut blocks = vec![-23.0; 20];
        blocks.extend(vec![-90.0; 50]);
        assert_relative_eq!(gated_loudness(&blocks), -23.0, epsilon = 1e-9);
    }

    #[test]
    fn test_relative_gate_discards_soft_passages() {
        // -60 LUFS blocks pass the absolute gate but sit far below the
        // provisional level of a -20 LUFS program.
        let mut blocks = vec![-20.0; 20];
        blocks.extend(vec![-60.0; 5]);
        assert_relative_eq!(gated_loudness(&blocks), -20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_gating_is_monotonic_in_quiet_blocks() {
        let loud = vec![-18.0; 30];
        let baseline = gated_loudness(&loud);
        for quiet_count in [1usize, 10, 100] {
            let mut blocks = loud.clone();
            blocks.extend(vec![-65.0; quiet_count]);
            assert!(
                gated_loudness(&blocks) <= baseline + 1e-12,
                "adding {quiet_count} quiet blocks raised integrated loudness"
            );
        }
    }

    #[test]
    fn test_empty_or_silent_blocks_yield_neg_infinity() {
        assert_eq!(gated_loudness(&[]), f64::NEG_INFINITY);
        assert_eq!(
            gated_loudness(&[f64::NEG_INFINITY, -90.0]),
            f64::NEG_INFINITY
        );
        assert_eq!(ungated_loudness(&[]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_loudness_range_percentiles() {
        // 100 short-term values spread evenly from -40 to -20.
        let series: Vec<f64> = (0..100).map(|i| -40.0 + 0.2 * i as f64).collect();
        let (range, p10, p95) = loudness_range(&series).unwrap();
        assert_relative_eq!(p10, -38.0, epsilon = 1e-9);
        assert_relative_eq!(p95, -21.0, epsilon = 1e-9);
        assert_relative_eq!(range, 17.0, epsilon = 1e-9);
    }

    #[test]
    fn test_loudness_range_of_silence_is_none() {
        assert!(loudness_range(&[f64::NEG_INFINITY, -80.0]).is_none());
        assert!(loudness_range(&[]).is_none());
    }
}

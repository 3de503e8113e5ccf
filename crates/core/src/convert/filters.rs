//! Filter chain derivation for tempo and pitch adjustment.
//!
//! The converter's playback-rate filter is only reliable for factors in
//! `[0.5, 2.0]`. Larger or smaller factors are decomposed into a run of
//! identical stages whose product equals the requested factor. Pitch shift is
//! done by resampling at `new_sample_rate` and declaring the original rate on
//! the output, appended as the two final stages.

use super::error::PipelineError;

/// Playback-rate factors the tempo filter handles in a single stage.
const TEMPO_STAGE_MIN: f64 = 0.5;
const TEMPO_STAGE_MAX: f64 = 2.0;

/// Largest number of decomposed tempo stages tried.
const MAX_TEMPO_STAGES: u32 = 9;

/// One stage of the conversion filter chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterStage {
    /// Playback-rate change; the factor is preformatted so chains are
    /// reproducible byte-for-byte.
    Atempo(String),
    /// Declare the stream's sample rate, in Hz.
    Asetrate(u32),
    /// Resample to the given rate, in Hz.
    Aresample(u32),
}

impl FilterStage {
    /// Renders this stage in the converter's `name=value` syntax.
    pub fn render(&self) -> String {
        match self {
            FilterStage::Atempo(value) => format!("atempo={}", value),
            FilterStage::Asetrate(hz) => format!("asetrate={}", hz),
            FilterStage::Aresample(hz) => format!("aresample={}", hz),
        }
    }

    /// The tempo factor, if this is a tempo stage.
    pub fn tempo_value(&self) -> Option<f64> {
        match self {
            FilterStage::Atempo(value) => value.parse().ok(),
            _ => None,
        }
    }
}

/// Renders a full chain in the converter's comma-separated syntax.
pub fn render_filter_chain(stages: &[FilterStage]) -> String {
    stages
        .iter()
        .map(|s| s.render())
        .collect::<Vec<_>>()
        .join(",")
}

/// Derives the ordered filter chain for a tempo/pitch conversion.
///
/// `new_sample_rate` is the pitch-shifted rate (original rate times the pitch
/// scale factor, rounded to integer Hz). Tempo factors inside `[0.5, 2.0]`
/// produce a single stage formatted to 3 decimals; factors outside are split
/// into the smallest run of `n` identical stages (2 ≤ n ≤ 9) whose per-stage
/// factor `tempo_scaler^(1/n)` lands inside that window, each formatted to 4
/// decimals. Factors that cannot be decomposed within 9 stages are rejected.
pub fn derive_filter_chain(
    tempo_scaler: f64,
    orig_sample_rate: u32,
    new_sample_rate: u32,
) -> Result<Vec<FilterStage>, PipelineError> {
    if !tempo_scaler.is_finite() || tempo_scaler <= 0.0 {
        return Err(PipelineError::invalid_parameter(
            "tempo scale factor must be positive",
        ));
    }
    if orig_sample_rate == 0 || new_sample_rate == 0 {
        return Err(PipelineError::invalid_parameter(
            "sample rate must be positive",
        ));
    }

    let mut stages = Vec::new();

    if (TEMPO_STAGE_MIN..=TEMPO_STAGE_MAX).contains(&tempo_scaler) {
        stages.push(FilterStage::Atempo(format!("{:.3}", tempo_scaler)));
    } else {
        let decomposed = (2..=MAX_TEMPO_STAGES).find_map(|n| {
            let r = tempo_scaler.powf(1.0 / f64::from(n));
            (TEMPO_STAGE_MIN..=TEMPO_STAGE_MAX)
                .contains(&r)
                .then_some((n, r))
        });

        let Some((n, r)) = decomposed else {
            return Err(PipelineError::invalid_parameter(
                "tempo scale factor is too large",
            ));
        };

        let value = format!("{:.4}", r);
        for _ in 0..n {
            stages.push(FilterStage::Atempo(value.clone()));
        }
    }

    stages.push(FilterStage::Asetrate(new_sample_rate));
    stages.push(FilterStage::Aresample(orig_sample_rate));

    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempo_stages(stages: &[FilterStage]) -> Vec<f64> {
        stages.iter().filter_map(|s| s.tempo_value()).collect()
    }

    #[test]
    fn test_single_stage_within_window() {
        for tempo in [0.5, 0.75, 1.0, 1.1, 1.25, 1.999, 2.0] {
            let stages = derive_filter_chain(tempo, 44100, 55125).unwrap();
            let tempos = tempo_stages(&stages);
            assert_eq!(tempos.len(), 1, "tempo {} should be one stage", tempo);
            // One stage, rounded to 3 decimals.
            assert!((tempos[0] - tempo).abs() < 0.0005);
        }
    }

    #[test]
    fn test_single_stage_golden_formatting() {
        let stages = derive_filter_chain(1.1, 44100, 48510).unwrap();
        assert_eq!(stages[0].render(), "atempo=1.100");

        let stages = derive_filter_chain(2.0, 44100, 44100).unwrap();
        assert_eq!(stages[0].render(), "atempo=2.000");
    }

    #[test]
    fn test_decomposition_above_window() {
        // 4.0 splits into exactly two stages of 2.0.
        let stages = derive_filter_chain(4.0, 44100, 44100).unwrap();
        let tempos = tempo_stages(&stages);
        assert_eq!(tempos.len(), 2);
        assert_eq!(stages[0].render(), "atempo=2.0000");
        assert_eq!(stages[0], stages[1]);

        // 3.0 splits into two stages of sqrt(3).
        let stages = derive_filter_chain(3.0, 44100, 44100).unwrap();
        let tempos = tempo_stages(&stages);
        assert_eq!(tempos.len(), 2);
        assert_eq!(stages[0].render(), "atempo=1.7321");
    }

    #[test]
    fn test_decomposition_below_window() {
        // 0.25 splits into exactly two stages of 0.5.
        let stages = derive_filter_chain(0.25, 44100, 44100).unwrap();
        assert_eq!(tempo_stages(&stages).len(), 2);
        assert_eq!(stages[0].render(), "atempo=0.5000");

        // 0.4 needs two stages of ~0.6325.
        let stages = derive_filter_chain(0.4, 44100, 44100).unwrap();
        assert_eq!(tempo_stages(&stages).len(), 2);
        assert_eq!(stages[0].render(), "atempo=0.6325");
    }

    #[test]
    fn test_decomposed_product_recovers_input() {
        for tempo in [0.05, 0.25, 0.4, 2.5, 4.0, 7.3, 10.0] {
            let stages = derive_filter_chain(tempo, 44100, 44100).unwrap();
            let tempos = tempo_stages(&stages);
            assert!(tempos.len() >= 2);
            let r = tempos[0];
            assert!(
                (TEMPO_STAGE_MIN..=TEMPO_STAGE_MAX).contains(&r),
                "per-stage factor {} out of window",
                r
            );
            let product: f64 = tempos.iter().product();
            // r is rounded to 4 decimals, so the product drifts a little.
            assert!(
                (product - tempo).abs() / tempo < 0.01,
                "product {} does not recover {}",
                product,
                tempo
            );
        }
    }

    #[test]
    fn test_non_decomposable_rejected() {
        // 0.001^(1/9) is still below 0.5, so no stage count works.
        let err = derive_filter_chain(0.001, 44100, 44100).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter { .. }));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(derive_filter_chain(0.0, 44100, 44100).is_err());
        assert!(derive_filter_chain(-1.0, 44100, 44100).is_err());
        assert!(derive_filter_chain(f64::NAN, 44100, 44100).is_err());
        assert!(derive_filter_chain(1.0, 0, 44100).is_err());
        assert!(derive_filter_chain(1.0, 44100, 0).is_err());
    }

    #[test]
    fn test_pitch_stages_appended_in_order() {
        let stages = derive_filter_chain(1.1, 44100, 55125).unwrap();
        let n = stages.len();
        assert_eq!(stages[n - 2], FilterStage::Asetrate(55125));
        assert_eq!(stages[n - 1], FilterStage::Aresample(44100));
    }

    #[test]
    fn test_render_chain() {
        let stages = derive_filter_chain(1.1, 44100, 48510).unwrap();
        assert_eq!(
            render_filter_chain(&stages),
            "atempo=1.100,asetrate=48510,aresample=44100"
        );

        let stages = derive_filter_chain(4.0, 44100, 55125).unwrap();
        assert_eq!(
            render_filter_chain(&stages),
            "atempo=2.0000,atempo=2.0000,asetrate=55125,aresample=44100"
        );
    }
}

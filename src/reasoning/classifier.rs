//! Threshold Classifier
//!
//! Maps one raw value to a semantic state using an ordered list of bands.
//! Bands are tried in declaration order and the first match wins. When the
//! signal's previous state names a declared band and the value is still
//! within the hysteresis margin of that band, the previous state is kept.
//!
//! Classification is total: non-finite values, empty profiles and values no
//! band covers all yield the reserved `unknown` state.

use crate::types::{SemanticState, StateBand, ThresholdProfile};

/// Outcome of classifying one value.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub state: SemanticState,
    /// Index of the band behind `state` (`None` for `unknown`)
    pub band_index: Option<usize>,
    /// `state` is the previous state, kept by hysteresis
    pub retained_by_hysteresis: bool,
}

impl Classification {
    fn unknown() -> Self {
        Self {
            state: SemanticState::unknown(),
            band_index: None,
            retained_by_hysteresis: false,
        }
    }

    fn band(index: usize, band: &StateBand, retained: bool) -> Self {
        Self {
            state: SemanticState::new(band.name.clone()),
            band_index: Some(index),
            retained_by_hysteresis: retained,
        }
    }
}

/// Stateless band classifier. Holds only the engine-wide hysteresis default.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdClassifier {
    default_hysteresis_fraction: f64,
}

impl ThresholdClassifier {
    pub fn new(default_hysteresis_fraction: f64) -> Self {
        Self {
            default_hysteresis_fraction,
        }
    }

    /// Classify `raw_value` against `profile`, given the signal's previous state.
    pub fn classify(
        &self,
        profile: &ThresholdProfile,
        raw_value: f64,
        previous: Option<&SemanticState>,
    ) -> Classification {
        if !raw_value.is_finite() || profile.states.is_empty() {
            return Classification::unknown();
        }

        let candidate = profile
            .states
            .iter()
            .enumerate()
            .find(|(_, band)| band.contains(raw_value));

        let held = previous
            .filter(|state| !state.is_unknown())
            .and_then(|state| profile.band(state));

        if let Some((prev_idx, prev_band)) = held {
            if candidate.map(|(idx, _)| idx) == Some(prev_idx) {
                return Classification::band(prev_idx, prev_band, false);
            }
            let margin = self.margin(profile, prev_band, candidate.map(|(_, b)| b), raw_value);
            if prev_band.distance(raw_value) <= margin {
                return Classification::band(prev_idx, prev_band, true);
            }
        }

        match candidate {
            Some((idx, band)) => Classification::band(idx, band, false),
            None => Classification::unknown(),
        }
    }

    /// Hysteresis margin around the previously held band, in signal units.
    pub fn margin(
        &self,
        profile: &ThresholdProfile,
        previous: &StateBand,
        candidate: Option<&StateBand>,
        raw_value: f64,
    ) -> f64 {
        if let Some(absolute) = profile.hysteresis_absolute {
            return sanitize(absolute);
        }

        let fraction = profile
            .hysteresis_fraction
            .unwrap_or(self.default_hysteresis_fraction);

        let reference = previous
            .width()
            .filter(|w| w.is_finite())
            .or_else(|| candidate.and_then(StateBand::width).filter(|w| w.is_finite()))
            .or_else(|| previous.bound_magnitude(raw_value))
            .unwrap_or(0.0);

        sanitize(fraction * reference)
    }
}

fn sanitize(margin: f64) -> f64 {
    if margin.is_finite() && margin > 0.0 {
        margin
    } else {
        0.0
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Candidate extraction from the drift plane.
//!
//! A protohit is a detection in grid coordinates, before physical units are
//! attached. Two extraction methods are available: thresholding followed by
//! connected components (robust for spread-out signals) and strict local
//! maxima (cheap, good for sharp tones). Both normalize against a
//! drift-aware noise estimate: the variance of a trajectory sum scales
//! linearly with the number of independent samples summed, i.e. with
//! `integration_steps * desmeared_bins[d]`.

pub(crate) mod connected_components;
pub(crate) mod local_maxima;
#[cfg(test)]
mod tests;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::plane::FrequencyDriftPlane;
use super::{HitSearchMethod, HitSearchOptions};
use crate::flagging::RfiCounts;
use crate::noise::NoiseStats;

/// A cell of the drift plane.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FreqDriftCoord {
    /// Row (drift-rate) index.
    pub drift_index: usize,
    /// Column (frequency-channel) index.
    pub frequency_channel: usize,
}

/// A candidate signal in drift-plane grid coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Protohit {
    /// The brightest cell.
    pub index_max: FreqDriftCoord,
    /// The rounded centroid of the detection; equals `index_max` for
    /// local-maxima detections.
    pub index_center: FreqDriftCoord,
    /// SNR of the peak against the drift-adjusted noise.
    pub snr: f32,
    /// Raw integrated power at the peak.
    pub max_integration: f32,
    /// `sqrt` of the drift-adjusted noise at the peak's row.
    pub desmeared_noise: f32,
    /// Width of the detection in frequency bins at the peak's drift row.
    pub binwidth: usize,
    /// Every member cell; empty for local-maxima detections.
    pub locations: Vec<FreqDriftCoord>,
    /// Flag tallies over the detection (elementwise maxima across member
    /// cells).
    pub rfi_counts: RfiCounts,
}

/// Per-drift-row noise power, scaled for the number of samples summed into
/// each cell of that row.
pub(crate) fn integration_adjusted_noise(
    noise_estimate: &NoiseStats,
    plane: &FrequencyDriftPlane,
) -> Vec<f32> {
    let steps = plane.integration_steps() as f32;
    plane
        .drift_rates()
        .iter()
        .map(|rate| noise_estimate.noise_power() * steps * rate.desmeared_bins as f32)
        .collect()
}

/// Run the configured extraction method over a drift plane.
pub(crate) fn protohit_search(
    plane: &FrequencyDriftPlane,
    noise_estimate: &NoiseStats,
    options: &HitSearchOptions,
) -> Vec<Protohit> {
    let noise_per_drift = integration_adjusted_noise(noise_estimate, plane);
    match options.method {
        HitSearchMethod::ConnectedComponents => {
            connected_components::find_components_above_threshold(
                plane.power(),
                plane.rfi(),
                noise_estimate.noise_floor(),
                &noise_per_drift,
                options.snr_threshold,
                options.neighbor_l1_dist,
            )
        }
        HitSearchMethod::LocalMaxima => local_maxima::find_local_maxima_above_threshold(
            plane.power(),
            plane.rfi(),
            noise_estimate.noise_floor(),
            &noise_per_drift,
            options.snr_threshold,
            options.neighbor_l1_dist,
        ),
    }
}

/// The offsets of every cell within L1 distance `dist`, excluding the
/// origin.
pub(crate) fn l1_neighborhood(dist: usize) -> Vec<(i64, i64)> {
    let dist = dist as i64;
    (-dist..=dist)
        .cartesian_product(-dist..=dist)
        .filter(|&(dd, df)| dd.abs() + df.abs() <= dist && (dd, df) != (0, 0))
        .collect()
}

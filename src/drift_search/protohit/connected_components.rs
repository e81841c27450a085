// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Threshold-and-cluster extraction.
//!
//! Cells whose SNR against the drift-adjusted noise exceeds the threshold
//! form a binary mask; connected components of that mask (under L1-ball
//! connectivity) each become one protohit.

use ndarray::Array2;

use super::{l1_neighborhood, FreqDriftCoord, Protohit};
use crate::flagging::IntegratedFlags;

/// Find all connected components of above-threshold cells and summarize
/// each into a protohit.
pub(crate) fn find_components_above_threshold(
    doppler_spectrum: &Array2<f32>,
    dedrifted_rfi: &IntegratedFlags,
    noise_floor: f32,
    noise_per_drift: &[f32],
    snr_threshold: f32,
    neighbor_l1_dist: usize,
) -> Vec<Protohit> {
    let (ndrifts, nchans) = doppler_spectrum.dim();
    assert_eq!(
        ndrifts,
        noise_per_drift.len(),
        "drift plane has {ndrifts} rows but {} noise entries",
        noise_per_drift.len()
    );

    let noise_amplitude_per_drift: Vec<f32> =
        noise_per_drift.iter().map(|noise| noise.sqrt()).collect();
    let above = |d: usize, f: usize| {
        (doppler_spectrum[(d, f)] - noise_floor) / noise_amplitude_per_drift[d] > snr_threshold
    };

    let neighborhood = l1_neighborhood(neighbor_l1_dist);
    let mut visited = Array2::<bool>::from_elem((ndrifts, nchans), false);
    let mut components = vec![];

    for seed_d in 0..ndrifts {
        for seed_f in 0..nchans {
            if visited[(seed_d, seed_f)] || !above(seed_d, seed_f) {
                continue;
            }

            // Flood-fill one component.
            let mut members = vec![];
            let mut stack = vec![FreqDriftCoord {
                drift_index: seed_d,
                frequency_channel: seed_f,
            }];
            visited[(seed_d, seed_f)] = true;

            while let Some(cell) = stack.pop() {
                members.push(cell);
                for &(dd, df) in &neighborhood {
                    let d = cell.drift_index as i64 + dd;
                    let f = cell.frequency_channel as i64 + df;
                    if d < 0 || d >= ndrifts as i64 || f < 0 || f >= nchans as i64 {
                        continue;
                    }
                    let (d, f) = (d as usize, f as usize);
                    if !visited[(d, f)] && above(d, f) {
                        visited[(d, f)] = true;
                        stack.push(FreqDriftCoord {
                            drift_index: d,
                            frequency_channel: f,
                        });
                    }
                }
            }

            components.push(summarize_component(
                members,
                doppler_spectrum,
                dedrifted_rfi,
                noise_floor,
                &noise_amplitude_per_drift,
            ));
        }
    }

    components
}

fn summarize_component(
    members: Vec<FreqDriftCoord>,
    doppler_spectrum: &Array2<f32>,
    dedrifted_rfi: &IntegratedFlags,
    noise_floor: f32,
    noise_amplitude_per_drift: &[f32],
) -> Protohit {
    // Peak cell; power ties resolve to the lexicographically lower (d, f)
    // so all backends agree.
    let mut index_max = members[0];
    let mut max_integration = doppler_spectrum[(index_max.drift_index, index_max.frequency_channel)];
    let mut rfi_counts = dedrifted_rfi.counts_at(index_max.drift_index, index_max.frequency_channel);
    let mut drift_sum = 0_usize;
    let mut channel_sum = 0_usize;

    for &cell in &members {
        let power = doppler_spectrum[(cell.drift_index, cell.frequency_channel)];
        let lower_coord = (cell.drift_index, cell.frequency_channel)
            < (index_max.drift_index, index_max.frequency_channel);
        if power > max_integration || (power == max_integration && lower_coord) {
            max_integration = power;
            index_max = cell;
        }
        rfi_counts = rfi_counts
            .max_with(dedrifted_rfi.counts_at(cell.drift_index, cell.frequency_channel));
        drift_sum += cell.drift_index;
        channel_sum += cell.frequency_channel;
    }

    let n = members.len() as f64;
    let index_center = FreqDriftCoord {
        drift_index: (drift_sum as f64 / n).round() as usize,
        frequency_channel: (channel_sum as f64 / n).round() as usize,
    };

    // Width in frequency bins of the component at the peak's drift row.
    let (min_f, max_f) = members
        .iter()
        .filter(|cell| cell.drift_index == index_max.drift_index)
        .fold((usize::MAX, 0), |(lo, hi), cell| {
            (lo.min(cell.frequency_channel), hi.max(cell.frequency_channel))
        });
    let binwidth = max_f - min_f + 1;

    let desmeared_noise = noise_amplitude_per_drift[index_max.drift_index];
    Protohit {
        index_max,
        index_center,
        snr: (max_integration - noise_floor) / desmeared_noise,
        max_integration,
        desmeared_noise,
        binwidth,
        locations: members,
        rfi_counts,
    }
}

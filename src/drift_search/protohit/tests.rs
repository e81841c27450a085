// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::Array2;

use super::*;
use crate::drift_search::plane::DriftRate;
use crate::drift_search::{HitSearchMethod, HitSearchOptions};
use crate::flagging::IntegratedFlags;
use crate::noise::NoiseStats;

/// A plane of `ndrifts` unit-desmear rows over zeroed power.
fn empty_plane(ndrifts: usize, nchans: usize) -> FrequencyDriftPlane {
    let drift_rates = (0..ndrifts)
        .map(|index| DriftRate {
            index_in_plane: index,
            slope: 0.0,
            rate_hz_per_sec: index as f64,
            channel_span: 0,
            desmeared_bins: 1,
        })
        .collect();
    FrequencyDriftPlane::new(
        Array2::zeros((ndrifts, nchans)),
        IntegratedFlags::zeros(ndrifts, nchans),
        1,
        drift_rates,
    )
}

fn plane_with_power(ndrifts: usize, nchans: usize, cells: &[(usize, usize, f32)]) -> FrequencyDriftPlane {
    let plane = empty_plane(ndrifts, nchans);
    let mut power = plane.power().clone();
    for &(d, f, value) in cells {
        power[(d, f)] = value;
    }
    FrequencyDriftPlane::new(
        power,
        plane.rfi().clone(),
        plane.integration_steps(),
        plane.drift_rates().to_vec(),
    )
}

#[test]
fn adjusted_noise_scales_with_integration_length_and_desmear_width() {
    let drift_rates = vec![
        DriftRate {
            index_in_plane: 0,
            slope: 0.0,
            rate_hz_per_sec: 0.0,
            channel_span: 0,
            desmeared_bins: 1,
        },
        DriftRate {
            index_in_plane: 1,
            slope: 3.0,
            rate_hz_per_sec: 3.0,
            channel_span: 45,
            desmeared_bins: 3,
        },
    ];
    let plane = FrequencyDriftPlane::new(
        Array2::zeros((2, 4)),
        IntegratedFlags::zeros(2, 4),
        16,
        drift_rates,
    );
    let noise = NoiseStats::new(0.5, 2.0);

    let adjusted = integration_adjusted_noise(&noise, &plane);
    assert_abs_diff_eq!(adjusted[0], 2.0 * 16.0 * 1.0);
    assert_abs_diff_eq!(adjusted[1], 2.0 * 16.0 * 3.0);
}

#[test]
fn adjacent_cells_merge_into_one_component() {
    // Two adjacent above-threshold cells merge under L1 distance 1; the
    // brighter one is the peak and the width at its row is 2 bins.
    let plane = plane_with_power(8, 200, &[(3, 100, 50.0), (3, 101, 40.0)]);
    let noise = NoiseStats::new(0.0, 1.0);
    let options = HitSearchOptions {
        method: HitSearchMethod::ConnectedComponents,
        snr_threshold: 10.0,
        neighbor_l1_dist: 1,
    };

    let protohits = protohit_search(&plane, &noise, &options);
    assert_eq!(protohits.len(), 1);
    let p = &protohits[0];
    assert_eq!(
        p.index_max,
        FreqDriftCoord {
            drift_index: 3,
            frequency_channel: 100
        }
    );
    assert_eq!(p.binwidth, 2);
    assert_eq!(p.locations.len(), 2);
    assert_abs_diff_eq!(p.max_integration, 50.0);
    assert_abs_diff_eq!(p.snr, 50.0);
}

#[test]
fn cells_beyond_the_neighborhood_stay_separate() {
    let plane = plane_with_power(8, 200, &[(3, 100, 50.0), (3, 104, 40.0)]);
    let noise = NoiseStats::new(0.0, 1.0);
    let options = HitSearchOptions {
        method: HitSearchMethod::ConnectedComponents,
        snr_threshold: 10.0,
        neighbor_l1_dist: 1,
    };
    let protohits = protohit_search(&plane, &noise, &options);
    assert_eq!(protohits.len(), 2);
}

#[test]
fn component_centroid_is_the_rounded_mean() {
    let plane = plane_with_power(
        8,
        200,
        &[(3, 100, 50.0), (3, 101, 40.0), (4, 101, 30.0)],
    );
    let noise = NoiseStats::new(0.0, 1.0);
    let options = HitSearchOptions {
        method: HitSearchMethod::ConnectedComponents,
        snr_threshold: 10.0,
        neighbor_l1_dist: 1,
    };
    let protohits = protohit_search(&plane, &noise, &options);
    assert_eq!(protohits.len(), 1);
    // Means: drift (3+3+4)/3 = 3.33 -> 3, channel (100+101+101)/3 = 100.67 -> 101.
    assert_eq!(
        protohits[0].index_center,
        FreqDriftCoord {
            drift_index: 3,
            frequency_channel: 101
        }
    );
}

#[test]
fn component_rfi_counts_are_elementwise_maxima() {
    let mut rfi = IntegratedFlags::zeros(8, 200);
    rfi.sigma_clip[(3, 100)] = 5;
    rfi.sigma_clip[(3, 101)] = 9;
    rfi.low_spectral_kurtosis[(3, 100)] = 2;
    let base = plane_with_power(8, 200, &[(3, 100, 50.0), (3, 101, 40.0)]);
    let plane = FrequencyDriftPlane::new(
        base.power().clone(),
        rfi,
        base.integration_steps(),
        base.drift_rates().to_vec(),
    );

    let noise = NoiseStats::new(0.0, 1.0);
    let options = HitSearchOptions {
        method: HitSearchMethod::ConnectedComponents,
        snr_threshold: 10.0,
        neighbor_l1_dist: 1,
    };
    let protohits = protohit_search(&plane, &noise, &options);
    assert_eq!(protohits.len(), 1);
    assert_eq!(protohits[0].rfi_counts.sigma_clip, 9);
    assert_eq!(protohits[0].rfi_counts.low_spectral_kurtosis, 2);
    assert_eq!(protohits[0].rfi_counts.high_spectral_kurtosis, 0);
}

#[test]
fn threshold_respects_the_per_row_noise_adjustment() {
    // Same power in two rows; the desmeared row has 4x the noise power, so
    // its SNR halves and falls below threshold.
    let drift_rates = vec![
        DriftRate {
            index_in_plane: 0,
            slope: 0.0,
            rate_hz_per_sec: 0.0,
            channel_span: 0,
            desmeared_bins: 1,
        },
        DriftRate {
            index_in_plane: 1,
            slope: 4.0,
            rate_hz_per_sec: 4.0,
            channel_span: 4,
            desmeared_bins: 4,
        },
    ];
    let mut power = Array2::zeros((2, 50));
    power[(0, 25)] = 15.0;
    power[(1, 25)] = 15.0;
    let plane = FrequencyDriftPlane::new(power, IntegratedFlags::zeros(2, 50), 1, drift_rates);
    let noise = NoiseStats::new(0.0, 1.0);
    let options = HitSearchOptions {
        method: HitSearchMethod::ConnectedComponents,
        snr_threshold: 10.0,
        neighbor_l1_dist: 1,
    };

    let protohits = protohit_search(&plane, &noise, &options);
    // Row 0: snr 15/1 = 15. Row 1: snr 15/2 = 7.5, below threshold.
    assert_eq!(protohits.len(), 1);
    assert_eq!(protohits[0].index_max.drift_index, 0);
}

#[test]
fn local_maxima_finds_isolated_peaks() {
    let plane = plane_with_power(8, 200, &[(2, 50, 40.0), (5, 150, 60.0)]);
    let noise = NoiseStats::new(0.0, 1.0);
    let options = HitSearchOptions {
        method: HitSearchMethod::LocalMaxima,
        snr_threshold: 10.0,
        neighbor_l1_dist: 7,
    };

    let mut protohits = protohit_search(&plane, &noise, &options);
    protohits.sort_by_key(|p| p.index_max.frequency_channel);
    assert_eq!(protohits.len(), 2);
    assert_eq!(protohits[0].index_max.frequency_channel, 50);
    assert_eq!(protohits[0].binwidth, 1);
    assert!(protohits[0].locations.is_empty());
    assert_eq!(protohits[0].index_center, protohits[0].index_max);
    assert_eq!(protohits[1].index_max.frequency_channel, 150);
}

#[test]
fn local_maxima_ties_prefer_the_lower_coordinate() {
    // Two equal peaks within one neighborhood: only the lexicographically
    // lower (drift, channel) survives.
    let plane = plane_with_power(8, 200, &[(2, 50, 40.0), (2, 51, 40.0)]);
    let noise = NoiseStats::new(0.0, 1.0);
    let options = HitSearchOptions {
        method: HitSearchMethod::LocalMaxima,
        snr_threshold: 10.0,
        neighbor_l1_dist: 1,
    };

    let protohits = protohit_search(&plane, &noise, &options);
    assert_eq!(protohits.len(), 1);
    assert_eq!(
        protohits[0].index_max,
        FreqDriftCoord {
            drift_index: 2,
            frequency_channel: 50
        }
    );
}

#[test]
fn l1_neighborhood_has_the_right_size() {
    // |B_1(k)| = 2k(k+1) cells excluding the origin.
    for k in 1..=7 {
        assert_eq!(l1_neighborhood(k).len(), 2 * k * (k + 1));
    }
    assert!(l1_neighborhood(1).contains(&(0, 1)));
    assert!(l1_neighborhood(1).contains(&(-1, 0)));
    assert!(!l1_neighborhood(1).contains(&(1, 1)));
    assert!(!l1_neighborhood(2).contains(&(0, 0)));
}

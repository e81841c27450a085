// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Local-maxima extraction.
//!
//! A cell is a detection when its SNR exceeds the threshold and it is
//! strictly greater than every other cell within the L1 ball. Equal-valued
//! neighbours are dominated by the lexicographically lower `(drift,
//! frequency)` coordinate, which keeps the result deterministic across
//! backends and traversal orders.

use ndarray::Array2;

use super::{l1_neighborhood, FreqDriftCoord, Protohit};
use crate::flagging::IntegratedFlags;

/// Find every strict local maximum above the SNR threshold.
pub(crate) fn find_local_maxima_above_threshold(
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
    let neighborhood = l1_neighborhood(neighbor_l1_dist);
    let mut maxima = vec![];

    for d in 0..ndrifts {
        for f in 0..nchans {
            let power = doppler_spectrum[(d, f)];
            let snr = (power - noise_floor) / noise_amplitude_per_drift[d];
            if snr <= snr_threshold {
                continue;
            }

            let dominates_all = neighborhood.iter().all(|&(dd, df)| {
                let nd = d as i64 + dd;
                let nf = f as i64 + df;
                if nd < 0 || nd >= ndrifts as i64 || nf < 0 || nf >= nchans as i64 {
                    return true;
                }
                let neighbor = doppler_spectrum[(nd as usize, nf as usize)];
                // Ties go to the lower (d, f).
                power > neighbor || (power == neighbor && (d, f) < (nd as usize, nf as usize))
            });
            if !dominates_all {
                continue;
            }

            let coord = FreqDriftCoord {
                drift_index: d,
                frequency_channel: f,
            };
            maxima.push(Protohit {
                index_max: coord,
                index_center: coord,
                snr,
                max_integration: power,
                desmeared_noise: noise_amplitude_per_drift[d],
                binwidth: 1,
                locations: vec![],
                rfi_counts: dedrifted_rfi.counts_at(d, f),
            });
        }
    }

    maxima
}

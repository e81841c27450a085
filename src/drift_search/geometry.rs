// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The drift-rate search grid.
//!
//! Drift rates are quantized so that every searched rate maps to an exact
//! integer channel span over the scan; fractional alignments would smear a
//! tone across rows and cost sensitivity. The smallest resolvable rate (the
//! "unit drift") crosses exactly one channel over the whole observation.

use log::debug;

use super::plane::DriftRate;
use super::IntegrateDriftsOptions;

/// Compute the geometry and metadata of every drift path to be searched.
///
/// The requested bounds are snapped to the nearest multiple of the unit
/// drift and traversed from the lower snapped bound upwards in steps of
/// `resolution` units, inclusive of the upper bound. Desmearing widens the
/// integration by the (rounded) number of channels a trajectory crosses per
/// time step, so fast drifts keep their energy.
pub fn compute_drift_rates(
    ntsteps: usize,
    foff: f64,
    tsamp: f64,
    options: &IntegrateDriftsOptions,
) -> Vec<DriftRate> {
    assert!(
        ntsteps >= 2,
        "drift search needs at least 2 time steps, got {ntsteps}"
    );
    assert!(foff != 0.0, "drift search needs a nonzero channel bandwidth");
    assert!(tsamp > 0.0, "drift search needs a positive sampling time");
    assert!(
        options.resolution >= 1,
        "drift search resolution must be at least 1 unit drift"
    );

    let max_drift_time_span = (ntsteps - 1) as f64;
    let foff_hz = foff * 1e6;
    // One channel over the full scan; negative for inverted bands.
    let unit_drift = foff_hz / (max_drift_time_span * tsamp);
    let step = unit_drift.abs() * options.resolution as f64;

    let snapped_low = (options.low_rate_hz_per_sec / unit_drift).round() * unit_drift;
    let snapped_high = (options.high_rate_hz_per_sec / unit_drift).round() * unit_drift;
    let first_rate = snapped_low.min(snapped_high);
    let span = (snapped_high - snapped_low).abs();

    // Inclusive upper bound: iterate while index * step <= span. The bounds
    // are exact multiples of the step up to FP noise, hence the epsilon.
    let number_drifts = (span / step + 1e-9).floor() as usize + 1;
    debug!(
        "searching {number_drifts} drift rates from {first_rate} Hz/s in increments of \
         {step} Hz/s"
    );

    let mut drift_rate_info = Vec::with_capacity(number_drifts);
    for index in 0..number_drifts {
        let rate = first_rate + index as f64 * step;
        let channel_span = (rate * max_drift_time_span * tsamp / foff_hz).round() as i64;
        let slope = channel_span as f64 / max_drift_time_span;

        let smeared_channels = slope.abs().round() as usize;
        let desmeared_bins = if options.desmear {
            smeared_channels.max(1)
        } else {
            1
        };

        drift_rate_info.push(DriftRate {
            index_in_plane: index,
            slope,
            rate_hz_per_sec: rate,
            channel_span,
            desmeared_bins,
        });
    }
    drift_rate_info
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;

use super::cpu::integrate_linear_rounded_bins;
use super::*;
use crate::coarse_channel::CoarseChannel;
use crate::flagging::FlagValue;
use crate::scan::ScanMetadata;

fn test_meta(ntsteps: usize, nchans: usize, foff: f64, tsamp: f64) -> ScanMetadata {
    ScanMetadata {
        fch1: 1000.0,
        foff,
        tsamp,
        tstart: 59000.0,
        source_name: "integration test".to_string(),
        nchans,
        ntsteps,
        ..ScanMetadata::default()
    }
}

/// A deterministic but unstructured spectrogram.
fn wavy_data(ntsteps: usize, nchans: usize) -> Array2<f32> {
    Array2::from_shape_fn((ntsteps, nchans), |(t, f)| {
        ((t * 37 + f * 11) % 17) as f32 * 0.25 + (f % 5) as f32
    })
}

#[test]
fn zero_drift_row_is_the_per_channel_time_sum() {
    let (ntsteps, nchans) = (16, 64);
    let data = wavy_data(ntsteps, nchans);
    let mask = Array2::zeros((ntsteps, nchans));

    let options = IntegrateDriftsOptions {
        low_rate_hz_per_sec: -1.0,
        high_rate_hz_per_sec: 1.0,
        ..IntegrateDriftsOptions::default()
    };
    let drifts = compute_drift_rates(ntsteps, 1e-6, 1.0, &options);
    let (power, _) = integrate_linear_rounded_bins(&data, &mask, &drifts);

    let zero_row = drifts
        .iter()
        .position(|rate| rate.channel_span == 0)
        .expect("a zero-drift row must be in the searched range");
    let time_sums = data.sum_axis(Axis(0));
    // Exact up to FP reassociation; tolerance scales with sqrt(ntsteps).
    let tolerance = (ntsteps as f32).sqrt() * f32::EPSILON * 16.0;
    for f in 0..nchans {
        assert_abs_diff_eq!(power[(zero_row, f)], time_sums[f], epsilon = tolerance);
    }
}

#[test]
fn plane_shape_matches_the_drift_grid() {
    let (ntsteps, nchans) = (8, 32);
    let data = wavy_data(ntsteps, nchans);
    let mask = Array2::zeros((ntsteps, nchans));
    let drifts = compute_drift_rates(ntsteps, 1e-6, 1.0, &IntegrateDriftsOptions::default());
    let (power, rfi) = integrate_linear_rounded_bins(&data, &mask, &drifts);
    assert_eq!(power.dim(), (drifts.len(), nchans));
    assert_eq!(rfi.dim(), (drifts.len(), nchans));
}

#[test]
fn out_of_band_trajectory_samples_contribute_zero() {
    let (ntsteps, nchans) = (4, 8);
    let data = Array2::from_elem((ntsteps, nchans), 1.0_f32);
    let mask = Array2::from_elem((ntsteps, nchans), FlagValue::SigmaClip.bit());

    // A single slope-1 trajectory.
    let drifts = vec![DriftRate {
        index_in_plane: 0,
        slope: 1.0,
        rate_hz_per_sec: 0.0,
        channel_span: 3,
        desmeared_bins: 1,
    }];
    let (power, rfi) = integrate_linear_rounded_bins(&data, &mask, &drifts);

    // Starting at channel f0, samples land at f0 + t; the band ends at 7.
    for f0 in 0..nchans {
        let in_band = ntsteps.min(nchans - f0);
        assert_abs_diff_eq!(power[(0, f0)], in_band as f32);
        assert_eq!(rfi.sigma_clip[(0, f0)], in_band as u8);
    }
}

#[test]
fn flag_counts_are_bounded_by_contributing_samples() {
    let (ntsteps, nchans) = (16, 32);
    let data = wavy_data(ntsteps, nchans);
    let mask = Array2::from_elem(
        (ntsteps, nchans),
        FlagValue::SigmaClip.bit() | FlagValue::LowSpectralKurtosis.bit(),
    );

    let options = IntegrateDriftsOptions {
        low_rate_hz_per_sec: -2.0,
        high_rate_hz_per_sec: 2.0,
        ..IntegrateDriftsOptions::default()
    };
    let drifts = compute_drift_rates(ntsteps, 1e-6, 1.0, &options);
    let (_, rfi) = integrate_linear_rounded_bins(&data, &mask, &drifts);

    for (d, rate) in drifts.iter().enumerate() {
        let bound = (ntsteps * rate.desmeared_bins).min(255) as u8;
        for f in 0..nchans {
            assert!(rfi.sigma_clip[(d, f)] <= bound);
            assert!(rfi.low_spectral_kurtosis[(d, f)] <= bound);
            // The high-SK bit was never set.
            assert_eq!(rfi.high_spectral_kurtosis[(d, f)], 0);
        }
    }
}

#[test]
fn flag_counts_saturate_instead_of_wrapping() {
    let (ntsteps, nchans) = (300, 4);
    let data = Array2::zeros((ntsteps, nchans));
    let mask = Array2::from_elem((ntsteps, nchans), FlagValue::HighSpectralKurtosis.bit());

    let drifts = vec![DriftRate {
        index_in_plane: 0,
        slope: 0.0,
        rate_hz_per_sec: 0.0,
        channel_span: 0,
        desmeared_bins: 1,
    }];
    let (_, rfi) = integrate_linear_rounded_bins(&data, &mask, &drifts);
    // 300 contributing samples, all flagged: the count pins at 255.
    assert_eq!(rfi.high_spectral_kurtosis[(0, 2)], 255);
}

#[test]
fn desmearing_recovers_energy_smeared_across_bins() {
    // A tone crossing two channels per time step, its power split between
    // the two bins it occupies during each step.
    let (ntsteps, nchans) = (16, 64);
    let mut data = Array2::zeros((ntsteps, nchans));
    for t in 0..ntsteps {
        data[(t, 10 + 2 * t)] = 5.0;
        data[(t, 11 + 2 * t)] = 5.0;
    }
    let mask = Array2::zeros((ntsteps, nchans));

    // foff 1 Hz/channel and tsamp 1 s make slope 2 a rate of 2 Hz/s.
    let meta = test_meta(ntsteps, nchans, 1e-6, 1.0);
    let slope_two = IntegrateDriftsOptions {
        desmear: true,
        low_rate_hz_per_sec: 2.0,
        high_rate_hz_per_sec: 2.0,
        resolution: 1,
    };

    let cc = CoarseChannel::from_tensors(data.clone(), mask.clone(), meta.clone(), 0);
    let plane = integrate_coarse_channel(&cc, &slope_two).unwrap();
    assert_eq!(plane.drift_rates().len(), 1);
    assert_eq!(plane.drift_rates()[0].desmeared_bins, 2);
    assert_abs_diff_eq!(plane.power()[(0, 10)], 160.0, epsilon = 1e-3);

    // Without desmearing, only the central trajectory is summed and half
    // the energy is lost.
    let smeared = IntegrateDriftsOptions {
        desmear: false,
        ..slope_two
    };
    let cc = CoarseChannel::from_tensors(data, mask, meta, 0);
    let plane = integrate_coarse_channel(&cc, &smeared).unwrap();
    assert_eq!(plane.drift_rates()[0].desmeared_bins, 1);
    assert_abs_diff_eq!(plane.power()[(0, 10)], 80.0, epsilon = 1e-3);
}

#[test]
fn scheduled_integration_runs_on_first_access_and_caches() {
    let (ntsteps, nchans) = (8, 16);
    let meta = test_meta(ntsteps, nchans, 1e-6, 1.0);
    let cc = CoarseChannel::from_tensors(
        wavy_data(ntsteps, nchans),
        Array2::zeros((ntsteps, nchans)),
        meta,
        0,
    );

    let cc = integrate_drifts(cc, IntegrateDriftsOptions::default());
    assert!(cc.has_drift_plane());
    assert!(cc.drift_plane_if_computed().is_none());

    let plane = cc.drift_plane().unwrap();
    assert_eq!(plane.integration_steps(), ntsteps);
    // Second access returns the same materialization.
    let again = cc.drift_plane().unwrap();
    assert!(std::sync::Arc::ptr_eq(&plane, &again));
}

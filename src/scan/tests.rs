// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;

use super::*;
use crate::data_source::RamDataSource;
use crate::drift_search::{DriftSearchStages, HitSearchOptions, IntegrateDriftsOptions};
use crate::noise::{apply_noise_estimate, NoiseStats};

fn test_meta(ntsteps: usize, nchans: usize) -> ScanMetadata {
    ScanMetadata {
        fch1: 1000.0,
        foff: 1e-6,
        tsamp: 1.0,
        tstart: 59000.0,
        source_name: "scan test".to_string(),
        nchans,
        ntsteps,
        ..ScanMetadata::default()
    }
}

fn ram_scan(data: Array2<f32>, fine_per_coarse: usize) -> Scan {
    let (ntsteps, nchans) = data.dim();
    let source = RamDataSource::new(data, None, test_meta(ntsteps, nchans));
    Scan::from_data_source(Arc::new(source), fine_per_coarse).unwrap()
}

// ---------------------------------------------------------------------------
// Channelization inference
// ---------------------------------------------------------------------------

#[test]
fn known_channelizations_are_matched() {
    // Two HSR-Rev2A coarse channels.
    assert_eq!(
        infer_channelization(2 * 1_048_576, 2.79e-6, 18.25),
        (2, 1_048_576)
    );
    // Three mid-resolution Rev1B coarse channels.
    assert_eq!(infer_channelization(3 * 1_024, 2_860e-6, 1.02), (3, 1_024));
}

#[test]
fn unknown_channelizations_round_from_common_sizes() {
    // 4 * 2^18 fine channels at resolutions matching no table entry.
    assert_eq!(infer_channelization(1_048_576, 1e-6, 1.0), (4, 262_144));
    // 2 million fine channels: the 10^6 fallback.
    assert_eq!(infer_channelization(2_000_000, 1e-6, 1.0), (2, 1_000_000));
}

#[test]
fn hopeless_channelizations_become_one_coarse_channel() {
    assert_eq!(infer_channelization(999, 1e-6, 1.0), (1, 999));
}

// ---------------------------------------------------------------------------
// Construction and channel reads
// ---------------------------------------------------------------------------

#[test]
fn read_coarse_channel_slices_the_band() {
    let data = Array2::from_shape_fn((8, 32), |(_, f)| f as f32);
    let mut scan = ram_scan(data, 8);
    assert_eq!(scan.number_coarse_channels(), 4);

    let cc = scan.read_coarse_channel(2).unwrap();
    assert_eq!(cc.cc_number(), 2);
    assert_eq!(cc.nchans(), 8);
    assert_eq!(cc.ntsteps(), 8);
    assert_abs_diff_eq!(cc.fch1(), 1000.0 + 1e-6 * 16.0, epsilon = 1e-12);

    let tensor = cc.data().unwrap();
    assert_eq!(tensor.dim(), (8, 8));
    assert_abs_diff_eq!(tensor[(0, 0)], 16.0);
    assert_abs_diff_eq!(tensor[(7, 7)], 23.0);
    // An absent mask reads as zeros.
    assert_eq!(cc.mask().unwrap()[(3, 3)], 0);
}

#[test]
fn explicit_channelization_must_divide_the_band() {
    let source = RamDataSource::new(Array2::zeros((8, 32)), None, test_meta(8, 32));
    let result = Scan::from_data_source(Arc::new(source), 7);
    assert!(matches!(
        result,
        Err(BlissError::Data(DataError::ChannelizationMismatch {
            nchans: 32,
            fine_per_coarse: 7
        }))
    ));
}

#[test]
fn invalid_metadata_is_a_data_error() {
    let mut meta = test_meta(8, 32);
    meta.foff = 0.0;
    let source = RamDataSource::new(Array2::zeros((8, 32)), None, meta);
    let result = Scan::from_data_source(Arc::new(source), 8);
    assert!(matches!(
        result,
        Err(BlissError::Data(DataError::InvalidMetadata { field: "foff", .. }))
    ));
}

#[test]
#[should_panic(expected = "out of range")]
fn out_of_range_channel_reads_are_programmer_errors() {
    let mut scan = ram_scan(Array2::zeros((8, 32)), 8);
    let _ = scan.read_coarse_channel(4);
}

#[test]
fn frequency_lookup_maps_into_coarse_channels() {
    let scan = ram_scan(Array2::zeros((8, 32)), 8);
    assert_eq!(scan.coarse_channel_with_frequency(1000.0), Some(0));
    assert_eq!(scan.coarse_channel_with_frequency(1000.0 + 9e-6), Some(1));
    assert_eq!(scan.coarse_channel_with_frequency(1000.0 + 31e-6), Some(3));
    assert_eq!(scan.coarse_channel_with_frequency(999.9), None);
    assert_eq!(scan.coarse_channel_with_frequency(1000.0 + 32e-6), None);
}

// ---------------------------------------------------------------------------
// Pipeline execution
// ---------------------------------------------------------------------------

/// Two zero-drift tones in different coarse channels, searched through the
/// lazy pipeline.
fn two_tone_scan() -> Scan {
    let (ntsteps, nchans) = (16, 64);
    let mut data = Array2::zeros((ntsteps, nchans));
    for t in 0..ntsteps {
        data[(t, 10)] = 10.0;
        data[(t, 42)] = 10.0;
    }
    let scan = ram_scan(data, 32);
    let scan = apply_noise_estimate(scan, NoiseStats::new(0.0, 1.0));
    scan.integrate_drifts(IntegrateDriftsOptions {
        low_rate_hz_per_sec: -1.0,
        high_rate_hz_per_sec: 1.0,
        ..IntegrateDriftsOptions::default()
    })
    .hit_search(HitSearchOptions {
        snr_threshold: 8.0,
        ..HitSearchOptions::default()
    })
}

#[test]
fn pipeline_stages_run_in_order_on_read() {
    let mut scan = two_tone_scan();
    assert_eq!(
        scan.pipeline_descriptions(),
        vec!["apply noise estimate", "integrate drifts", "hit search"]
    );

    let hits = scan.hits().unwrap();
    assert_eq!(hits.len(), 2);

    // Both tones sit at local channel 10 of their coarse channel; the hit
    // ordering falls through to the physical frequency.
    assert_eq!(hits[0].start_freq_index, 10);
    assert_eq!(hits[1].start_freq_index, 10);
    assert!(hits[0].start_freq_mhz < hits[1].start_freq_mhz);
    assert_eq!(hits[0].coarse_channel_number, 0);
    assert_eq!(hits[1].coarse_channel_number, 1);
    assert_abs_diff_eq!(hits[0].start_freq_mhz, 1000.0 + 1e-6 * 10.0, epsilon = 1e-9);
    assert_abs_diff_eq!(hits[1].start_freq_mhz, 1000.0 + 1e-6 * 42.0, epsilon = 1e-9);
}

#[test]
fn hits_without_a_scheduled_search_are_skipped_with_a_warning() {
    let mut scan = ram_scan(Array2::zeros((8, 32)), 8);
    // No pipeline at all: every channel is skipped, no hits, no panic.
    assert!(scan.hits().unwrap().is_empty());
}

#[test]
fn drift_range_spans_the_searched_grid() {
    let mut scan = two_tone_scan();
    let (low, high) = scan.drift_range().unwrap().expect("planes were scheduled");
    // Bounds snapped to the 1/15 Hz/s unit drift.
    assert_abs_diff_eq!(low, -1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(high, 1.0, epsilon = 1e-9);
}

#[test]
fn peek_does_not_construct_channels() {
    let mut scan = two_tone_scan();
    assert!(scan.peek_coarse_channel(0).unwrap().is_none());
    let _ = scan.read_coarse_channel(0).unwrap();
    let peeked = scan.peek_coarse_channel(0).unwrap().expect("now cached");
    assert!(peeked.has_hits());
}

// ---------------------------------------------------------------------------
// Slicing
// ---------------------------------------------------------------------------

#[test]
fn sliced_scans_read_the_right_sub_band() {
    let mut scan = two_tone_scan();
    let full_hits = scan.hits().unwrap();

    let mut upper = scan.slice_scan_channels(1, 1);
    assert_eq!(upper.number_coarse_channels(), 1);
    assert_abs_diff_eq!(upper.fch1(), 1000.0 + 1e-6 * 32.0, epsilon = 1e-12);
    assert_eq!(upper.nchans(), 32);

    let upper_hits = upper.hits().unwrap();
    assert_eq!(upper_hits.len(), 1);
    assert_eq!(upper_hits[0], full_hits[1]);
    // The channel keeps its index within the full band.
    assert_eq!(upper.read_coarse_channel(0).unwrap().cc_number(), 1);
}

#[test]
#[should_panic(expected = "out of range")]
fn oversized_slices_are_programmer_errors() {
    let scan = ram_scan(Array2::zeros((8, 32)), 8);
    let _ = scan.slice_scan_channels(2, 3);
}

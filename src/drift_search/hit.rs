// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Hits: single-scan detections in physical units, and the characterization
//! step that produces them from protohits.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::plane::DriftRate;
use super::protohit::{protohit_search, Protohit};
use super::HitSearchOptions;
use crate::coarse_channel::CoarseChannel;
use crate::error::BlissError;
use crate::flagging::RfiCounts;
use crate::noise::NoiseStats;

pub(crate) const SECONDS_PER_DAY: f64 = 24.0 * 60.0 * 60.0;

/// A detected signal candidate.
///
/// Equality and ordering compare the physics fields only;
/// `integrated_channels` and `coarse_channel_number` are deliberately
/// excluded so hit lists compare stably across versions and channel
/// partitionings. Float fields are ordered with `total_cmp`, giving a total
/// order (the pipeline never produces NaNs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    /// Frequency channel of the peak at the start of the scan.
    pub start_freq_index: usize,
    /// Frequency at the detection centroid \[MHz\] (centroid, not peak, for
    /// sub-bin localization).
    pub start_freq_mhz: f64,
    /// Scan start \[seconds\] (MJD * 86400).
    pub start_time_sec: f64,
    /// Scan span \[seconds\].
    pub duration_sec: f64,
    /// Row of the matched drift rate in the searched grid.
    pub rate_index: usize,
    /// The matched drift rate \[Hz/s\].
    pub drift_rate_hz_per_sec: f64,
    /// Integrated power above the noise floor.
    pub power: f64,
    /// Time steps the detection spans.
    pub time_span_steps: usize,
    /// Total samples integrated into the detection
    /// (`desmeared_bins * integration_steps`).
    pub integrated_channels: u64,
    /// Peak power over the drift-adjusted noise amplitude.
    pub snr: f32,
    /// Detection bandwidth \[Hz\].
    pub bandwidth: f64,
    /// Detection width in frequency bins.
    pub binwidth: usize,
    /// Flag tallies along the integrated trajectory.
    pub rfi_counts: RfiCounts,
    /// Which coarse channel produced this hit.
    pub coarse_channel_number: i64,
}

impl Hit {
    /// The frequency this hit predicts at `time_sec` under its linear drift
    /// model \[Hz\].
    pub fn frequency_at(&self, time_sec: f64) -> f64 {
        self.start_freq_mhz * 1e6 + self.drift_rate_hz_per_sec * (time_sec - self.start_time_sec)
    }

    /// The end of this hit's scan \[seconds\].
    pub fn end_time_sec(&self) -> f64 {
        self.start_time_sec + self.duration_sec
    }
}

impl PartialEq for Hit {
    fn eq(&self, other: &Hit) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Hit {}

impl Ord for Hit {
    fn cmp(&self, other: &Hit) -> Ordering {
        self.start_freq_index
            .cmp(&other.start_freq_index)
            .then_with(|| self.start_freq_mhz.total_cmp(&other.start_freq_mhz))
            .then_with(|| self.start_time_sec.total_cmp(&other.start_time_sec))
            .then_with(|| self.duration_sec.total_cmp(&other.duration_sec))
            .then_with(|| self.rate_index.cmp(&other.rate_index))
            .then_with(|| {
                self.drift_rate_hz_per_sec
                    .total_cmp(&other.drift_rate_hz_per_sec)
            })
            .then_with(|| self.power.total_cmp(&other.power))
            .then_with(|| self.time_span_steps.cmp(&other.time_span_steps))
            .then_with(|| self.snr.total_cmp(&other.snr))
            .then_with(|| self.bandwidth.total_cmp(&other.bandwidth))
            .then_with(|| self.binwidth.cmp(&other.binwidth))
            .then_with(|| self.rfi_counts.cmp(&other.rfi_counts))
    }
}

impl PartialOrd for Hit {
    fn partial_cmp(&self, other: &Hit) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Hit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "hit at {:.6} MHz (channel {}), drift {:+.3} Hz/s, snr {:.1}, bandwidth {:.1} Hz",
            self.start_freq_mhz,
            self.start_freq_index,
            self.drift_rate_hz_per_sec,
            self.snr,
            self.bandwidth
        )
    }
}

/// Project one protohit into physical units.
pub(crate) fn characterize_protohit(
    protohit: &Protohit,
    drift_rates: &[DriftRate],
    integration_steps: usize,
    noise_estimate: &NoiseStats,
    fch1: f64,
    foff: f64,
    tstart: f64,
    tsamp: f64,
    coarse_channel_number: i64,
) -> Hit {
    let rate_index = protohit.index_max.drift_index;
    let channel_bandwidth_hz = (1e6 * foff).abs();
    let signal_power = f64::from(protohit.max_integration) - f64::from(noise_estimate.noise_floor());

    Hit {
        start_freq_index: protohit.index_max.frequency_channel,
        // The centroid localizes better than the peak when a signal spreads
        // over several bins.
        start_freq_mhz: fch1 + foff * protohit.index_center.frequency_channel as f64,
        start_time_sec: tstart * SECONDS_PER_DAY,
        duration_sec: tsamp * integration_steps as f64,
        rate_index,
        drift_rate_hz_per_sec: drift_rates[rate_index].rate_hz_per_sec,
        power: signal_power,
        time_span_steps: integration_steps,
        integrated_channels: (drift_rates[rate_index].desmeared_bins * integration_steps) as u64,
        snr: (signal_power / f64::from(protohit.desmeared_noise)) as f32,
        bandwidth: protohit.binwidth as f64 * channel_bandwidth_hz,
        binwidth: protohit.binwidth,
        rfi_counts: protohit.rfi_counts,
        coarse_channel_number,
    }
}

/// Search a coarse channel's integrated drift plane for hits.
///
/// Requires a scheduled drift plane and an attached noise estimate; both
/// absences are programmer errors (a search cannot mean anything without
/// them).
pub fn hit_search(
    cc: &CoarseChannel,
    options: &HitSearchOptions,
) -> Result<Vec<Hit>, BlissError> {
    let noise_estimate = cc.noise_estimate();
    let plane = cc.drift_plane()?;
    let protohits = protohit_search(&plane, &noise_estimate, options);

    let hits = protohits
        .iter()
        .map(|protohit| {
            characterize_protohit(
                protohit,
                plane.drift_rates(),
                plane.integration_steps(),
                &noise_estimate,
                cc.fch1(),
                cc.foff(),
                cc.tstart(),
                cc.tsamp(),
                cc.cc_number(),
            )
        })
        .collect();
    Ok(hits)
}

/// Schedule a hit search for a coarse channel: the hits are computed on
/// first access and cached, shared with every clone of the returned channel.
pub fn schedule_hit_search(mut cc: CoarseChannel, options: HitSearchOptions) -> CoarseChannel {
    let captured = cc.clone();
    cc.set_hits_with(move || hit_search(&captured, &options));
    cc
}

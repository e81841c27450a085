// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Multi-scan persistence: correlating hits across a cadence into events.
//!
//! A hit in one ON scan seeds a candidate trajectory; hits in later ON
//! scans join it when they project to the same frequency at a shared
//! rendezvous time. Candidates that also match a hit in any OFF scan are
//! terrestrial interference and are dropped.

use log::debug;
use serde::{Deserialize, Serialize};

use super::hit::{Hit, SECONDS_PER_DAY};
use super::EventSearchOptions;
use crate::cadence::Cadence;
use crate::error::BlissError;

// Tuning weights for the distance metric.
const FREQ_LOCALIZATION_WEIGHT: f64 = 0.01;
const DRIFT_ERROR_WEIGHT: f64 = 10.0;
const SNR_DIFFERENCE_WEIGHT: f64 = 0.0;
const EPS: f64 = 1e-8;

/// A persistence-verified candidate: hits from multiple ON scans consistent
/// with one drifting trajectory, absent from every OFF scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// The member hits, in scan order starting with the seed.
    pub hits: Vec<Hit>,
    /// The seed hit's frequency \[Hz\].
    pub starting_frequency_hz: f64,
    /// Start of the seed hit's scan \[seconds\].
    pub event_start_seconds: f64,
    /// End of the seed hit's scan \[seconds\].
    pub event_end_seconds: f64,
    pub average_power: f64,
    pub average_bandwidth: f64,
    pub average_snr: f32,
    pub average_drift_rate_hz_per_sec: f64,
}

/// How dissimilar two hits are, as candidates for one physical signal.
///
/// Both hits are projected along their drift models to a shared rendezvous
/// time; the metric mixes the projected frequency mismatch \[Hz\], a
/// normalized drift-rate mismatch, and (currently zero-weighted) the SNR
/// difference. Lower is more similar; identical trajectories score 0.
fn hit_distance(a: &Hit, b: &Hit) -> f64 {
    let snr_difference = (f64::from(a.snr) - f64::from(b.snr)).abs();

    let drift_difference = (a.drift_rate_hz_per_sec - b.drift_rate_hz_per_sec).abs()
        / (EPS
            + a.drift_rate_hz_per_sec * a.drift_rate_hz_per_sec
            + b.drift_rate_hz_per_sec * b.drift_rate_hz_per_sec);
    let drift_error = drift_difference * drift_difference;

    let first_sample_time = a.start_time_sec.min(b.start_time_sec);
    // TODO: the first term plausibly wants a.duration_sec; keep the observed
    // behavior until a validation run against archived detections settles it.
    let last_sample_time =
        (a.start_time_sec + b.duration_sec).max(b.start_time_sec + b.duration_sec);
    let rendezvous_time = (last_sample_time + first_sample_time) / 2.0;

    let rendezvous_frequency_difference =
        (a.frequency_at(rendezvous_time) - b.frequency_at(rendezvous_time)).abs();

    FREQ_LOCALIZATION_WEIGHT * rendezvous_frequency_difference
        + DRIFT_ERROR_WEIGHT * drift_error
        + SNR_DIFFERENCE_WEIGHT * snr_difference
}

/// Does `challenger` beat `incumbent` on the deterministic tie-break
/// (smaller starting channel, then smaller drift-rate row)?
fn wins_tie(challenger: &Hit, incumbent: &Hit) -> bool {
    (challenger.start_freq_index, challenger.rate_index)
        < (incumbent.start_freq_index, incumbent.rate_index)
}

/// The available hit closest to any member of the candidate event, with its
/// distance.
fn find_best_matching_hit(candidate_event: &Event, hits_to_check: &[Hit]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (index, candidate) in hits_to_check.iter().enumerate() {
        let lowest_dist_to_event = candidate_event
            .hits
            .iter()
            .map(|member| hit_distance(member, candidate))
            .fold(f64::INFINITY, f64::min);

        let better = match best {
            None => true,
            Some((best_index, best_distance)) => {
                lowest_dist_to_event < best_distance
                    || (lowest_dist_to_event == best_distance
                        && wins_tie(candidate, &hits_to_check[best_index]))
            }
        };
        if better {
            best = Some((index, lowest_dist_to_event));
        }
    }
    best
}

/// How many OFF-scan hits sit within the association threshold of the
/// candidate (averaged over its members)?
fn count_event_in_off_scans(
    candidate_event: &Event,
    off_scan_hits: &[Vec<Hit>],
    options: &EventSearchOptions,
) -> usize {
    let mut times_in_off = 0;
    for scan_hits in off_scan_hits {
        for off_hit in scan_hits {
            let total_distance: f64 = candidate_event
                .hits
                .iter()
                .map(|member| hit_distance(off_hit, member))
                .sum();
            if total_distance / (candidate_event.hits.len() as f64) < options.association_threshold {
                times_in_off += 1;
                debug!(
                    "candidate event at {:.6} MHz was also seen in an OFF scan",
                    candidate_event.starting_frequency_hz / 1e6
                );
            }
        }
    }
    times_in_off
}

fn finalize_event_averages(candidate_event: &mut Event) {
    let mut drift_sum = 0.0;
    let mut power_sum = 0.0;
    let mut snr_sum = 0.0;
    let mut bandwidth_sum = 0.0;
    for hit in &candidate_event.hits {
        drift_sum += hit.drift_rate_hz_per_sec;
        power_sum += hit.power;
        snr_sum += f64::from(hit.snr);
        bandwidth_sum += hit.bandwidth;
    }
    let num_hits = candidate_event.hits.len() as f64;
    candidate_event.average_drift_rate_hz_per_sec = drift_sum / num_hits;
    candidate_event.average_power = power_sum / num_hits;
    candidate_event.average_snr = (snr_sum / num_hits) as f32;
    candidate_event.average_bandwidth = bandwidth_sum / num_hits;
}

/// Search a cadence for signals that persist across the primary target's
/// scans and vanish in the OFF scans.
///
/// Every hit of every ON scan is tried as a seed; later ON scans contribute
/// their closest available hit when it falls inside the association
/// threshold. A matched hit is consumed: it can join at most one candidate,
/// and stays consumed even when that candidate is later rejected. An event
/// is emitted iff it gathered more than one hit and matched nothing in any
/// OFF scan.
pub fn event_search(
    mut cadence: Cadence,
    options: &EventSearchOptions,
) -> Result<Vec<Event>, BlissError> {
    // Materialize all hit lists up front; the matching itself is pure.
    let mut on_scan_hits: Vec<Vec<Hit>> = vec![];
    let mut on_scan_times: Vec<(f64, f64)> = vec![];
    {
        let primary = cadence.observations.first_mut();
        for scan in primary.scans.iter_mut() {
            on_scan_times.push((scan.tstart(), scan.tduration_secs()));
            on_scan_hits.push(scan.hits()?);
        }
    }
    let mut off_scan_hits: Vec<Vec<Hit>> = vec![];
    for target in cadence.observations.iter_mut().skip(1) {
        for scan in target.scans.iter_mut() {
            off_scan_hits.push(scan.hits()?);
        }
    }

    let mut detected_events = vec![];
    for on_scan_index in 0..on_scan_hits.len() {
        // Hits already consumed by earlier candidates are gone from this
        // snapshot; matching only ever consumes from *later* scans, so the
        // snapshot stays in sync with the live list while this scan seeds.
        let seeds = on_scan_hits[on_scan_index].clone();
        let (scan_tstart, scan_duration) = on_scan_times[on_scan_index];

        for starting_hit in seeds {
            let mut candidate_event = Event {
                starting_frequency_hz: starting_hit.start_freq_mhz * 1e6,
                event_start_seconds: scan_tstart * SECONDS_PER_DAY,
                event_end_seconds: scan_tstart * SECONDS_PER_DAY + scan_duration,
                average_power: starting_hit.power,
                average_bandwidth: starting_hit.bandwidth,
                average_snr: starting_hit.snr,
                average_drift_rate_hz_per_sec: starting_hit.drift_rate_hz_per_sec,
                hits: vec![starting_hit],
            };

            for hits_to_check in on_scan_hits.iter_mut().skip(on_scan_index + 1) {
                if let Some((best_index, best_distance)) =
                    find_best_matching_hit(&candidate_event, hits_to_check)
                {
                    if best_distance < options.association_threshold {
                        candidate_event.hits.push(hits_to_check.remove(best_index));
                    }
                }
            }

            let times_in_off = count_event_in_off_scans(&candidate_event, &off_scan_hits, options);
            if candidate_event.hits.len() > 1 && times_in_off == 0 {
                finalize_event_averages(&mut candidate_event);
                debug!(
                    "event at {:.6} MHz: {} hits, average snr {:.1}, average drift {:+.3} Hz/s",
                    candidate_event.starting_frequency_hz / 1e6,
                    candidate_event.hits.len(),
                    candidate_event.average_snr,
                    candidate_event.average_drift_rate_hz_per_sec
                );
                detected_events.push(candidate_event);
            }
        }
    }

    Ok(detected_events)
}

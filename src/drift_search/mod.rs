// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The detection pipeline: de-Doppler integration, hit extraction, hit
//! filtering and cross-scan event search.
//!
//! Stages compose lazily: scheduling a stage on a [`Scan`] appends a
//! transform to its per-channel pipeline, and nothing heavy runs until a
//! channel (or its hits) is actually read. The same stages apply to an
//! [`ObservationTarget`](crate::cadence::ObservationTarget) or a whole
//! [`Cadence`] by mapping over their scans.

pub(crate) mod geometry;
mod plane;

mod event;
mod filter;
mod hit;
mod integrate;
mod protohit;

pub use event::{event_search, Event};
pub use filter::{filter_hits, FilterOptions};
pub use geometry::compute_drift_rates;
pub use hit::{hit_search, schedule_hit_search, Hit};
pub use integrate::integrate_drifts;
pub use plane::{DriftRate, FrequencyDriftPlane};
pub use protohit::{FreqDriftCoord, Protohit};

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::cadence::Cadence;
use crate::coarse_channel::CoarseChannel;
use crate::error::BlissError;
use crate::scan::Scan;

/// Configuration for de-Doppler integration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegrateDriftsOptions {
    /// Widen the integration window to recover energy smeared across bins
    /// by fast drifts.
    pub desmear: bool,
    /// The lowest drift rate to search \[Hz/s\].
    pub low_rate_hz_per_sec: f64,
    /// The highest drift rate to search \[Hz/s\].
    pub high_rate_hz_per_sec: f64,
    /// Search step in units of the unit drift (one channel over the full
    /// scan).
    pub resolution: usize,
}

impl Default for IntegrateDriftsOptions {
    fn default() -> IntegrateDriftsOptions {
        IntegrateDriftsOptions {
            desmear: true,
            low_rate_hz_per_sec: -5.0,
            high_rate_hz_per_sec: 5.0,
            resolution: 1,
        }
    }
}

/// Which protohit extraction algorithm to run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum HitSearchMethod {
    /// Threshold, then group connected cells into one detection. More
    /// robust for signals spread over several cells.
    ConnectedComponents,
    /// Strict local maxima. Cheaper; good for sharp tones.
    LocalMaxima,
}

/// Configuration for the hit search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitSearchOptions {
    pub method: HitSearchMethod,
    /// Minimum `(power - noise_floor) / sqrt(adjusted noise)` for a
    /// detection.
    pub snr_threshold: f32,
    /// L1 (Manhattan) radius defining connectivity and local-maximum
    /// dominance in the drift plane.
    pub neighbor_l1_dist: usize,
}

impl Default for HitSearchOptions {
    fn default() -> HitSearchOptions {
        HitSearchOptions {
            method: HitSearchMethod::ConnectedComponents,
            snr_threshold: 10.0,
            neighbor_l1_dist: 7,
        }
    }
}

/// Configuration for the cross-scan event search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventSearchOptions {
    /// Hits closer than this (in the unitless trajectory distance) associate
    /// into one event; an event whose mean distance to an OFF-scan hit falls
    /// under it is vetoed.
    pub association_threshold: f64,
}

impl Default for EventSearchOptions {
    fn default() -> EventSearchOptions {
        EventSearchOptions {
            association_threshold: 50.0,
        }
    }
}

/// Pipeline-stage composition over scans, targets and cadences.
///
/// Each method schedules work; per-channel computation happens on read, and
/// a channel's cached products are shared by every downstream clone.
pub trait DriftSearchStages: Sized {
    /// Schedule de-Doppler integration of every coarse channel.
    fn integrate_drifts(self, options: IntegrateDriftsOptions) -> Self;

    /// Schedule a hit search over every coarse channel's drift plane.
    fn hit_search(self, options: HitSearchOptions) -> Self;

    /// Schedule rule-based rejection of every coarse channel's hits.
    fn filter_hits(self, options: FilterOptions) -> Self;
}

impl DriftSearchStages for Scan {
    fn integrate_drifts(mut self, options: IntegrateDriftsOptions) -> Scan {
        self.add_coarse_channel_transform("integrate drifts", move |cc| {
            Ok(integrate::integrate_drifts(cc, options))
        });
        self
    }

    fn hit_search(mut self, options: HitSearchOptions) -> Scan {
        self.add_coarse_channel_transform("hit search", move |cc| {
            Ok(hit::schedule_hit_search(cc, options))
        });
        self
    }

    fn filter_hits(mut self, options: FilterOptions) -> Scan {
        self.add_coarse_channel_transform("filter hits", move |mut cc: CoarseChannel| {
            let filtered = filter::filter_hits(cc.hits()?, &options);
            cc.set_hits(filtered);
            Ok(cc)
        });
        self
    }
}

impl DriftSearchStages for crate::cadence::ObservationTarget {
    fn integrate_drifts(mut self, options: IntegrateDriftsOptions) -> Self {
        self.scans = self
            .scans
            .into_iter()
            .map(|scan| scan.integrate_drifts(options))
            .collect();
        self
    }

    fn hit_search(mut self, options: HitSearchOptions) -> Self {
        self.scans = self
            .scans
            .into_iter()
            .map(|scan| scan.hit_search(options))
            .collect();
        self
    }

    fn filter_hits(mut self, options: FilterOptions) -> Self {
        self.scans = self
            .scans
            .into_iter()
            .map(|scan| scan.filter_hits(options))
            .collect();
        self
    }
}

impl DriftSearchStages for Cadence {
    fn integrate_drifts(mut self, options: IntegrateDriftsOptions) -> Cadence {
        self.observations = self
            .observations
            .mapped(|target| target.integrate_drifts(options));
        self
    }

    fn hit_search(mut self, options: HitSearchOptions) -> Cadence {
        self.observations = self.observations.mapped(|target| target.hit_search(options));
        self
    }

    fn filter_hits(mut self, options: FilterOptions) -> Cadence {
        self.observations = self
            .observations
            .mapped(|target| target.filter_hits(options));
        self
    }
}

/// Integrate and search one coarse channel without materializing the whole
/// drift plane.
///
/// The full `[drifts, channels]` plane can run to tens of gigabytes, so this
/// driver walks the drift axis in tiles of `drift_rows_per_tile` rows. Each
/// tile is integrated and searched together with an overlap of
/// `max(desmeared_bins) + neighbor_l1_dist` rows on both sides, enough for
/// connected components and local-maximum dominance tests to see everything
/// they would see in the full plane, and only detections whose peak row
/// lies in the tile's core are kept, so each detection is emitted exactly
/// once. The result matches the materialized
/// [`integrate_drifts`]-then-[`hit_search`] path, returned in hit order.
pub fn search_coarse_channel(
    cc: &CoarseChannel,
    integrate_options: &IntegrateDriftsOptions,
    search_options: &HitSearchOptions,
    drift_rows_per_tile: NonZeroUsize,
) -> Result<Vec<Hit>, BlissError> {
    let noise_estimate = cc.noise_estimate();
    let drift_rates =
        geometry::compute_drift_rates(cc.ntsteps(), cc.foff(), cc.tsamp(), integrate_options);
    let num_drifts = drift_rates.len();
    let overlap = drift_rates
        .iter()
        .map(|rate| rate.desmeared_bins)
        .max()
        .unwrap_or(1)
        + search_options.neighbor_l1_dist;

    let mut hits = vec![];
    let mut core_start = 0;
    while core_start < num_drifts {
        let core_end = (core_start + drift_rows_per_tile.get()).min(num_drifts);
        let tile_start = core_start.saturating_sub(overlap);
        let tile_end = (core_end + overlap).min(num_drifts);

        let plane = integrate::integrate_with_rates(cc, &drift_rates[tile_start..tile_end])?;
        let protohits = protohit::protohit_search(&plane, &noise_estimate, search_options);

        for mut protohit in protohits {
            let peak_row = tile_start + protohit.index_max.drift_index;
            if !(core_start..core_end).contains(&peak_row) {
                continue;
            }
            // Lift tile-local grid coordinates back into the full plane.
            protohit.index_max.drift_index += tile_start;
            protohit.index_center.drift_index += tile_start;
            for location in &mut protohit.locations {
                location.drift_index += tile_start;
            }
            hits.push(hit::characterize_protohit(
                &protohit,
                &drift_rates,
                cc.ntsteps(),
                &noise_estimate,
                cc.fch1(),
                cc.foff(),
                cc.tstart(),
                cc.tsamp(),
                cc.cc_number(),
            ));
        }

        core_start = core_end;
    }

    hits.sort_unstable();
    Ok(hits)
}

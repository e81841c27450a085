// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Narrowband drift-rate signal search for radio SETI spectrograms.

Given a prepared time-frequency spectrogram ("waterfall"), this crate
integrates power along every candidate linear Doppler-drift trajectory,
searches the resulting drift plane for significant peaks, characterizes those
peaks into physical-unit hits, rejects terrestrial interference with
flag-count rules, and correlates hits across the scans of an ON/OFF cadence
into persistence-verified events.

File readers, preprocessing, RFI estimators and serialization live in
separate crates; this one consumes their products through the
[`ScanDataSource`](data_source::ScanDataSource) trait, the per-sample flag
mask conventions in [`flagging`], and externally supplied
[`NoiseStats`](noise::NoiseStats).
 */

pub mod cadence;
pub mod coarse_channel;
pub mod data_source;
pub mod device;
pub mod drift_search;
pub mod error;
pub mod flagging;
pub mod noise;
pub mod scan;

// Re-exports.
pub use cadence::{Cadence, ObservationTarget};
pub use coarse_channel::CoarseChannel;
pub use data_source::ScanDataSource;
pub use device::Device;
pub use drift_search::{
    event_search, filter_hits, hit_search, DriftSearchStages, Event, EventSearchOptions,
    FilterOptions, Hit, HitSearchMethod, HitSearchOptions, IntegrateDriftsOptions,
};
pub use error::BlissError;
pub use noise::{apply_noise_estimate, NoiseStats};
pub use scan::{Scan, ScanMetadata};

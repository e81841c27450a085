// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! One contiguous frequency sub-band of a scan: the unit of processing and
//! parallelism.
//!
//! A [`CoarseChannel`] owns its spectrogram and mask tensors (loaded lazily
//! through the data source on first access) and caches the expensive
//! downstream products, the integrated drift plane and the hit list, in
//! reference-counted single-assignment cells. Pipeline transforms take and
//! return channels by value; because the cells are shared between clones, a
//! product materialized anywhere is visible everywhere.

mod cache;

pub(crate) use cache::CachedProduct;

use std::fmt;
use std::sync::Arc;

use ndarray::Array2;

use crate::device::Device;
use crate::drift_search::{FrequencyDriftPlane, Hit};
use crate::error::BlissError;
use crate::noise::NoiseStats;
use crate::scan::ScanMetadata;

#[derive(Clone)]
pub struct CoarseChannel {
    cc_number: i64,
    meta: ScanMetadata,
    data: CachedProduct<Array2<f32>>,
    mask: CachedProduct<Array2<u8>>,
    noise_stats: Option<NoiseStats>,
    drift_plane: Option<CachedProduct<FrequencyDriftPlane>>,
    hits: Option<CachedProduct<Vec<Hit>>>,
    device: Device,
}

impl CoarseChannel {
    /// A channel whose tensors are read on first access.
    ///
    /// The loaders are usually hyperslab reads captured from a
    /// [`ScanDataSource`](crate::data_source::ScanDataSource); they run at
    /// most once and the results are shared by every clone of this channel.
    pub fn from_loaders<D, M>(
        data_loader: D,
        mask_loader: M,
        meta: ScanMetadata,
        cc_number: i64,
    ) -> CoarseChannel
    where
        D: FnOnce() -> Result<Array2<f32>, BlissError> + Send + 'static,
        M: FnOnce() -> Result<Array2<u8>, BlissError> + Send + 'static,
    {
        CoarseChannel {
            cc_number,
            meta,
            data: CachedProduct::pending(data_loader),
            mask: CachedProduct::pending(mask_loader),
            noise_stats: None,
            drift_plane: None,
            hits: None,
            device: Device::default(),
        }
    }

    /// A channel over tensors already in memory.
    pub fn from_tensors(
        data: Array2<f32>,
        mask: Array2<u8>,
        meta: ScanMetadata,
        cc_number: i64,
    ) -> CoarseChannel {
        assert_eq!(
            data.dim(),
            (meta.ntsteps, meta.nchans),
            "data shape {:?} does not match metadata [{}, {}]",
            data.dim(),
            meta.ntsteps,
            meta.nchans
        );
        assert_eq!(
            data.dim(),
            mask.dim(),
            "mask shape {:?} does not match data shape {:?}",
            mask.dim(),
            data.dim()
        );
        CoarseChannel {
            cc_number,
            meta,
            data: CachedProduct::ready(data),
            mask: CachedProduct::ready(mask),
            noise_stats: None,
            drift_plane: None,
            hits: None,
            device: Device::default(),
        }
    }

    /// The `[time, frequency]` spectrogram, loading it on first access.
    pub fn data(&self) -> Result<Arc<Array2<f32>>, BlissError> {
        self.data.get()
    }

    /// Replace the spectrogram (e.g. after an external normalization pass).
    pub fn set_data(&mut self, new_data: Array2<f32>) {
        assert_eq!(
            new_data.dim(),
            (self.meta.ntsteps, self.meta.nchans),
            "replacement data shape {:?} does not match metadata [{}, {}]",
            new_data.dim(),
            self.meta.ntsteps,
            self.meta.nchans
        );
        self.data = CachedProduct::ready(new_data);
    }

    /// The `[time, frequency]` RFI mask, loading it on first access.
    pub fn mask(&self) -> Result<Arc<Array2<u8>>, BlissError> {
        self.mask.get()
    }

    /// Replace the mask (e.g. after an external flagging pass).
    pub fn set_mask(&mut self, new_mask: Array2<u8>) {
        assert_eq!(
            new_mask.dim(),
            (self.meta.ntsteps, self.meta.nchans),
            "replacement mask shape {:?} does not match metadata [{}, {}]",
            new_mask.dim(),
            self.meta.ntsteps,
            self.meta.nchans
        );
        self.mask = CachedProduct::ready(new_mask);
    }

    /// The noise statistics attached by an external estimator.
    ///
    /// Panics when no estimate has been attached; scheduling a hit search
    /// without running an estimator first is a programming error, not a
    /// recoverable condition.
    pub fn noise_estimate(&self) -> NoiseStats {
        match self.noise_stats {
            Some(stats) => stats,
            None => panic!(
                "no noise estimate is attached to coarse channel {}; noise estimators run \
                 outside this crate and their result must be set before the hit search",
                self.cc_number
            ),
        }
    }

    pub fn has_noise_estimate(&self) -> bool {
        self.noise_stats.is_some()
    }

    pub fn set_noise_estimate(&mut self, estimate: NoiseStats) {
        self.noise_stats = Some(estimate);
    }

    /// The integrated drift plane, computing it on first access if drift
    /// integration was scheduled lazily.
    ///
    /// Panics when integration was never scheduled for this channel.
    pub fn drift_plane(&self) -> Result<Arc<FrequencyDriftPlane>, BlissError> {
        match &self.drift_plane {
            Some(cell) => cell.get(),
            None => panic!(
                "drift integration was never scheduled for coarse channel {}",
                self.cc_number
            ),
        }
    }

    /// The drift plane if it has already been materialized. Never triggers
    /// the computation.
    pub fn drift_plane_if_computed(&self) -> Option<Arc<FrequencyDriftPlane>> {
        self.drift_plane.as_ref().and_then(CachedProduct::peek)
    }

    pub fn has_drift_plane(&self) -> bool {
        self.drift_plane.is_some()
    }

    pub fn set_drift_plane(&mut self, plane: FrequencyDriftPlane) {
        self.drift_plane = Some(CachedProduct::ready(plane));
    }

    /// Schedule the drift plane to be computed on first access.
    pub fn set_drift_plane_with<F>(&mut self, generator: F)
    where
        F: FnOnce() -> Result<FrequencyDriftPlane, BlissError> + Send + 'static,
    {
        self.drift_plane = Some(CachedProduct::pending(generator));
    }

    /// The detected hits, running the scheduled search on first access.
    ///
    /// Panics when no hit search was ever scheduled for this channel.
    pub fn hits(&self) -> Result<Vec<Hit>, BlissError> {
        match &self.hits {
            Some(cell) => cell.get().map(|hits| (*hits).clone()),
            None => panic!(
                "no hit search was scheduled for coarse channel {}",
                self.cc_number
            ),
        }
    }

    pub fn has_hits(&self) -> bool {
        self.hits.is_some()
    }

    /// Have the hits actually been computed (as opposed to merely
    /// scheduled)?
    pub fn hits_are_computed(&self) -> bool {
        self.hits.as_ref().map_or(false, CachedProduct::is_ready)
    }

    pub fn set_hits(&mut self, new_hits: Vec<Hit>) {
        self.hits = Some(CachedProduct::ready(new_hits));
    }

    /// Schedule a hit search to run on first access.
    pub fn set_hits_with<F>(&mut self, generator: F)
    where
        F: FnOnce() -> Result<Vec<Hit>, BlissError> + Send + 'static,
    {
        self.hits = Some(CachedProduct::pending(generator));
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Record the device this channel should compute on. Tensors are not
    /// moved until the next data access or an explicit
    /// [`CoarseChannel::push_device`].
    pub fn set_device(&mut self, device: Device) {
        self.device = device;
    }

    /// Move all materialized tensors to the configured device now. Host
    /// memory is uniform, so with only the CPU backend compiled this is a
    /// synchronization point and nothing more.
    pub fn push_device(&mut self) {
        match self.device {
            Device::Cpu => {}
        }
    }

    // Metadata proxies.
    pub fn metadata(&self) -> &ScanMetadata {
        &self.meta
    }

    pub fn cc_number(&self) -> i64 {
        self.cc_number
    }

    pub fn fch1(&self) -> f64 {
        self.meta.fch1
    }

    pub fn foff(&self) -> f64 {
        self.meta.foff
    }

    pub fn tsamp(&self) -> f64 {
        self.meta.tsamp
    }

    pub fn tstart(&self) -> f64 {
        self.meta.tstart
    }

    pub fn nchans(&self) -> usize {
        self.meta.nchans
    }

    pub fn ntsteps(&self) -> usize {
        self.meta.ntsteps
    }

    pub fn source_name(&self) -> &str {
        &self.meta.source_name
    }
}

impl fmt::Debug for CoarseChannel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CoarseChannel")
            .field("cc_number", &self.cc_number)
            .field("fch1", &self.meta.fch1)
            .field("foff", &self.meta.foff)
            .field("nchans", &self.meta.nchans)
            .field("ntsteps", &self.meta.ntsteps)
            .field("data", &self.data)
            .field("mask", &self.mask)
            .field("noise_stats", &self.noise_stats)
            .field("drift_plane", &self.drift_plane)
            .field("hits", &self.hits)
            .field("device", &self.device)
            .finish()
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A scan: one observation's worth of spectrogram data, partitioned into
//! coarse channels and carrying the lazy processing pipeline.
//!
//! A [`Scan`] connects a [`ScanDataSource`] to the per-channel machinery.
//! Reading a coarse channel constructs it from hyperslab readers (once),
//! assigns the scan's device, then applies the scan's ordered transform
//! stages to a clone; products cached inside a channel survive across reads
//! because they are reference counted. Channels are independent, so hit
//! collection parallelizes channel-wise.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, trace, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::coarse_channel::CoarseChannel;
use crate::data_source::{DataError, ScanDataSource};
use crate::device::{Device, DeviceError};
use crate::drift_search::Hit;
use crate::error::BlissError;

/// Observation metadata for a scan or a coarse channel sliced out of one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanMetadata {
    /// Frequency of the first channel \[MHz\].
    pub fch1: f64,
    /// Channel bandwidth \[MHz\]; negative for inverted bands.
    pub foff: f64,
    /// Sampling time per spectrum \[seconds\].
    pub tsamp: f64,
    /// Observation start time \[MJD\].
    pub tstart: f64,
    /// Name of the observed source.
    pub source_name: String,
    /// Number of fine frequency channels.
    pub nchans: usize,
    /// Number of time integration steps.
    pub ntsteps: usize,

    // Optional telescope/hardware context.
    pub machine_id: Option<i64>,
    pub telescope_id: Option<i64>,
    /// Source right ascension (J2000).
    pub src_raj: Option<f64>,
    /// Source declination (J2000).
    pub src_dej: Option<f64>,
    pub az_start: Option<f64>,
    pub za_start: Option<f64>,
    /// Data type id; 1 is a float32 filterbank.
    pub data_type: i64,
    pub nbits: Option<i64>,
    pub nifs: Option<usize>,
}

impl Default for ScanMetadata {
    fn default() -> ScanMetadata {
        ScanMetadata {
            fch1: 0.0,
            foff: 0.0,
            tsamp: 0.0,
            tstart: 0.0,
            source_name: String::new(),
            nchans: 0,
            ntsteps: 0,
            machine_id: None,
            telescope_id: None,
            src_raj: None,
            src_dej: None,
            az_start: None,
            za_start: None,
            data_type: 1,
            nbits: None,
            nifs: None,
        }
    }
}

impl ScanMetadata {
    /// Check the invariants every downstream stage relies on.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.foff == 0.0 {
            return Err(DataError::InvalidMetadata {
                field: "foff",
                value: "0 MHz per channel".to_string(),
            });
        }
        if self.tsamp <= 0.0 {
            return Err(DataError::InvalidMetadata {
                field: "tsamp",
                value: format!("{} s", self.tsamp),
            });
        }
        if self.ntsteps < 2 {
            warn!(
                "scan of {} has {} time step(s); drift search needs at least 2",
                self.source_name, self.ntsteps
            );
        }
        Ok(())
    }

    /// The wall-clock span of the scan \[seconds\].
    pub fn tduration_secs(&self) -> f64 {
        self.ntsteps as f64 * self.tsamp
    }
}

/// One stage of the per-channel processing pipeline.
#[derive(Clone)]
pub struct TransformStage {
    pub description: String,
    pub transform: Arc<dyn Fn(CoarseChannel) -> Result<CoarseChannel, BlissError> + Send + Sync>,
}

/*
 * Known telescope channelization schemes: fine channels per coarse,
 * frequency resolution [Hz], time resolution [s], revision name.
 */
#[rustfmt::skip]
const KNOWN_CHANNELIZATIONS: [(usize, f64, f64, &str); 9] = [
    (1_033_216,       2.84, 17.98,        "HSR-Rev1A"),
    (        8, 366_210.0,   0.000_349_53, "HTR-Rev1A"),
    (    1_024,   2_860.0,   1.06,         "MR-Rev1A"),

    (  999_424,       2.93, 17.4,          "HSR-Rev1B"),
    (        8, 366_210.0,   0.000_349_53, "HTR-Rev1B"),
    (    1_024,   2_860.0,   1.02,         "MR-Rev1B"),

    (1_048_576,       2.79, 18.25,         "HSR-Rev2A"),
    (        8, 366_210.0,   0.000_349_53, "HTR-Rev2A"),
    (    1_024,   2_860.0,   1.07,         "MR-Rev2A"),
];

/// Deduce the coarse channelization from resolution metadata.
///
/// Returns (number of coarse channels, fine channels per coarse). Falls back
/// to rounding from 2^18 then 10^6 fine channels per coarse, and finally to
/// a single coarse channel spanning the band.
pub(crate) fn infer_channelization(nchans: usize, foff_mhz: f64, tsamp: f64) -> (usize, usize) {
    let foff_hz = (foff_mhz * 1e6).abs();
    for &(fine_per_coarse, freq_res, time_res, revision) in KNOWN_CHANNELIZATIONS.iter() {
        let num_coarse = nchans / fine_per_coarse;
        if num_coarse * fine_per_coarse == nchans
            && (foff_hz - freq_res).abs() < 0.1
            && (tsamp - time_res).abs() < 0.1
        {
            debug!(
                "matched {revision} channelization: {num_coarse} coarse channels of \
                 {fine_per_coarse} fine channels"
            );
            return (num_coarse, fine_per_coarse);
        }
    }

    for common in [1_usize << 18, 1_000_000] {
        let num_coarse = nchans / common;
        if num_coarse > 0 {
            let fine_per_coarse = common + (nchans % common) / num_coarse;
            if fine_per_coarse * num_coarse == nchans {
                warn!(
                    "scan with {nchans} fine channels matches no known channelization scheme; \
                     rounding from {common} fine channels per coarse gives {num_coarse} coarse \
                     channels of {fine_per_coarse}"
                );
                return (num_coarse, fine_per_coarse);
            }
        }
    }

    warn!(
        "scan with {nchans} fine channels matches no known channelization scheme; \
         treating the band as a single coarse channel"
    );
    (1, nchans)
}

/// A single observation, partitioned into coarse channels.
#[derive(Clone)]
pub struct Scan {
    meta: ScanMetadata,
    data_source: Option<Arc<dyn ScanDataSource>>,
    /// Channels constructed so far, keyed by their index *within this scan*
    /// (slices re-key from zero).
    channels: BTreeMap<usize, CoarseChannel>,
    pipeline: Vec<TransformStage>,
    fine_channels_per_coarse: usize,
    num_coarse_channels: usize,
    /// Index of this scan's first coarse channel within the data source's
    /// full band; nonzero after slicing.
    coarse_channel_offset: usize,
    device: Device,
}

impl Scan {
    /// Connect a scan to a data source.
    ///
    /// With `fine_channels_per_coarse == 0` the channelization is inferred
    /// from the metadata; an explicit value that does not divide the number
    /// of fine channels is a data error.
    pub fn from_data_source(
        data_source: Arc<dyn ScanDataSource>,
        fine_channels_per_coarse: usize,
    ) -> Result<Scan, BlissError> {
        let shape = data_source.data_shape();
        let [ntsteps, nfeeds, nchans] = match shape.as_slice() {
            [t, feeds, f] => [*t, *feeds, *f],
            _ => return Err(DataError::UnexpectedShape { got: shape }.into()),
        };
        if nfeeds != 1 {
            return Err(DataError::MultipleFeeds { feeds: nfeeds }.into());
        }

        let meta = ScanMetadata {
            fch1: data_source.fch1()?,
            foff: data_source.foff()?,
            tsamp: data_source.tsamp()?,
            tstart: data_source.tstart()?,
            source_name: data_source.source_name()?,
            nchans,
            ntsteps,
            machine_id: data_source.machine_id(),
            telescope_id: data_source.telescope_id(),
            src_raj: data_source.src_raj(),
            src_dej: data_source.src_dej(),
            az_start: data_source.az_start(),
            za_start: data_source.za_start(),
            data_type: data_source.data_type().unwrap_or(1),
            nbits: data_source.nbits(),
            nifs: data_source.nifs(),
        };
        meta.validate()?;

        let (num_coarse_channels, fine_channels_per_coarse) = if fine_channels_per_coarse == 0 {
            infer_channelization(nchans, meta.foff, meta.tsamp)
        } else {
            if nchans % fine_channels_per_coarse != 0 {
                return Err(DataError::ChannelizationMismatch {
                    nchans,
                    fine_per_coarse: fine_channels_per_coarse,
                }
                .into());
            }
            (nchans / fine_channels_per_coarse, fine_channels_per_coarse)
        };
        trace!(
            "scan of {} from {}: {} x {} samples, {} coarse channels",
            meta.source_name,
            data_source.origin(),
            ntsteps,
            nchans,
            num_coarse_channels
        );

        Ok(Scan {
            meta,
            data_source: Some(data_source),
            channels: BTreeMap::new(),
            pipeline: vec![],
            fine_channels_per_coarse,
            num_coarse_channels,
            coarse_channel_offset: 0,
            device: Device::default(),
        })
    }

    /// Build a scan directly from already-constructed coarse channels
    /// (index order is preserved). Metadata is taken from the first channel.
    pub fn from_coarse_channels(coarse_channels: Vec<CoarseChannel>) -> Scan {
        assert!(
            !coarse_channels.is_empty(),
            "a scan needs at least one coarse channel"
        );
        let first = &coarse_channels[0];
        let num = coarse_channels.len();
        let mut meta = first.metadata().clone();
        let fine_channels_per_coarse = first.nchans();
        meta.nchans = fine_channels_per_coarse * num;

        Scan {
            meta,
            data_source: None,
            channels: coarse_channels.into_iter().enumerate().collect(),
            pipeline: vec![],
            fine_channels_per_coarse,
            num_coarse_channels: num,
            coarse_channel_offset: 0,
            device: Device::default(),
        }
    }

    /// Add a processing stage applied to every coarse channel on read.
    pub fn add_coarse_channel_transform<F>(&mut self, description: impl Into<String>, transform: F)
    where
        F: Fn(CoarseChannel) -> Result<CoarseChannel, BlissError> + Send + Sync + 'static,
    {
        self.pipeline.push(TransformStage {
            description: description.into(),
            transform: Arc::new(transform),
        });
    }

    /// The descriptions of the scheduled pipeline stages, in order.
    pub fn pipeline_descriptions(&self) -> Vec<&str> {
        self.pipeline
            .iter()
            .map(|stage| stage.description.as_str())
            .collect()
    }

    /// Construct (but do not process) the coarse channel at `index`,
    /// reusing the cached construction from an earlier read if present.
    fn ensure_channel(&mut self, index: usize) -> Result<(), BlissError> {
        if self.channels.contains_key(&index) {
            return Ok(());
        }
        let data_source = match self.data_source.as_ref() {
            Some(ds) => Arc::clone(ds),
            None => panic!(
                "coarse channel {index} is not loaded and this scan has no data source to \
                 read it from"
            ),
        };

        let fine = self.fine_channels_per_coarse;
        let global_index = self.coarse_channel_offset + index;
        let ntsteps = self.meta.ntsteps;
        let mut cc_meta = self.meta.clone();
        cc_meta.fch1 = self.meta.fch1 + self.meta.foff * (index * fine) as f64;
        cc_meta.nchans = fine;

        let offset = [0, 0, global_index * fine];
        let count = [ntsteps, 1, fine];
        let mask_source = Arc::clone(&data_source);
        let mut cc = CoarseChannel::from_loaders(
            move || data_source.read_data(offset, count).map_err(BlissError::from),
            move || mask_source.read_mask(offset, count).map_err(BlissError::from),
            cc_meta,
            global_index as i64,
        );
        cc.set_device(self.device);
        self.channels.insert(index, cc);
        Ok(())
    }

    /// Apply the device assignment and pipeline to a clone of the cached
    /// channel at `index`.
    fn process_channel(&self, index: usize) -> Result<CoarseChannel, BlissError> {
        let mut cc = self
            .channels
            .get(&index)
            .unwrap_or_else(|| panic!("coarse channel {index} has not been constructed"))
            .clone();
        cc.set_device(self.device);
        for stage in &self.pipeline {
            trace!(
                "applying \"{}\" to coarse channel {}",
                stage.description,
                cc.cc_number()
            );
            cc = (stage.transform)(cc)?;
        }
        Ok(cc)
    }

    /// Read a coarse channel: construct it if needed, set the device, and
    /// apply the pipeline stages in order.
    ///
    /// The pipeline runs freshly on each read; products cached inside the
    /// channel (tensors, drift plane, hits) are shared, so repeated reads do
    /// not repeat the expensive work their generators already did for a
    /// retained channel.
    pub fn read_coarse_channel(&mut self, index: usize) -> Result<CoarseChannel, BlissError> {
        assert!(
            index < self.num_coarse_channels,
            "coarse channel index {index} out of range for a scan with {} coarse channels",
            self.num_coarse_channels
        );
        self.ensure_channel(index)?;
        self.process_channel(index)
    }

    /// The coarse channel at `index`, with the pipeline applied, if an
    /// earlier read already constructed it; `None` otherwise. Never triggers
    /// a data-source read.
    pub fn peek_coarse_channel(&self, index: usize) -> Result<Option<CoarseChannel>, BlissError> {
        assert!(
            index < self.num_coarse_channels,
            "coarse channel index {index} out of range for a scan with {} coarse channels",
            self.num_coarse_channels
        );
        if !self.channels.contains_key(&index) {
            return Ok(None);
        }
        self.process_channel(index).map(Some)
    }

    /// Collect the hits of every coarse channel, sorted by the hit ordering.
    ///
    /// Channels are independent; they are processed in parallel. A channel
    /// whose pipeline never scheduled a hit search contributes nothing and
    /// is reported as a warning (it usually indicates a mis-built pipeline).
    pub fn hits(&mut self) -> Result<Vec<Hit>, BlissError> {
        for index in 0..self.num_coarse_channels {
            self.ensure_channel(index)?;
        }
        let scan = &*self;
        let per_channel = (0..scan.num_coarse_channels)
            .into_par_iter()
            .map(|index| {
                let cc = scan.process_channel(index)?;
                if cc.has_hits() {
                    cc.hits()
                } else {
                    warn!(
                        "no hit search was scheduled for coarse channel {index}; \
                         this might indicate a bad pipeline"
                    );
                    Ok(vec![])
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut hits: Vec<Hit> = per_channel.into_iter().flatten().collect();
        hits.sort_unstable();
        Ok(hits)
    }

    /// The extremes of the searched drift rates \[Hz/s\] across all
    /// channels, reading each channel (and computing its scheduled drift
    /// plane) as needed. Channels without a scheduled integration are
    /// skipped with a warning; `None` when no channel has one.
    pub fn drift_range(&mut self) -> Result<Option<(f64, f64)>, BlissError> {
        let mut range: Option<(f64, f64)> = None;
        for index in 0..self.num_coarse_channels {
            let cc = self.read_coarse_channel(index)?;
            if !cc.has_drift_plane() {
                warn!(
                    "no drift integration was scheduled for coarse channel {index}; \
                     skipping it in the drift range"
                );
                continue;
            }
            let plane = cc.drift_plane()?;
            for rate in plane.drift_rates() {
                let r = rate.rate_hz_per_sec;
                range = Some(match range {
                    None => (r, r),
                    Some((lo, hi)) => (lo.min(r), hi.max(r)),
                });
            }
        }
        Ok(range)
    }

    /// Which coarse channel contains `frequency` \[MHz\]? `None` when the
    /// frequency falls outside the scan's band.
    pub fn coarse_channel_with_frequency(&self, frequency: f64) -> Option<usize> {
        let fine = ((frequency - self.meta.fch1) / self.meta.foff).floor();
        if fine < 0.0 || fine >= self.meta.nchans as f64 {
            return None;
        }
        Some(fine as usize / self.fine_channels_per_coarse)
    }

    /// A scan over a contiguous subset of this scan's coarse channels.
    ///
    /// The slice shares the data source and any already-constructed channels;
    /// out-of-range requests are programmer errors.
    pub fn slice_scan_channels(&self, start_channel: usize, count: usize) -> Scan {
        assert!(count >= 1, "a scan slice needs at least one coarse channel");
        assert!(
            start_channel + count <= self.num_coarse_channels,
            "slice [{start_channel}, {}) out of range for a scan with {} coarse channels",
            start_channel + count,
            self.num_coarse_channels
        );

        let fine = self.fine_channels_per_coarse;
        let mut meta = self.meta.clone();
        meta.fch1 = self.meta.fch1 + self.meta.foff * (start_channel * fine) as f64;
        meta.nchans = count * fine;

        let channels = self
            .channels
            .iter()
            .filter_map(|(&index, cc)| {
                (start_channel..start_channel + count)
                    .contains(&index)
                    .then(|| (index - start_channel, cc.clone()))
            })
            .collect();

        Scan {
            meta,
            data_source: self.data_source.clone(),
            channels,
            pipeline: self.pipeline.clone(),
            fine_channels_per_coarse: fine,
            num_coarse_channels: count,
            coarse_channel_offset: self.coarse_channel_offset + start_channel,
            device: self.device,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Record the device for this scan and all its channels, present and
    /// future. Memory moves on next access or an explicit
    /// [`Scan::push_device`].
    pub fn set_device(&mut self, device: Device) {
        self.device = device;
        for cc in self.channels.values_mut() {
            cc.set_device(device);
        }
    }

    /// [`Scan::set_device`] from a device name string.
    pub fn set_device_name(&mut self, name: &str) -> Result<(), DeviceError> {
        let device = name.parse::<Device>()?;
        self.set_device(device);
        Ok(())
    }

    /// Move all loaded channels' tensors to the configured device now.
    pub fn push_device(&mut self) {
        for cc in self.channels.values_mut() {
            cc.push_device();
        }
    }

    pub fn number_coarse_channels(&self) -> usize {
        self.num_coarse_channels
    }

    pub fn fine_channels_per_coarse(&self) -> usize {
        self.fine_channels_per_coarse
    }

    // Metadata proxies.
    pub fn metadata(&self) -> &ScanMetadata {
        &self.meta
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

    pub fn tduration_secs(&self) -> f64 {
        self.meta.tduration_secs()
    }
}

impl fmt::Debug for Scan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Scan")
            .field("source_name", &self.meta.source_name)
            .field("fch1", &self.meta.fch1)
            .field("foff", &self.meta.foff)
            .field("nchans", &self.meta.nchans)
            .field("ntsteps", &self.meta.ntsteps)
            .field("num_coarse_channels", &self.num_coarse_channels)
            .field("coarse_channel_offset", &self.coarse_channel_offset)
            .field("loaded_channels", &self.channels.len())
            .field("pipeline", &self.pipeline_descriptions())
            .field("device", &self.device)
            .finish()
    }
}

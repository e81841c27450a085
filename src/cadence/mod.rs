// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Observation targets and cadences.
//!
//! A cadence is an ordered sequence of observation targets, e.g. the ABACAD
//! pattern used for single-dish SETI: the first target is the primary (ON)
//! source and every other target contributes OFF scans. Signals present in
//! both ON and OFF pointings are terrestrial interference.


use std::fmt;

use log::warn;
use thiserror::Error;
use vec1::Vec1;

use crate::scan::Scan;

#[derive(Error, Debug)]
pub enum CadenceError {
    #[error(
        "the scans of target {target} disagree on frequency structure (fch1/foff/nchans) \
         and cannot be treated as one band"
    )]
    InconsistentScans { target: String },
}

/// One celestial target and the scans pointed at it.
#[derive(Clone)]
pub struct ObservationTarget {
    pub target_name: String,
    pub scans: Vec<Scan>,
}

/// Do all scans share the frequency structure of the first?
fn scans_are_consistent<'a>(mut scans: impl Iterator<Item = &'a Scan>) -> bool {
    match scans.next() {
        None => true,
        Some(first) => scans.all(|scan| {
            scan.fch1() == first.fch1()
                && scan.foff() == first.foff()
                && scan.nchans() == first.nchans()
        }),
    }
}

impl ObservationTarget {
    /// Group scans of one source. The target name is taken from the first
    /// scan.
    pub fn new(scans: Vec<Scan>) -> ObservationTarget {
        let target_name = scans
            .first()
            .map(|scan| scan.source_name().to_string())
            .unwrap_or_default();
        ObservationTarget { target_name, scans }
    }

    /// Check that all scans share a frequency structure. Inconsistency is a
    /// soft anomaly: it is logged here, and only the operations that rely on
    /// consistency turn it into an error.
    pub fn validate_scan_consistency(&self) -> bool {
        let consistent = scans_are_consistent(self.scans.iter());
        if !consistent {
            warn!(
                "scans of target {} disagree on frequency structure",
                self.target_name
            );
        }
        consistent
    }

    fn require_consistency(&self) -> Result<&Scan, CadenceError> {
        if !self.validate_scan_consistency() {
            return Err(CadenceError::InconsistentScans {
                target: self.target_name.clone(),
            });
        }
        self.scans.first().ok_or(CadenceError::InconsistentScans {
            target: self.target_name.clone(),
        })
    }

    /// The number of coarse channels per scan. Requires consistent scans.
    pub fn number_coarse_channels(&self) -> Result<usize, CadenceError> {
        Ok(self.require_consistency()?.number_coarse_channels())
    }

    /// Which coarse channel contains `frequency` \[MHz\]? Requires
    /// consistent scans; `None` when out of band.
    pub fn coarse_channel_with_frequency(
        &self,
        frequency: f64,
    ) -> Result<Option<usize>, CadenceError> {
        Ok(self
            .require_consistency()?
            .coarse_channel_with_frequency(frequency))
    }

    /// This target restricted to a contiguous range of coarse channels.
    pub fn slice_observation_channels(
        &self,
        start_channel: usize,
        count: usize,
    ) -> Result<ObservationTarget, CadenceError> {
        self.require_consistency()?;
        Ok(ObservationTarget {
            target_name: self.target_name.clone(),
            scans: self
                .scans
                .iter()
                .map(|scan| scan.slice_scan_channels(start_channel, count))
                .collect(),
        })
    }
}

impl fmt::Debug for ObservationTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ObservationTarget")
            .field("target_name", &self.target_name)
            .field("num_scans", &self.scans.len())
            .finish()
    }
}

/// An ordered sequence of observation targets. The first target is the
/// primary (ON) source; every other target contributes OFF scans.
#[derive(Clone, Debug)]
pub struct Cadence {
    pub observations: Vec1<ObservationTarget>,
}

impl Cadence {
    pub fn new(observations: Vec1<ObservationTarget>) -> Cadence {
        Cadence { observations }
    }

    /// The primary (ON) target.
    pub fn primary_target(&self) -> &ObservationTarget {
        self.observations.first()
    }

    /// Every scan not belonging to the primary target.
    pub fn off_scans(&self) -> Vec<&Scan> {
        self.observations
            .iter()
            .skip(1)
            .flat_map(|target| target.scans.iter())
            .collect()
    }

    /// Check frequency-structure consistency across every scan of every
    /// target. Soft anomaly: logged, not fatal.
    pub fn validate_scan_consistency(&self) -> bool {
        let consistent = scans_are_consistent(
            self.observations
                .iter()
                .flat_map(|target| target.scans.iter()),
        );
        if !consistent {
            warn!("scans across this cadence disagree on frequency structure");
        }
        consistent
    }

    fn require_consistency(&self) -> Result<(), CadenceError> {
        if self.validate_scan_consistency() {
            Ok(())
        } else {
            Err(CadenceError::InconsistentScans {
                target: format!("cadence starting at {}", self.primary_target().target_name),
            })
        }
    }

    /// The number of coarse channels per scan. Requires a consistent
    /// cadence.
    pub fn number_coarse_channels(&self) -> Result<usize, CadenceError> {
        self.require_consistency()?;
        self.primary_target().number_coarse_channels()
    }

    /// Which coarse channel contains `frequency` \[MHz\]? Requires a
    /// consistent cadence; `None` when out of band.
    pub fn coarse_channel_with_frequency(
        &self,
        frequency: f64,
    ) -> Result<Option<usize>, CadenceError> {
        self.require_consistency()?;
        self.primary_target().coarse_channel_with_frequency(frequency)
    }

    /// This cadence restricted to a contiguous range of coarse channels.
    pub fn slice_cadence_channels(
        &self,
        start_channel: usize,
        count: usize,
    ) -> Result<Cadence, CadenceError> {
        self.require_consistency()?;
        let observations = self
            .observations
            .try_mapped_ref(|target| target.slice_observation_channels(start_channel, count))?;
        Ok(Cadence { observations })
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-sample RFI flag conventions and the flag tallies carried through
//! drift integration.
//!
//! Upstream flaggers mark every spectrogram sample with a bitmask; the drift
//! integrator then counts, for each flag class and each drift trajectory,
//! how many contributing samples carried that flag. Those counts travel with
//! hits so the hit filter can apply percentage rules without going back to
//! the raw mask.

#[cfg(test)]
mod tests;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Bit assignments for the per-sample RFI mask.
///
/// Bits 3, 6 and 7 are reserved. The values are part of the on-disk mask
/// convention shared with the flagger crates and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FlagValue {
    Unflagged = 0,
    /// The sample sits in the rolloff region of the polyphase filterbank.
    FilterRolloff = 1 << 0,
    /// Spectral kurtosis below the expected range for Gaussian noise.
    LowSpectralKurtosis = 1 << 1,
    /// Spectral kurtosis above the expected range for Gaussian noise.
    HighSpectralKurtosis = 1 << 2,
    /// Simple magnitude threshold.
    Magnitude = 1 << 4,
    /// An n-sigma statistical outlier.
    SigmaClip = 1 << 5,
}

impl FlagValue {
    /// The mask bit for this flag.
    pub const fn bit(self) -> u8 {
        self as u8
    }

    /// Is this flag set in `mask`?
    pub fn is_set_in(self, mask: u8) -> bool {
        match self {
            // The "flag" for clean data is the absence of all other bits.
            FlagValue::Unflagged => mask == 0,
            _ => mask & self.bit() != 0,
        }
    }
}

/// Per-hit tallies of flagged samples along the integrated trajectory.
///
/// Each count is the number of contributing time-frequency samples that
/// carried the corresponding flag, saturated at 255.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RfiCounts {
    pub low_spectral_kurtosis: u8,
    pub high_spectral_kurtosis: u8,
    pub sigma_clip: u8,
}

impl RfiCounts {
    /// Elementwise maximum, used when merging the pixels of a connected
    /// component into a single tally.
    pub fn max_with(self, other: RfiCounts) -> RfiCounts {
        RfiCounts {
            low_spectral_kurtosis: self.low_spectral_kurtosis.max(other.low_spectral_kurtosis),
            high_spectral_kurtosis: self
                .high_spectral_kurtosis
                .max(other.high_spectral_kurtosis),
            sigma_clip: self.sigma_clip.max(other.sigma_clip),
        }
    }
}

/// Flag counts for an integrated drift plane.
///
/// Unlike the raw time-frequency mask, these are `[drift, frequency]` planes:
/// each cell counts how many samples along that drift trajectory carried the
/// flag. Counts saturate at 255; with more than 255 contributing samples
/// (`integration_steps * desmeared_bins > 255`) the tally clips rather than
/// wrapping, which keeps the percentage filters conservative.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegratedFlags {
    pub low_spectral_kurtosis: Array2<u8>,
    pub high_spectral_kurtosis: Array2<u8>,
    pub sigma_clip: Array2<u8>,
}

impl IntegratedFlags {
    /// Zeroed count planes for `drifts` x `channels`.
    pub fn zeros(drifts: usize, channels: usize) -> IntegratedFlags {
        IntegratedFlags {
            low_spectral_kurtosis: Array2::zeros((drifts, channels)),
            high_spectral_kurtosis: Array2::zeros((drifts, channels)),
            sigma_clip: Array2::zeros((drifts, channels)),
        }
    }

    /// The tallies at one drift-plane cell.
    pub fn counts_at(&self, drift: usize, channel: usize) -> RfiCounts {
        RfiCounts {
            low_spectral_kurtosis: self.low_spectral_kurtosis[(drift, channel)],
            high_spectral_kurtosis: self.high_spectral_kurtosis[(drift, channel)],
            sigma_clip: self.sigma_clip[(drift, channel)],
        }
    }

    /// `[drifts, channels]` of the count planes.
    pub fn dim(&self) -> (usize, usize) {
        self.low_spectral_kurtosis.dim()
    }
}

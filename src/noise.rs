// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Noise statistics consumed by the drift search.
//!
//! The estimators that produce these numbers (standard deviation, median
//! absolute deviation, masked variants) live outside this crate; the search
//! only ever needs the two scalars per coarse channel.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scan::Scan;

/// The noise floor (mean) and noise power (variance) of one coarse channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseStats {
    noise_floor: f32,
    noise_power: f32,
}

impl NoiseStats {
    /// Bundle an externally estimated noise floor (mean) and noise power
    /// (variance).
    pub fn new(noise_floor: f32, noise_power: f32) -> NoiseStats {
        assert!(
            noise_power >= 0.0,
            "noise power is a variance and cannot be negative (got {noise_power})"
        );
        NoiseStats {
            noise_floor,
            noise_power,
        }
    }

    /// The estimated mean of the noise.
    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }

    /// The estimated variance of the noise.
    pub fn noise_power(&self) -> f32 {
        self.noise_power
    }

    /// The noise amplitude (square root of the power).
    pub fn noise_amplitude(&self) -> f32 {
        self.noise_power.sqrt()
    }
}

impl fmt::Display for NoiseStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "noise floor: {}  noise power: {}",
            self.noise_floor, self.noise_power
        )
    }
}

/// Schedule attaching `stats` to every coarse channel of `scan`.
///
/// Convenience for pipelines whose noise estimate is uniform across the
/// band; per-channel estimates can be attached with a custom transform
/// through [`Scan::add_coarse_channel_transform`].
pub fn apply_noise_estimate(mut scan: Scan, stats: NoiseStats) -> Scan {
    scan.add_coarse_channel_transform("apply noise estimate", move |mut cc| {
        cc.set_noise_estimate(stats);
        Ok(cc)
    });
    scan
}

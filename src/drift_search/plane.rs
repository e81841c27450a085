// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The frequency-drift plane: the result of de-Doppler integration for one
//! coarse channel.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::flagging::IntegratedFlags;

/// One drift trajectory searched during integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftRate {
    /// The row index in the drift plane.
    pub index_in_plane: usize,
    /// Frequency channels crossed per time step.
    pub slope: f64,
    /// The physical drift rate \[Hz/s\].
    pub rate_hz_per_sec: f64,
    /// Total frequency channels crossed over the scan; inherits the sign of
    /// the rate.
    pub channel_span: i64,
    /// Bins per spectrum summed to recover energy smeared by the drift.
    /// Always at least 1.
    pub desmeared_bins: usize,
}

/// The integrated drift plane and its bookkeeping.
///
/// The power tensor is `[drift, frequency]`; row `d` holds the trajectory
/// sums for `drift_rates[d]`. The flag planes (same shape) count flagged
/// samples along each trajectory. The plane is a *logical* object: searches
/// that cannot afford to materialize all of it at once stream drift-row
/// tiles instead (see
/// [`search_coarse_channel`](crate::drift_search::search_coarse_channel)).
#[derive(Debug, Clone)]
pub struct FrequencyDriftPlane {
    power: Array2<f32>,
    rfi: IntegratedFlags,
    /// Time steps summed into every cell. The total number of samples
    /// contributing to row `d` is `integration_steps * desmeared_bins[d]`.
    integration_steps: usize,
    drift_rates: Vec<DriftRate>,
    device: Device,
}

impl FrequencyDriftPlane {
    pub fn new(
        power: Array2<f32>,
        rfi: IntegratedFlags,
        integration_steps: usize,
        drift_rates: Vec<DriftRate>,
    ) -> FrequencyDriftPlane {
        assert_eq!(
            power.dim().0,
            drift_rates.len(),
            "drift plane has {} rows but {} drift rates",
            power.dim().0,
            drift_rates.len()
        );
        assert_eq!(
            power.dim(),
            rfi.dim(),
            "flag planes {:?} do not match the power plane {:?}",
            rfi.dim(),
            power.dim()
        );
        FrequencyDriftPlane {
            power,
            rfi,
            integration_steps,
            drift_rates,
            device: Device::default(),
        }
    }

    /// The integrated power, `[drift, frequency]`.
    pub fn power(&self) -> &Array2<f32> {
        &self.power
    }

    /// The flag tallies accumulated along each trajectory.
    pub fn rfi(&self) -> &IntegratedFlags {
        &self.rfi
    }

    /// Time steps summed into every cell.
    pub fn integration_steps(&self) -> usize {
        self.integration_steps
    }

    /// The searched drift rates, ordered by row index.
    pub fn drift_rates(&self) -> &[DriftRate] {
        &self.drift_rates
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Record the target device; memory moves on access or
    /// [`FrequencyDriftPlane::push_device`].
    pub fn set_device(&mut self, device: Device) {
        self.device = device;
    }

    /// Move the power and flag tensors to the configured device now.
    pub fn push_device(&mut self) {
        match self.device {
            Device::Cpu => {}
        }
    }
}

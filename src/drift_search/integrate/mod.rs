// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! De-Doppler integration: summing power along every candidate drift
//! trajectory.
//!
//! The kernel contract is device-specific but the results are identical up
//! to floating-point associativity; any backend that fails must surface the
//! error rather than hand back a zeroed plane.

pub(crate) mod cpu;
#[cfg(test)]
mod tests;

use log::debug;

use super::geometry::compute_drift_rates;
use super::plane::{DriftRate, FrequencyDriftPlane};
use super::IntegrateDriftsOptions;
use crate::coarse_channel::CoarseChannel;
use crate::device::Device;
use crate::error::BlissError;

/// Run drift integration for a coarse channel now, on the channel's device.
pub(crate) fn integrate_coarse_channel(
    cc: &CoarseChannel,
    options: &IntegrateDriftsOptions,
) -> Result<FrequencyDriftPlane, BlissError> {
    let drifts = compute_drift_rates(cc.ntsteps(), cc.foff(), cc.tsamp(), options);
    integrate_with_rates(cc, &drifts)
}

/// Run drift integration for an already-computed set of drift rates.
///
/// The rows of the returned plane correspond to `drift_rates` in order; the
/// tiled search driver uses this to integrate a slice of the full grid.
pub(crate) fn integrate_with_rates(
    cc: &CoarseChannel,
    drift_rates: &[DriftRate],
) -> Result<FrequencyDriftPlane, BlissError> {
    let data = cc.data()?;
    let mask = cc.mask()?;
    debug!(
        "integrating {} drift rates over coarse channel {} ({} x {})",
        drift_rates.len(),
        cc.cc_number(),
        cc.ntsteps(),
        cc.nchans()
    );

    let (power, rfi) = match cc.device() {
        Device::Cpu => cpu::integrate_linear_rounded_bins(&data, &mask, drift_rates),
    };

    Ok(FrequencyDriftPlane::new(
        power,
        rfi,
        cc.ntsteps(),
        drift_rates.to_vec(),
    ))
}

/// Schedule drift integration for a coarse channel: the plane is computed on
/// first access and cached, shared with every clone of the returned channel.
pub fn integrate_drifts(mut cc: CoarseChannel, options: IntegrateDriftsOptions) -> CoarseChannel {
    // The capture shares the data/mask cells with `cc`, so running the
    // generator does not re-read the tensors for a channel that already
    // loaded them.
    let captured = cc.clone();
    cc.set_drift_plane_with(move || integrate_coarse_channel(&captured, &options));
    cc
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The CPU reference kernel for de-Doppler integration.
//!
//! For every drift rate `d` and starting channel `f0`, the kernel sums
//! `data[t, round(slope * t) + f0 + b]` over all time steps `t` and desmear
//! bins `b`, and counts flagged contributing samples per flag class.
//! Trajectory samples outside the band contribute zero to both sums; the
//! nominal `integration_steps` is unchanged, which keeps noise scaling
//! uniform across the band at the cost of a mild edge effect downstream
//! filters can reject.
//!
//! Drift-plane rows are independent, so the kernel parallelizes over them.

use ndarray::prelude::*;
use ndarray::Zip;

use crate::flagging::{FlagValue, IntegratedFlags};

use super::super::plane::DriftRate;

/// Accumulate one time step's contribution to a drift row over the valid
/// starting-channel range for `shift`.
fn accumulate_shifted(
    power_row: &mut ArrayViewMut1<f32>,
    low_sk_row: &mut ArrayViewMut1<u8>,
    high_sk_row: &mut ArrayViewMut1<u8>,
    sigma_clip_row: &mut ArrayViewMut1<u8>,
    data_spectrum: &ArrayView1<f32>,
    mask_spectrum: &ArrayView1<u8>,
    shift: i64,
) {
    let nchans = data_spectrum.len() as i64;
    // Starting channels f0 with 0 <= f0 + shift < nchans.
    let dst_lo = (-shift).max(0);
    let dst_hi = (nchans - shift).min(nchans);
    if dst_lo >= dst_hi {
        return;
    }
    let (dst_lo, dst_hi) = (dst_lo as usize, dst_hi as usize);
    let src_lo = (dst_lo as i64 + shift) as usize;
    let src_hi = (dst_hi as i64 + shift) as usize;

    let mut power_dst = power_row.slice_mut(s![dst_lo..dst_hi]);
    power_dst += &data_spectrum.slice(s![src_lo..src_hi]);

    let mask_src = mask_spectrum.slice(s![src_lo..src_hi]);
    Zip::from(low_sk_row.slice_mut(s![dst_lo..dst_hi]))
        .and(&mask_src)
        .for_each(|count, &mask| {
            if mask & FlagValue::LowSpectralKurtosis.bit() != 0 {
                *count = count.saturating_add(1);
            }
        });
    Zip::from(high_sk_row.slice_mut(s![dst_lo..dst_hi]))
        .and(&mask_src)
        .for_each(|count, &mask| {
            if mask & FlagValue::HighSpectralKurtosis.bit() != 0 {
                *count = count.saturating_add(1);
            }
        });
    Zip::from(sigma_clip_row.slice_mut(s![dst_lo..dst_hi]))
        .and(&mask_src)
        .for_each(|count, &mask| {
            if mask & FlagValue::SigmaClip.bit() != 0 {
                *count = count.saturating_add(1);
            }
        });
}

/// Integrate along rounded-linear trajectories for every drift rate,
/// returning the power plane and the accumulated flag counts.
pub(crate) fn integrate_linear_rounded_bins(
    data: &Array2<f32>,
    mask: &Array2<u8>,
    drift_rates: &[DriftRate],
) -> (Array2<f32>, IntegratedFlags) {
    assert_eq!(
        data.dim(),
        mask.dim(),
        "mask shape {:?} does not match data shape {:?}",
        mask.dim(),
        data.dim()
    );
    let (ntsteps, nchans) = data.dim();

    let mut power = Array2::<f32>::zeros((drift_rates.len(), nchans));
    let mut rfi = IntegratedFlags::zeros(drift_rates.len(), nchans);

    Zip::indexed(power.rows_mut())
        .and(rfi.low_spectral_kurtosis.rows_mut())
        .and(rfi.high_spectral_kurtosis.rows_mut())
        .and(rfi.sigma_clip.rows_mut())
        .par_for_each(
            |drift_index, mut power_row, mut low_sk_row, mut high_sk_row, mut sigma_clip_row| {
                let rate = &drift_rates[drift_index];
                for t in 0..ntsteps {
                    let trajectory_offset = (rate.slope * t as f64).round() as i64;
                    let data_spectrum = data.row(t);
                    let mask_spectrum = mask.row(t);
                    for bin in 0..rate.desmeared_bins as i64 {
                        accumulate_shifted(
                            &mut power_row,
                            &mut low_sk_row,
                            &mut high_sk_row,
                            &mut sigma_clip_row,
                            &data_spectrum,
                            &mask_spectrum,
                            trajectory_offset + bin,
                        );
                    }
                }
            },
        );

    (power, rfi)
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::*;

#[test]
fn flag_bits_match_the_mask_convention() {
    assert_eq!(FlagValue::Unflagged.bit(), 0);
    assert_eq!(FlagValue::FilterRolloff.bit(), 1);
    assert_eq!(FlagValue::LowSpectralKurtosis.bit(), 2);
    assert_eq!(FlagValue::HighSpectralKurtosis.bit(), 4);
    assert_eq!(FlagValue::Magnitude.bit(), 16);
    assert_eq!(FlagValue::SigmaClip.bit(), 32);
}

#[test]
fn is_set_in_handles_combined_masks() {
    let mask = FlagValue::SigmaClip.bit() | FlagValue::LowSpectralKurtosis.bit();
    assert!(FlagValue::SigmaClip.is_set_in(mask));
    assert!(FlagValue::LowSpectralKurtosis.is_set_in(mask));
    assert!(!FlagValue::HighSpectralKurtosis.is_set_in(mask));
    assert!(!FlagValue::Unflagged.is_set_in(mask));
    assert!(FlagValue::Unflagged.is_set_in(0));
}

#[test]
fn rfi_counts_merge_elementwise() {
    let a = RfiCounts {
        low_spectral_kurtosis: 3,
        high_spectral_kurtosis: 0,
        sigma_clip: 200,
    };
    let b = RfiCounts {
        low_spectral_kurtosis: 1,
        high_spectral_kurtosis: 7,
        sigma_clip: 199,
    };
    let merged = a.max_with(b);
    assert_eq!(merged.low_spectral_kurtosis, 3);
    assert_eq!(merged.high_spectral_kurtosis, 7);
    assert_eq!(merged.sigma_clip, 200);
}

#[test]
fn integrated_flags_start_zeroed_and_index_correctly() {
    let mut flags = IntegratedFlags::zeros(4, 8);
    assert_eq!(flags.dim(), (4, 8));
    assert_eq!(flags.counts_at(2, 5), RfiCounts::default());

    flags.sigma_clip[(2, 5)] = 9;
    flags.high_spectral_kurtosis[(2, 5)] = 2;
    let counts = flags.counts_at(2, 5);
    assert_eq!(counts.sigma_clip, 9);
    assert_eq!(counts.high_spectral_kurtosis, 2);
    assert_eq!(counts.low_spectral_kurtosis, 0);
}

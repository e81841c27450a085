// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Rule-based hit rejection.

use serde::{Deserialize, Serialize};

use super::hit::Hit;
use crate::flagging::RfiCounts;

/// Drift rates below this magnitude \[Hz/s\] count as zero drift.
const ZERO_DRIFT_EPS: f64 = 1e-6;

/// Which hits to reject.
///
/// The sigma-clip and high-SK rules read inverted at first sight: those
/// flags mean "this sample was examined and *passed* the estimator's
/// non-RFI test". A hit whose trajectory has too few such flags sits in a
/// region the estimator never vetted, so it is the *low* counts that get
/// rejected. The low-SK rule is the conventional direction: too many
/// low-kurtosis samples means structured interference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    /// Reject hits with (effectively) zero drift; stationary tones are
    /// almost always local RFI.
    pub filter_zero_drift: bool,

    /// Reject hits with too few sigma-clip-vetted samples.
    pub filter_sigmaclip: bool,
    /// Minimum fraction of integrated samples that must carry the
    /// sigma-clip flag.
    pub minimum_percent_sigmaclip: f32,

    /// Reject hits with too few high-SK-vetted samples.
    pub filter_high_sk: bool,
    /// Minimum fraction of integrated samples that must carry the high-SK
    /// flag.
    pub minimum_percent_high_sk: f32,

    /// Reject hits with too many low-SK samples.
    pub filter_low_sk: bool,
    /// Maximum fraction of integrated samples allowed to carry the low-SK
    /// flag.
    pub maximum_percent_low_sk: f32,
}

impl Default for FilterOptions {
    fn default() -> FilterOptions {
        FilterOptions {
            filter_zero_drift: true,
            filter_sigmaclip: true,
            minimum_percent_sigmaclip: 0.1,
            filter_high_sk: false,
            minimum_percent_high_sk: 0.1,
            filter_low_sk: false,
            maximum_percent_low_sk: 0.1,
        }
    }
}

fn rejected(hit: &Hit, options: &FilterOptions) -> bool {
    if options.filter_zero_drift && hit.drift_rate_hz_per_sec.abs() < ZERO_DRIFT_EPS {
        return true;
    }

    let integrated = hit.integrated_channels as f32;
    let RfiCounts {
        low_spectral_kurtosis,
        high_spectral_kurtosis,
        sigma_clip,
    } = hit.rfi_counts;

    if options.filter_sigmaclip
        && f32::from(sigma_clip) < integrated * options.minimum_percent_sigmaclip
    {
        return true;
    }
    if options.filter_high_sk
        && f32::from(high_spectral_kurtosis) < integrated * options.minimum_percent_high_sk
    {
        return true;
    }
    if options.filter_low_sk
        && f32::from(low_spectral_kurtosis) > integrated * options.maximum_percent_low_sk
    {
        return true;
    }
    false
}

/// Drop every hit matching a rejection rule. Filtering is a fixed point:
/// running it twice with the same options removes nothing new.
pub fn filter_hits(mut hits: Vec<Hit>, options: &FilterOptions) -> Vec<Hit> {
    hits.retain(|hit| !rejected(hit, options));
    hits
}

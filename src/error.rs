// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all bliss-related errors.
//!
//! Failures come in three kinds and are handled differently:
//!
//! 1. Programmer errors (dispatching a kernel with tensors on mismatched
//!    devices, reading hits from a channel where no detection was ever
//!    scheduled, slicing with out-of-range indices) panic with a descriptive
//!    message. They are never represented as a `Result` and never caught
//!    inside this crate.
//! 2. Data errors (missing mandatory metadata, unexpected tensor shapes,
//!    impossible channelization requests) are surfaced as [`BlissError`]
//!    values so the caller can decide whether to proceed in a degraded mode.
//! 3. Soft anomalies (inconsistent scans within a cadence, unrecognized
//!    channelization schemes) are reported as `log::warn!` messages;
//!    operations that actually require the violated precondition raise a
//!    data error when they run.

use thiserror::Error;

use crate::cadence::CadenceError;
use crate::data_source::DataError;
use crate::device::DeviceError;

#[derive(Error, Debug)]
pub enum BlissError {
    #[error("{0}")]
    Data(#[from] DataError),

    #[error("{0}")]
    Cadence(#[from] CadenceError),

    #[error("{0}")]
    Device(#[from] DeviceError),

    /// A lazily cached pipeline product was asked for again after its
    /// generator already failed. The original failure is preserved as text;
    /// a failed integration or load never silently degrades into zeros.
    #[error("a cached pipeline product previously failed to compute: {0}")]
    StaleCachedProduct(String),
}

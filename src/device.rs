// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Compute-device assignment.
//!
//! A device tag is a property of each coarse channel and drift plane.
//! `set_device` records intent only; memory moves on the next data access or
//! an explicit `push_device`. Kernels dispatch on the tag, so a tensor can
//! never reach a kernel built for a different device; with only the CPU
//! backend compiled in, the mismatch is unrepresentable. An accelerator
//! backend adds a variant behind a feature gate without touching call sites.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error(
        "unrecognised device \"{0}\"; this build supports only \"cpu\" \
         (accelerator backends are selected at compile time)"
    )]
    Unrecognised(String),
}

/// Where a channel's tensors live and where its kernels run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    #[default]
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

impl FromStr for Device {
    type Err = DeviceError;

    /// Parse a device string. `"cpu"` and `"cpu:<id>"` are accepted; the id
    /// is ignored because host memory is uniform.
    fn from_str(s: &str) -> Result<Device, DeviceError> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "cpu" => Ok(Device::Cpu),
            _ if lower.starts_with("cpu:") && lower[4..].parse::<usize>().is_ok() => {
                Ok(Device::Cpu)
            }
            _ => Err(DeviceError::Unrecognised(s.to_string())),
        }
    }
}

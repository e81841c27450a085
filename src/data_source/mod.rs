// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The contract between this crate and whatever supplies spectrogram data.
//!
//! File-format readers (HDF5, sigproc filterbank, network streams) implement
//! [`ScanDataSource`]; the pipeline only ever asks for hyperslabs and
//! metadata. Implementations are expected to cache metadata at construction
//! so the accessors are cheap.

mod ram;

pub use ram::RamDataSource;

use ndarray::Array2;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("the data source is missing mandatory metadata: {field}")]
    MissingMetadata { field: &'static str },

    #[error(
        "metadata field {field} has an unusable value ({value}); \
         it breaks an invariant the drift search relies on"
    )]
    InvalidMetadata { field: &'static str, value: String },

    #[error("expected a 3-dimensional [time, feeds, frequency] data shape, got {got:?}")]
    UnexpectedShape { got: Vec<usize> },

    #[error("data sources with {feeds} feeds are not supported; the feed axis must have length 1")]
    MultipleFeeds { feeds: usize },

    #[error(
        "{nchans} fine channels do not divide into coarse channels of \
         {fine_per_coarse} fine channels each"
    )]
    ChannelizationMismatch {
        nchans: usize,
        fine_per_coarse: usize,
    },

    #[error("failed to read a hyperslab from the data source: {0}")]
    HyperslabRead(String),
}

/// A provider of spectrogram data and metadata for one scan.
///
/// The data tensor is logically `[time, feeds, frequency]`; only single-feed
/// sources are consumed here and the feed axis is squeezed away in the
/// returned hyperslabs. Mandatory metadata accessors error when the source
/// cannot supply a value; optional ones return `None`.
pub trait ScanDataSource: Send + Sync {
    /// The shape of the full data tensor, `[time, feeds, frequency]`.
    fn data_shape(&self) -> Vec<usize>;

    /// Read a hyperslab of spectral power. `offset` and `count` address the
    /// 3-D tensor; `count[1]` must be 1 and the feed axis is squeezed, so
    /// the result has shape `[count[0], count[2]]`.
    fn read_data(&self, offset: [usize; 3], count: [usize; 3]) -> Result<Array2<f32>, DataError>;

    /// Read a hyperslab of the RFI mask with the same addressing as
    /// [`ScanDataSource::read_data`]. Sources without a mask return zeros.
    fn read_mask(&self, offset: [usize; 3], count: [usize; 3]) -> Result<Array2<u8>, DataError>;

    /// Where this data came from (a path, a URL, a description); used only
    /// for messages.
    fn origin(&self) -> String;

    // Mandatory metadata.
    /// Frequency of the first channel \[MHz\].
    fn fch1(&self) -> Result<f64, DataError>;
    /// Channel bandwidth \[MHz\]; may be negative for inverted bands.
    fn foff(&self) -> Result<f64, DataError>;
    /// Sampling time per spectrum \[seconds\].
    fn tsamp(&self) -> Result<f64, DataError>;
    /// Observation start time \[MJD\].
    fn tstart(&self) -> Result<f64, DataError>;
    /// Name of the observed source.
    fn source_name(&self) -> Result<String, DataError>;

    // Optional metadata.
    fn machine_id(&self) -> Option<i64> {
        None
    }
    fn telescope_id(&self) -> Option<i64> {
        None
    }
    fn src_raj(&self) -> Option<f64> {
        None
    }
    fn src_dej(&self) -> Option<f64> {
        None
    }
    fn az_start(&self) -> Option<f64> {
        None
    }
    fn za_start(&self) -> Option<f64> {
        None
    }
    fn data_type(&self) -> Option<i64> {
        None
    }
    fn nbits(&self) -> Option<i64> {
        None
    }
    fn nifs(&self) -> Option<usize> {
        None
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! An in-memory data source.
//!
//! Useful as the smallest real [`ScanDataSource`] (e.g. data handed over
//! from another process) and as the fixture source for tests.

use ndarray::prelude::*;

use super::{DataError, ScanDataSource};
use crate::scan::ScanMetadata;

/// A [`ScanDataSource`] backed by arrays already in host memory.
pub struct RamDataSource {
    data: Array2<f32>,
    mask: Option<Array2<u8>>,
    meta: ScanMetadata,
}

impl RamDataSource {
    /// Wrap a `[time, frequency]` spectrogram, an optional mask of the same
    /// shape, and its metadata.
    pub fn new(data: Array2<f32>, mask: Option<Array2<u8>>, meta: ScanMetadata) -> RamDataSource {
        if let Some(m) = mask.as_ref() {
            assert_eq!(
                data.dim(),
                m.dim(),
                "mask shape {:?} does not match data shape {:?}",
                m.dim(),
                data.dim()
            );
        }
        RamDataSource { data, mask, meta }
    }

    fn slab_bounds(
        &self,
        offset: [usize; 3],
        count: [usize; 3],
    ) -> Result<(usize, usize, usize, usize), DataError> {
        if count[1] != 1 || offset[1] != 0 {
            return Err(DataError::MultipleFeeds { feeds: count[1] });
        }
        let (ntime, nfreq) = self.data.dim();
        let t_end = offset[0] + count[0];
        let f_end = offset[2] + count[2];
        if t_end > ntime || f_end > nfreq {
            return Err(DataError::HyperslabRead(format!(
                "hyperslab offset {offset:?} count {count:?} exceeds shape [{ntime}, 1, {nfreq}]"
            )));
        }
        Ok((offset[0], t_end, offset[2], f_end))
    }
}

impl ScanDataSource for RamDataSource {
    fn data_shape(&self) -> Vec<usize> {
        let (ntime, nfreq) = self.data.dim();
        vec![ntime, 1, nfreq]
    }

    fn read_data(&self, offset: [usize; 3], count: [usize; 3]) -> Result<Array2<f32>, DataError> {
        let (t0, t1, f0, f1) = self.slab_bounds(offset, count)?;
        Ok(self.data.slice(s![t0..t1, f0..f1]).to_owned())
    }

    fn read_mask(&self, offset: [usize; 3], count: [usize; 3]) -> Result<Array2<u8>, DataError> {
        let (t0, t1, f0, f1) = self.slab_bounds(offset, count)?;
        match self.mask.as_ref() {
            Some(mask) => Ok(mask.slice(s![t0..t1, f0..f1]).to_owned()),
            None => Ok(Array2::zeros((t1 - t0, f1 - f0))),
        }
    }

    fn origin(&self) -> String {
        format!("ram:{}", self.meta.source_name)
    }

    fn fch1(&self) -> Result<f64, DataError> {
        Ok(self.meta.fch1)
    }

    fn foff(&self) -> Result<f64, DataError> {
        Ok(self.meta.foff)
    }

    fn tsamp(&self) -> Result<f64, DataError> {
        Ok(self.meta.tsamp)
    }

    fn tstart(&self) -> Result<f64, DataError> {
        Ok(self.meta.tstart)
    }

    fn source_name(&self) -> Result<String, DataError> {
        Ok(self.meta.source_name.clone())
    }

    fn machine_id(&self) -> Option<i64> {
        self.meta.machine_id
    }

    fn telescope_id(&self) -> Option<i64> {
        self.meta.telescope_id
    }

    fn src_raj(&self) -> Option<f64> {
        self.meta.src_raj
    }

    fn src_dej(&self) -> Option<f64> {
        self.meta.src_dej
    }

    fn az_start(&self) -> Option<f64> {
        self.meta.az_start
    }

    fn za_start(&self) -> Option<f64> {
        self.meta.za_start
    }

    fn data_type(&self) -> Option<i64> {
        Some(self.meta.data_type)
    }

    fn nbits(&self) -> Option<i64> {
        self.meta.nbits
    }

    fn nifs(&self) -> Option<usize> {
        self.meta.nifs
    }
}

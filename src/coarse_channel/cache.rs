// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Single-assignment caches for expensive per-channel products.
//!
//! A cache cell starts as either a ready value or a pending generator. The
//! first observer of a pending cell runs the generator and publishes the
//! result; clones of the cell share the same storage, so a channel cloned
//! through the pipeline never recomputes a product its ancestor already
//! materialized. Concurrent observers serialize on the computation; a
//! partially computed value is never visible.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::BlissError;

type Generator<T> = Box<dyn FnOnce() -> Result<T, BlissError> + Send>;

enum CacheState<T> {
    /// Not computed yet. The `Option` is only `None` transiently while the
    /// generator runs (or forever, if it panicked).
    Pending(Option<Generator<T>>),
    Ready(Arc<T>),
    /// The generator ran and failed; the error text is replayed to every
    /// later observer so a failure never degrades into silence.
    Failed(String),
}

pub(crate) struct CachedProduct<T> {
    state: Arc<Mutex<CacheState<T>>>,
}

impl<T> Clone for CachedProduct<T> {
    fn clone(&self) -> Self {
        CachedProduct {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> CachedProduct<T> {
    /// A cell that already holds its value.
    pub(crate) fn ready(value: T) -> CachedProduct<T> {
        CachedProduct {
            state: Arc::new(Mutex::new(CacheState::Ready(Arc::new(value)))),
        }
    }

    /// A cell that computes its value on first access.
    pub(crate) fn pending<F>(generator: F) -> CachedProduct<T>
    where
        F: FnOnce() -> Result<T, BlissError> + Send + 'static,
    {
        CachedProduct {
            state: Arc::new(Mutex::new(CacheState::Pending(Some(Box::new(generator))))),
        }
    }

    /// The cached value, computing and publishing it first if necessary.
    pub(crate) fn get(&self) -> Result<Arc<T>, BlissError> {
        let mut state = self.state.lock().expect("cache mutex poisoned");
        match &mut *state {
            CacheState::Ready(value) => Ok(Arc::clone(value)),
            CacheState::Failed(message) => Err(BlissError::StaleCachedProduct(message.clone())),
            CacheState::Pending(generator) => {
                let generator = generator
                    .take()
                    .expect("cache generator consumed without a published result");
                match generator() {
                    Ok(value) => {
                        let value = Arc::new(value);
                        *state = CacheState::Ready(Arc::clone(&value));
                        Ok(value)
                    }
                    Err(e) => {
                        *state = CacheState::Failed(e.to_string());
                        Err(e)
                    }
                }
            }
        }
    }

    /// The cached value if it has been materialized; never triggers a
    /// computation.
    pub(crate) fn peek(&self) -> Option<Arc<T>> {
        match &*self.state.lock().expect("cache mutex poisoned") {
            CacheState::Ready(value) => Some(Arc::clone(value)),
            _ => None,
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        matches!(
            &*self.state.lock().expect("cache mutex poisoned"),
            CacheState::Ready(_)
        )
    }
}

impl<T> fmt::Debug for CachedProduct<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match &*self.state.lock().expect("cache mutex poisoned") {
            CacheState::Pending(_) => "pending",
            CacheState::Ready(_) => "ready",
            CacheState::Failed(_) => "failed",
        };
        write!(f, "CachedProduct({label})")
    }
}

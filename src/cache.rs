//! Version-keyed cache entries.
//!
//! Derived state (bounding volumes, uploaded buffers, materialized framebuffers)
//! is stored together with the version of the CPU-side descriptor it was built
//! from. An entry is current exactly when its `source_version` equals the
//! descriptor's version.

/// A cached value together with the source version it was derived from
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub source_version: u64,
    pub value: T,
}

impl<T> CacheEntry<T> {
    pub fn new(source_version: u64, value: T) -> Self {
        Self {
            source_version,
            value,
        }
    }

    pub fn is_current(&self, version: u64) -> bool {
        self.source_version == version
    }
}

//! Mesh configuration.
//!
//! [`MeshConfig`] gathers the knobs that fix a mesh's shape. It derives serde
//! behind the `serde` feature so applications can keep it in their own
//! settings files; missing fields fall back to [`MeshConfig::default`].

use crate::constants::{MAX_BUILD_LEVEL, MAX_LEVEL};
use crate::errors::{HtmError, HtmResult};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MeshConfig {
    /// Query depth. Level `L` has `8·4^L` trixels.
    pub level: u32,
    /// Depth of the stored quad-tree; deeper levels are computed on demand.
    pub build_level: u32,
    /// Number of independent result buffers.
    pub buffers: usize,
    /// Per-buffer trixel limit. `None` sizes buffers to the whole mesh.
    pub buffer_capacity: Option<usize>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            level: 3,
            build_level: 3,
            buffers: 4,
            buffer_capacity: None,
        }
    }
}

impl MeshConfig {
    pub fn new(level: u32, build_level: u32, buffers: usize) -> Self {
        Self {
            level,
            build_level,
            buffers,
            buffer_capacity: None,
        }
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = Some(capacity);
        self
    }

    /// Build level after clamping 0 or anything deeper than `level` to `level`.
    pub fn effective_build_level(&self) -> u32 {
        if self.build_level == 0 || self.build_level > self.level {
            self.level
        } else {
            self.build_level
        }
    }

    pub fn validate(&self) -> HtmResult<()> {
        if self.level > MAX_LEVEL {
            return Err(HtmError::invalid_level(self.level, "level must be at most 24"));
        }
        if self.effective_build_level() > MAX_BUILD_LEVEL {
            return Err(HtmError::invalid_level(
                self.effective_build_level(),
                "build level must be at most 7",
            ));
        }
        if self.buffers == 0 {
            return Err(HtmError::InvalidBuffer {
                buffer: 0,
                count: 0,
            });
        }
        Ok(())
    }
}

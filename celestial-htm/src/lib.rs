//! Hierarchical Triangular Mesh (HTM) sky indexing.
//!
//! `celestial-htm` partitions the celestial sphere into a fixed hierarchy of
//! spherical triangles ("trixels"), maps positions to trixels in `O(level)`,
//! and answers region queries (circle, line, triangle, quadrilateral, polyline,
//! polygon) with the set of trixels the region touches. Around the index it
//! provides an LRU cache for per-trixel payloads and a reader for
//! trixel-indexed binary star catalogs.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`geometry`] | [`SpatialVector`], [`Constraint`] caps and [`Convex`] regions |
//! | [`index`] | [`SpatialIndex`] quad-tree, point lookup, region traversal, trixel names |
//! | [`range`] | [`HtmRange`] interval sets of trixel ids |
//! | [`mesh`] | [`HtMesh`] façade with RA/Dec queries and [`ResultBuffer`]s |
//! | [`cache`] | [`TrixelCache`] elastic LRU cache |
//! | [`catalog`] | [`BinFileReader`] and [`CatalogWriter`] for binary catalogs |
//! | [`config`] | [`MeshConfig`] |
//! | [`constants`] | Mesh limits, tolerances, unit conversions |
//! | [`errors`] | [`HtmError`] and [`HtmResult`] |
//!
//! # Quick Start
//!
//! ```
//! use celestial_htm::{BufferId, HtMesh, TrixelCache};
//!
//! let mut mesh = HtMesh::new(5, 3, 1).unwrap();
//! let mut cache: TrixelCache<Vec<&str>> =
//!     TrixelCache::new(mesh.size() as usize, 256).unwrap();
//!
//! let view = BufferId::new(0);
//! mesh.intersect_circle(279.23, 38.78, 5.0, view).unwrap();
//! for &trixel in mesh.buffer(view).unwrap() {
//!     let slot = cache.get_mut(trixel as usize);
//!     if !slot.is_set() {
//!         slot.set(Vec::new());
//!     }
//! }
//! cache.prune(0);
//! ```
//!
//! # Ids
//!
//! Public trixel ids are dense, `0..8·4^level`. Internally the index uses HTM
//! ids, whose leading bits encode the root and whose level is their bit length;
//! [`mesh::Translation`] converts between the two.
//!
//! # Features
//!
//! - **`serde`**: Serialize/Deserialize for vectors, configuration and
//!   catalog metadata.
//! - **`cli`**: Enables the `htm` binary.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod errors;
pub mod geometry;
pub mod index;
pub mod mesh;
pub mod range;

pub use cache::{CacheSlot, TrixelCache};
pub use catalog::{BinFileReader, CatalogError, CatalogResult, CatalogWriter, FieldDescriptor, FieldType, FieldValue};
pub use config::MeshConfig;
pub use errors::{HtmError, HtmResult};
pub use geometry::{Constraint, Convex, Markup, Sign, SpatialVector};
pub use index::SpatialIndex;
pub use mesh::{BufferId, HtMesh, ResultBuffer, Trixel};
pub use range::{HtmRange, RangeIter};

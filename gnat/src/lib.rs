//! Implementation of a geometric near-neighbor access tree (GNAT) for range and nearest neighbor
//! search in arbitrary metric spaces.
//!
//! The tree is built once from a full snapshot of a [`database::SampleDatabase`] under a
//! [`metric::Metric`], and only assumes the metric axioms: no coordinates, no vector shape. Each
//! internal node holds up to `K` pivots, one subtree per pivot, and a range table of the min/max
//! distance from every pivot to everything under every other pivot. Queries prune subtrees with
//! the triangle inequality against those tables. Leaves hold up to `L` sample keys.
//!
//! A tree flattens into one [`table::GnatRow`] per node and can be rebuilt from those rows
//! against any database exposing the same keys, without recomputing a single distance.
//!
//! TODO
//! - [x] construction, range and nearest neighbor queries with tests
//! - [x] row codec and binary row files
//! - [x] server with whole tree in memory
//! - [ ] parallel construction of sibling partitions
//!
pub mod data;
pub mod database;
pub mod error;
pub mod io;
pub mod layout;
pub mod metric;
pub mod node;
pub mod query;
pub mod table;
pub mod tree;

pub use database::{MemoryDatabase, SampleDatabase, SampleKey};
pub use error::{Error, Result};
pub use metric::Metric;
pub use query::{NearestNeighbors, Neighbor};
pub use table::GnatRow;
pub use tree::{Gnat, GnatConfig};

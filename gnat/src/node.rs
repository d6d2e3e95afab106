//! Holds structs for representing nodes (both internal and leaf) of the GNAT.
//!
//! Nodes live in an arena (see [`crate::io::NodePager`]) and refer to their children by
//! [`NodeId`], never by ownership.

use serde::{Serialize, Deserialize};
use std::fmt;

use crate::database::SampleKey;
use crate::error::{Error, Result};

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Internal = 1,
    Leaf = 2,
}

impl NodeType {

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(NodeType::Internal),
            2 => Some(NodeType::Leaf),
            _ => None,
        }
    }
}

/// Closed interval of distances observed between a pivot and a set of samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceRange {
    pub min: f64,
    pub max: f64,
}

impl DistanceRange {

    /// Range that contains nothing, widened by [`DistanceRange::include`]
    pub fn empty() -> Self {
        return Self { min: f64::INFINITY, max: f64::NEG_INFINITY };
    }

    pub fn include(&mut self, distance: f64) {
        if distance < self.min { self.min = distance; }
        if distance > self.max { self.max = distance; }
    }

    pub fn is_empty(&self) -> bool {
        return self.min > self.max;
    }

    /// Whether `[lo, hi]` overlaps this range
    pub fn intersects(&self, lo: f64, hi: f64) -> bool {
        return self.min <= hi && lo <= self.max;
    }

    /// Smallest distance from a query to any sample summarized by this range, given the query's
    /// distance to the pivot the range was measured from.
    pub fn lower_bound(&self, pivot_distance: f64) -> f64 {

        let below = pivot_distance - self.max;
        let above = self.min - pivot_distance;

        return below.max(above).max(0.0);
    }
}

impl fmt::Display for DistanceRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{:.4}, {:.4}]", self.min, self.max)
    }
}

/// `k x k` table, entry `(i, j)` bounds the distance from pivot `i` to everything under pivot `j`
#[derive(Debug, Clone, PartialEq)]
pub struct RangeTable {
    k: usize,
    entries: Vec<DistanceRange>,
}

impl RangeTable {

    pub fn new(k: usize) -> Self {
        return Self { k, entries: vec![DistanceRange::empty(); k * k] };
    }

    pub fn from_entries(k: usize, entries: Vec<DistanceRange>) -> Result<Self> {

        if entries.len() != k * k {
            return Err(Error::InvalidConfig(format!("range table for {} pivots needs {} entries, got {}", k, k * k, entries.len())));
        }

        return Ok(Self { k, entries });
    }

    pub fn k(&self) -> usize {
        return self.k;
    }

    pub fn get(&self, i: usize, j: usize) -> &DistanceRange {
        return &self.entries[i * self.k + j];
    }

    pub fn get_mut(&mut self, i: usize, j: usize) -> &mut DistanceRange {
        return &mut self.entries[i * self.k + j];
    }

    pub fn entries(&self) -> &[DistanceRange] {
        return &self.entries;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeafNode {
    pub members: Vec<SampleKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InternalNode {
    pub pivots: Vec<SampleKey>,
    pub children: Vec<NodeId>,
    pub ranges: RangeTable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl Node {

    pub fn empty_leaf() -> Self {
        return Node::Leaf(LeafNode { members: Vec::new() });
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Leaf(_) => NodeType::Leaf,
            Node::Internal(_) => NodeType::Internal,
        }
    }

    /// Keys stored directly in this node: leaf members or pivots
    pub fn keys(&self) -> &[SampleKey] {
        match self {
            Node::Leaf(leaf) => &leaf.members,
            Node::Internal(internal) => &internal.pivots,
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn range_include_and_intersect() {

        let mut range = DistanceRange::empty();
        assert!(range.is_empty());

        range.include(3.0);
        range.include(1.0);
        range.include(2.0);

        assert_eq!(range, DistanceRange { min: 1.0, max: 3.0 });
        assert!(range.intersects(0.0, 1.0));
        assert!(range.intersects(3.0, 5.0));
        assert!(range.intersects(1.5, 2.5));
        assert!(!range.intersects(3.1, 4.0));
        assert!(!range.intersects(-1.0, 0.9));
    }

    #[test]
    fn range_lower_bound() {

        let range = DistanceRange { min: 2.0, max: 4.0 };

        //query sits inside the shell around the pivot
        assert_eq!(range.lower_bound(3.0), 0.0);
        //query far outside the shell
        assert_eq!(range.lower_bound(10.0), 6.0);
        //query close to the pivot, shell is further out
        assert_eq!(range.lower_bound(0.5), 1.5);
    }

    #[test]
    fn range_table_indexing() {

        let mut table = RangeTable::new(3);
        table.get_mut(1, 2).include(5.0);

        assert_eq!(table.get(1, 2).min, 5.0);
        assert!(table.get(2, 1).is_empty());
        assert_eq!(table.entries().len(), 9);

        assert!(RangeTable::from_entries(2, vec![DistanceRange::empty(); 3]).is_err());
        assert!(RangeTable::from_entries(2, vec![DistanceRange::empty(); 4]).is_ok());
    }

    #[test]
    fn node_type_tags() {

        assert_eq!(NodeType::from_tag(NodeType::Internal as u8), Some(NodeType::Internal));
        assert_eq!(NodeType::from_tag(NodeType::Leaf as u8), Some(NodeType::Leaf));
        assert_eq!(NodeType::from_tag(0), None);
        assert_eq!(Node::empty_leaf().node_type(), NodeType::Leaf);
    }
}

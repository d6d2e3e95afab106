//! Flattens a tree into one row per node and rebuilds a tree from such rows.
//!
//! Rows carry no nesting: each names its parent and the pivot slot it hangs under, so they can be
//! stored in any flat table. Loading never calls the metric, the range tables are taken as
//! written.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Serialize, Deserialize};

use crate::database::SampleKey;
use crate::error::{Error, Result};
use crate::io::NodePager;
use crate::node::{DistanceRange, InternalNode, LeafNode, Node, NodeId, NodeType, RangeTable};
use crate::tree::Gnat;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GnatRow {
    pub node_id: u64,
    pub parent_id: Option<u64>,
    /// Index of the parent's pivot this node sits under, 0 for the root
    pub child_slot: u32,
    pub kind: NodeType,
    /// Leaf members or internal pivots
    pub keys: Vec<SampleKey>,
    /// Row-major `k x k` range table for internal rows, empty for leaves
    pub ranges: Vec<DistanceRange>,
}

impl<D, M> Gnat<D, M> {

    pub fn to_rows(&self) -> Vec<GnatRow> {
        return serialize(self);
    }

    pub fn from_rows(database: D, rows: &[GnatRow], metric: M) -> Result<Self> {
        return load(database, rows, metric);
    }
}

/// One row per node, breadth first from the root, with row ids `0..n`
pub fn serialize<D, M>(gnat: &Gnat<D, M>) -> Vec<GnatRow> {

    let mut rows: Vec<GnatRow> = Vec::with_capacity(gnat.num_nodes());

    let mut nodes_to_write: VecDeque<(NodeId, Option<u64>, u32)> = VecDeque::new();
    nodes_to_write.push_back((gnat.root, None, 0));

    while let Some((id, parent_id, child_slot)) = nodes_to_write.pop_front() {

        let node_id = rows.len() as u64;

        let row = match &gnat.pager.store[id] {

            Node::Leaf(leaf) => GnatRow {
                node_id,
                parent_id,
                child_slot,
                kind: NodeType::Leaf,
                keys: leaf.members.clone(),
                ranges: Vec::new(),
            },
            Node::Internal(internal) => {

                for (slot, child) in internal.children.iter().enumerate() {
                    nodes_to_write.push_back((*child, Some(node_id), slot as u32));
                }

                GnatRow {
                    node_id,
                    parent_id,
                    child_slot,
                    kind: NodeType::Internal,
                    keys: internal.pivots.clone(),
                    ranges: internal.ranges.entries().to_vec(),
                }
            },
        };

        rows.push(row);
    }

    return rows;
}

fn malformed(node: u64, reason: String) -> Error {
    return Error::MalformedRows { node, reason };
}

/// Checks a row is self-consistent for its kind
fn check_row(row: &GnatRow) -> Result<()> {

    match row.kind {

        NodeType::Leaf => {
            if !row.ranges.is_empty() {
                return Err(malformed(row.node_id, format!("leaf row carries {} range entries", row.ranges.len())));
            }
        },
        NodeType::Internal => {

            let k = row.keys.len();

            if k < 2 {
                return Err(malformed(row.node_id, format!("internal row needs at least 2 pivots, got {}", k)));
            }

            if row.ranges.len() != k * k {
                return Err(malformed(row.node_id, format!("expected {} range entries for {} pivots, got {}", k * k, k, row.ranges.len())));
            }

            //also catches NaN bounds
            if let Some(range) = row.ranges.iter().find(|r| !(r.min <= r.max)) {
                return Err(malformed(row.node_id, format!("range {} has min above max", range)));
            }
        },
    }

    Ok(())
}

/// Rebuilds a tree from rows and binds it to `database` and `metric`.
///
/// Every key the rows reference must be present in `database`; that is not checked here and
/// surfaces as [`Error::KeyNotFound`] at query time.
pub fn load<D, M>(database: D, rows: &[GnatRow], metric: M) -> Result<Gnat<D, M>> {

    let mut by_id: HashMap<u64, usize> = HashMap::with_capacity(rows.len());
    let mut root: Option<u64> = None;

    for (pos, row) in rows.iter().enumerate() {

        if by_id.insert(row.node_id, pos).is_some() {
            return Err(Error::DuplicateNode(row.node_id));
        }

        check_row(row)?;

        if row.parent_id.is_none() {
            match root {
                Some(first) => return Err(Error::MultipleRoots { first, second: row.node_id }),
                None => root = Some(row.node_id),
            }
        }
    }

    let root = root.ok_or(Error::MissingRoot)?;

    //children[parent][slot] is the row id hanging under that pivot
    let mut children: HashMap<u64, Vec<Option<u64>>> = HashMap::new();

    for row in rows.iter() {

        let parent = match row.parent_id {
            Some(parent) => parent,
            None => continue,
        };

        let parent_row = match by_id.get(&parent) {
            Some(pos) => &rows[*pos],
            None => return Err(Error::DanglingParent { node: row.node_id, parent }),
        };

        if parent_row.kind != NodeType::Internal {
            return Err(malformed(row.node_id, format!("parent {} is a leaf", parent)));
        }

        let slots = children.entry(parent).or_insert_with(|| vec![None; parent_row.keys.len()]);
        let slot = row.child_slot as usize;

        match slots.get_mut(slot) {
            None => return Err(malformed(row.node_id, format!("child slot {} out of range for parent {}", slot, parent))),
            Some(Some(other)) => return Err(malformed(row.node_id, format!("child slot {} of parent {} already taken by {}", slot, parent, other))),
            Some(entry) => *entry = Some(row.node_id),
        }
    }

    let mut pager = NodePager::with_capacity(rows.len());
    let mut visited: HashSet<u64> = HashSet::with_capacity(rows.len());

    let mut nodes_to_load: VecDeque<(u64, NodeId)> = VecDeque::new();
    nodes_to_load.push_back((root, pager.add_node(Node::empty_leaf())));

    while let Some((row_id, id)) = nodes_to_load.pop_front() {

        visited.insert(row_id);

        let row = &rows[by_id[&row_id]];

        let node = match row.kind {

            NodeType::Leaf => Node::Leaf(LeafNode { members: row.keys.clone() }),
            NodeType::Internal => {

                let slots = match children.get(&row_id) {
                    Some(slots) => slots,
                    None => return Err(malformed(row_id, "internal row has no children".to_string())),
                };

                let mut child_ids: Vec<NodeId> = Vec::with_capacity(slots.len());
                for (slot, child) in slots.iter().enumerate() {

                    let child = match child {
                        Some(child) => *child,
                        None => return Err(malformed(row_id, format!("missing child for slot {}", slot))),
                    };

                    let child_id = pager.add_node(Node::empty_leaf());
                    child_ids.push(child_id);
                    nodes_to_load.push_back((child, child_id));
                }

                Node::Internal(InternalNode {
                    pivots: row.keys.clone(),
                    children: child_ids,
                    ranges: RangeTable::from_entries(row.keys.len(), row.ranges.clone())?,
                })
            },
        };

        pager.update_node(id, node)?;
    }

    if visited.len() != rows.len() {
        let orphan = rows.iter().find(|row| !visited.contains(&row.node_id)).map(|row| row.node_id).unwrap_or(root);
        return Err(malformed(orphan, "row is not reachable from the root".to_string()));
    }

    log::debug!("loaded {} rows into a tree rooted at row {}", rows.len(), root);

    return Ok(Gnat::from_parts(pager, 0, database, metric));
}

//! Node arena and reading/writing whole row files on disk
//!
//!

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::database::SampleKey;
use crate::error::{Error, Result};
use crate::layout;
use crate::node::{DistanceRange, Node, NodeId, NodeType};
use crate::table::GnatRow;

pub trait GetNode {

    fn get_node(&self, id: NodeId) -> Result<&Node>;

}

/// In-memory arena holding every node of a tree, addressed by [`NodeId`]
#[derive(Debug, Clone, Default)]
pub struct NodePager {
    pub store: Vec<Node>,
}

impl GetNode for NodePager {

    fn get_node(&self, id: NodeId) -> Result<&Node> {

        let ret = match self.store.get(id) {
            Some(node) => Ok(node),
            None => Err(Error::NodeNotFound(id)),
        };

        return ret;
    }
}

impl NodePager {

    pub fn new() -> NodePager {

        return Self {
            store: Vec::new(),
        };

    }

    pub fn with_capacity(capacity: usize) -> NodePager {
        return Self { store: Vec::with_capacity(capacity) };
    }

    pub fn num_nodes(&self) -> usize {
        return self.store.len();
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {

        self.store.push(node);

        return self.store.len() - 1;
    }

    pub fn update_node(&mut self, id: NodeId, new_node: Node) -> Result<()> {

        match self.store.get_mut(id) {
            Some(slot) => {
                *slot = new_node;
                Ok(())
            },
            None => Err(Error::NodeNotFound(id)),
        }
    }
}

/// Writes rows to `path`, replacing anything already there
pub fn write_rows<P: AsRef<Path>>(path: P, rows: &[GnatRow]) -> Result<()> {

    let fd = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path.as_ref())?;

    let mut writer = BufWriter::new(fd);

    writer.write_u64::<BigEndian>(rows.len() as u64)?;

    for row in rows.iter() {
        write_row(&mut writer, row)?;
    }

    writer.flush()?;

    log::debug!("wrote {} rows to {:?}", rows.len(), path.as_ref());

    Ok(())
}

pub fn read_rows<P: AsRef<Path>>(path: P) -> Result<Vec<GnatRow>> {

    let fd = File::open(path.as_ref())?;
    let mut reader = BufReader::new(fd);

    let num_rows = reader.read_u64::<BigEndian>()?;

    let mut rows: Vec<GnatRow> = Vec::new();
    for _ in 0..num_rows {
        rows.push(read_row(&mut reader)?);
    }

    log::debug!("read {} rows from {:?}", rows.len(), path.as_ref());

    Ok(rows)
}

pub fn write_row<W: Write>(writer: &mut W, row: &GnatRow) -> Result<()> {

    writer.write_u64::<BigEndian>(row.node_id)?;

    match row.parent_id {
        Some(parent) => {
            writer.write_u8(1)?;
            writer.write_u64::<BigEndian>(parent)?;
        },
        None => {
            writer.write_u8(0)?;
            writer.write_u64::<BigEndian>(0)?;
        },
    }

    writer.write_u32::<BigEndian>(row.child_slot)?;
    writer.write_u8(row.kind as u8)?;

    writer.write_u32::<BigEndian>(row.keys.len() as u32)?;
    for key in row.keys.iter() {
        writer.write_u64::<BigEndian>(*key)?;
    }

    writer.write_u32::<BigEndian>(row.ranges.len() as u32)?;
    for range in row.ranges.iter() {
        writer.write_f64::<BigEndian>(range.min)?;
        writer.write_f64::<BigEndian>(range.max)?;
    }

    Ok(())
}

pub fn read_row<R: Read>(reader: &mut R) -> Result<GnatRow> {

    let mut prefix = [0u8; layout::ROW_PREFIX_SIZE];
    reader.read_exact(&mut prefix)?;

    let mut cursor = &prefix[..];
    let node_id = cursor.read_u64::<BigEndian>()?;
    let has_parent = cursor.read_u8()?;
    let parent_id = cursor.read_u64::<BigEndian>()?;
    let child_slot = cursor.read_u32::<BigEndian>()?;
    let kind_tag = cursor.read_u8()?;
    let num_keys = cursor.read_u32::<BigEndian>()?;

    let parent_id = match has_parent {
        0 => None,
        1 => Some(parent_id),
        x => return Err(Error::MalformedRows { node: node_id, reason: format!("bad parent flag {}", x) }),
    };

    let kind = match NodeType::from_tag(kind_tag) {
        Some(kind) => kind,
        None => return Err(Error::MalformedRows { node: node_id, reason: format!("unknown node kind {}", kind_tag) }),
    };

    //counts are untrusted until the bytes behind them are read
    let mut keys: Vec<SampleKey> = Vec::new();
    for _ in 0..num_keys {
        keys.push(reader.read_u64::<BigEndian>()?);
    }

    let num_ranges = reader.read_u32::<BigEndian>()?;
    let mut ranges: Vec<DistanceRange> = Vec::new();
    for _ in 0..num_ranges {
        let min = reader.read_f64::<BigEndian>()?;
        let max = reader.read_f64::<BigEndian>()?;
        ranges.push(DistanceRange { min, max });
    }

    Ok(GnatRow {
        node_id,
        parent_id,
        child_slot,
        kind,
        keys,
        ranges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{InternalNode, LeafNode, RangeTable};

    fn scratch_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("gnat_io_{}_{}", name, std::process::id()))
    }

    fn sample_rows() -> Vec<GnatRow> {
        vec![
            GnatRow {
                node_id: 0,
                parent_id: None,
                child_slot: 0,
                kind: NodeType::Internal,
                keys: vec![7, 3],
                ranges: vec![
                    DistanceRange { min: 0.0, max: 1.5 },
                    DistanceRange { min: 2.0, max: 4.25 },
                    DistanceRange { min: 2.0, max: 3.0 },
                    DistanceRange { min: 0.0, max: 0.5 },
                ],
            },
            GnatRow { node_id: 1, parent_id: Some(0), child_slot: 0, kind: NodeType::Leaf, keys: vec![1, 2, 9], ranges: vec![] },
            GnatRow { node_id: 2, parent_id: Some(0), child_slot: 1, kind: NodeType::Leaf, keys: vec![], ranges: vec![] },
        ]
    }

    #[test]
    fn pager_add_get_update() {

        let mut pager = NodePager::new();

        let root = pager.add_node(Node::empty_leaf());
        let other = pager.add_node(Node::Leaf(LeafNode { members: vec![4, 5] }));
        assert_eq!((root, other), (0, 1));
        assert_eq!(pager.num_nodes(), 2);

        let internal = Node::Internal(InternalNode {
            pivots: vec![1, 2],
            children: vec![1, 1],
            ranges: RangeTable::new(2),
        });
        pager.update_node(root, internal.clone()).unwrap();
        assert_eq!(pager.get_node(root).unwrap(), &internal);

        assert!(matches!(pager.get_node(2), Err(Error::NodeNotFound(2))));
        assert!(pager.update_node(5, Node::empty_leaf()).is_err());
    }

    #[test]
    fn rows_to_file_and_back() {

        let path = scratch_path("rows");
        let rows = sample_rows();

        write_rows(&path, &rows).unwrap();

        let expected_size = layout::FILE_DATA_START
            + rows.iter().map(|r| layout::row_size(r.keys.len(), r.ranges.len())).sum::<usize>();
        assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, expected_size);

        let back = read_rows(&path).unwrap();
        assert_eq!(back, rows);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn truncated_file_is_an_io_error() {

        let path = scratch_path("truncated");
        write_rows(&path, &sample_rows()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        assert!(matches!(read_rows(&path), Err(Error::Io(_))));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn oversized_key_count_is_an_io_error() {

        let mut bytes: Vec<u8> = Vec::new();
        write_row(&mut bytes, &sample_rows()[1]).unwrap();
        bytes[layout::KEY_COUNT_START..layout::KEY_COUNT_START + layout::KEY_COUNT_SIZE].copy_from_slice(&u32::MAX.to_be_bytes());

        let result = read_row(&mut &bytes[..]);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn oversized_range_count_is_an_io_error() {

        let row = &sample_rows()[1];

        let mut bytes: Vec<u8> = Vec::new();
        write_row(&mut bytes, row).unwrap();
        let range_count_start = layout::ROW_PREFIX_SIZE + row.keys.len() * layout::KEY_SIZE;
        bytes[range_count_start..range_count_start + layout::RANGE_COUNT_SIZE].copy_from_slice(&u32::MAX.to_be_bytes());

        let result = read_row(&mut &bytes[..]);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn unknown_kind_is_rejected() {

        let mut bytes: Vec<u8> = Vec::new();
        write_row(&mut bytes, &sample_rows()[1]).unwrap();
        bytes[layout::KIND_START] = 9;

        let result = read_row(&mut &bytes[..]);
        assert!(matches!(result, Err(Error::MalformedRows { node: 1, .. })));
    }
}

//! GNAT construction and the tree's on-disk configuration
//!
//! Construction works breadth first off an explicit queue of partitions, so deep or unbalanced
//! trees never grow the call stack.
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::database::{DescriptorFile, SampleDatabase, SampleKey};
use crate::error::{Error, Result};
use crate::io::{self, GetNode, NodePager};
use crate::metric::{Metric, MetricKind};
use crate::node::{InternalNode, LeafNode, Node, NodeId, RangeTable};
use crate::table;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GnatConfig {
    pub directory: String,
    pub dim: usize,
    pub branch_factor: usize,
    pub leaf_capacity: usize,
    pub metric: MetricKind,
}

impl Default for GnatConfig {

    fn default() -> Self {
        return Self {
            directory: "/tmp/gnat".to_string(),
            dim: 8,
            branch_factor: 8,
            leaf_capacity: 16,
            metric: MetricKind::Euclidean,
        }
    }
}

impl GnatConfig {

    pub fn validate(&self) -> Result<()> {

        if self.branch_factor < 2 {
            return Err(Error::InvalidConfig(format!("branch_factor must be at least 2, got {}", self.branch_factor)));
        }

        if self.leaf_capacity < 1 {
            return Err(Error::InvalidConfig("leaf_capacity must be at least 1".to_string()));
        }

        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(filename: P) -> Result<Self> {

        let serialized = fs::read_to_string(filename)?;

        let deserialized: Self = serde_yaml::from_str(&serialized)?;

        return Ok(deserialized);
    }

    pub fn to_file<P: AsRef<Path>>(&self, filename: P) -> Result<()> {

        let serialized = serde_yaml::to_string(&self)?;
        fs::write(filename, serialized)?;

        Ok(())
    }

    pub fn get_rows_filename(&self) -> String {

        return self.directory.clone() + "/rows";
    }

    pub fn get_database_filename(&self) -> String {

        return self.directory.clone() + "/db.db";
    }

    pub fn get_config_filename(&self) -> String {

        return self.directory.clone() + "/config.yaml";
    }
}

/// Shape summary of a built or loaded tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    pub num_nodes: usize,
    pub num_internal: usize,
    pub num_leaves: usize,
    pub num_samples: usize,
    pub max_depth: usize,
}

/// Geometric near-neighbor access tree over a sample database.
///
/// Immutable once built. Queries only take `&self`, so a tree can be shared across threads as
/// long as its database and metric can.
#[derive(Debug)]
pub struct Gnat<D, M> {
    pub(crate) pager: NodePager,
    pub(crate) root: NodeId,
    pub(crate) database: D,
    pub(crate) metric: M,
}

/// Result of splitting one partition: pivots and members are positions into the sample arrays
struct Split {
    pivots: Vec<usize>,
    partitions: Vec<Vec<usize>>,
    ranges: RangeTable,
}

impl<D, M> Gnat<D, M>
where
    D: SampleDatabase,
    M: Metric<D::Sample>,
{

    pub fn build(database: D, metric: M) -> Result<Self> {

        return Self::build_with_config(database, metric, &GnatConfig::default());
    }

    pub fn build_with_config(database: D, metric: M, config: &GnatConfig) -> Result<Self> {

        config.validate()?;

        let keys = database.sample_keys()?;

        let mut samples: Vec<D::Sample> = Vec::with_capacity(keys.len());
        for key in keys.iter() {
            samples.push(database.get_sample(*key)?);
        }

        log::debug!("building gnat over {} samples, branch factor {}, leaf capacity {}",
            keys.len(), config.branch_factor, config.leaf_capacity);

        let pager = build_nodes(&keys, &samples, &metric, config.branch_factor, config.leaf_capacity);

        let gnat = Self {
            pager,
            root: 0,
            database,
            metric,
        };

        if log::log_enabled!(log::Level::Info) {
            let stats = gnat.stats()?;
            log::info!("built gnat: {} samples, {} nodes, depth {}", stats.num_samples, stats.num_nodes, stats.max_depth);
        }

        return Ok(gnat);
    }

    pub(crate) fn distance_to(&self, point: &D::Sample, key: SampleKey) -> Result<f64> {

        let sample = self.database.get_sample(key)?;
        return Ok(self.metric.distance(point, &sample));
    }
}

impl<D, M> Gnat<D, M> {

    /// Assembles a tree from an already validated arena
    pub(crate) fn from_parts(pager: NodePager, root: NodeId, database: D, metric: M) -> Self {
        return Self { pager, root, database, metric };
    }

    pub fn root(&self) -> NodeId {
        return self.root;
    }

    pub fn num_nodes(&self) -> usize {
        return self.pager.num_nodes();
    }

    pub fn get_node(&self, id: NodeId) -> Result<&Node> {
        return self.pager.get_node(id);
    }

    pub fn database(&self) -> &D {
        return &self.database;
    }

    pub fn metric(&self) -> &M {
        return &self.metric;
    }

    /// Whether `key` is stored anywhere in the tree, as a pivot or a leaf member
    pub fn contains_key(&self, key: SampleKey) -> bool {
        return self.pager.store.iter().any(|node| node.keys().contains(&key));
    }

    pub fn stats(&self) -> Result<TreeStats> {

        let mut stats = TreeStats {
            num_nodes: self.pager.num_nodes(),
            num_internal: 0,
            num_leaves: 0,
            num_samples: 0,
            max_depth: 0,
        };

        let mut nodes_to_check: Vec<(NodeId, usize)> = vec![(self.root, 1)];

        while let Some((id, depth)) = nodes_to_check.pop() {

            let node = self.pager.get_node(id)?;

            stats.max_depth = stats.max_depth.max(depth);
            stats.num_samples += node.keys().len();

            match node {
                Node::Leaf(_) => stats.num_leaves += 1,
                Node::Internal(internal) => {
                    stats.num_internal += 1;
                    for child in internal.children.iter() {
                        nodes_to_check.push((*child, depth + 1));
                    }
                },
            }
        }

        return Ok(stats);
    }
}

impl Gnat<DescriptorFile, MetricKind> {

    /// Loads a tree written by [`Gnat::write_to_directory`] together with its config
    pub fn read_from_directory<P: AsRef<Path>>(directory: P) -> Result<(Self, GnatConfig)> {

        let config_filename = directory.as_ref().join("config.yaml");
        let mut config = GnatConfig::from_file(config_filename)?;
        config.directory = directory.as_ref().to_string_lossy().to_string();

        let database = DescriptorFile::open(config.get_database_filename())?;

        if database.dim() != config.dim {
            return Err(Error::DimensionMismatch { expected: config.dim, actual: database.dim() });
        }

        let rows = io::read_rows(config.get_rows_filename())?;
        let gnat = table::load(database, &rows, config.metric)?;

        log::info!("loaded gnat from {}: {} nodes", config.directory, gnat.num_nodes());

        return Ok((gnat, config));
    }

    /// Writes rows and config next to the descriptor file the tree was built over
    pub fn write_to_directory(&self, config: &GnatConfig) -> Result<()> {

        config.to_file(config.get_config_filename())?;
        io::write_rows(config.get_rows_filename(), &table::serialize(self))?;

        Ok(())
    }
}

fn build_nodes<S, M: Metric<S>>(keys: &[SampleKey], samples: &[S], metric: &M, branch_factor: usize, leaf_capacity: usize) -> NodePager {

    let mut pager = NodePager::new();

    let root = pager.add_node(Node::empty_leaf());

    let mut to_build: VecDeque<(NodeId, Vec<usize>)> = VecDeque::new();
    to_build.push_back((root, (0..keys.len()).collect()));

    while let Some((id, members)) = to_build.pop_front() {

        let node = match members.len() <= leaf_capacity {

            true => {
                let members = members.iter().map(|m| keys[*m]).collect();
                Node::Leaf(LeafNode { members })
            },
            false => {
                let split = split_partition(&members, samples, metric, branch_factor);

                let mut children: Vec<NodeId> = Vec::with_capacity(split.pivots.len());
                for partition in split.partitions.into_iter() {
                    let child = pager.add_node(Node::empty_leaf());
                    children.push(child);
                    to_build.push_back((child, partition));
                }

                Node::Internal(InternalNode {
                    pivots: split.pivots.iter().map(|p| keys[*p]).collect(),
                    children,
                    ranges: split.ranges,
                })
            },
        };

        pager.store[id] = node;
    }

    return pager;
}

/// Picks pivots by farthest-point selection, assigns every other member to its nearest pivot and
/// records the range table. `members` holds at least two positions.
fn split_partition<S, M: Metric<S>>(members: &[usize], samples: &[S], metric: &M, branch_factor: usize) -> Split {

    let n = members.len();

    //positions into `members`, first member is always the first pivot
    let mut pivot_positions: Vec<usize> = vec![0];
    let mut is_pivot = vec![false; n];
    is_pivot[0] = true;

    //pivot_distances[p][pos] is the distance from pivot p to members[pos]
    let mut pivot_distances: Vec<Vec<f64>> = Vec::with_capacity(branch_factor);
    let mut nearest_pivot_distance = vec![f64::INFINITY; n];

    loop {

        let newest = members[pivot_positions[pivot_positions.len() - 1]];

        let row: Vec<f64> = members.iter().map(|m| metric.distance(&samples[newest], &samples[*m])).collect();
        for (pos, distance) in row.iter().enumerate() {
            if *distance < nearest_pivot_distance[pos] {
                nearest_pivot_distance[pos] = *distance;
            }
        }
        pivot_distances.push(row);

        if pivot_positions.len() == branch_factor {
            break;
        }

        //ties go to the earliest member
        let mut farthest: Option<(usize, f64)> = None;
        for pos in 0..n {
            if is_pivot[pos] {
                continue;
            }
            match farthest {
                Some((_, best)) if nearest_pivot_distance[pos] <= best => {},
                _ => farthest = Some((pos, nearest_pivot_distance[pos])),
            }
        }

        match farthest {
            None => break,
            Some((pos, _)) => {
                is_pivot[pos] = true;
                pivot_positions.push(pos);
            },
        }
    }

    let k = pivot_positions.len();

    //owner[pos] is the pivot whose subtree holds members[pos]
    let mut owner = vec![0usize; n];
    let mut partitions: Vec<Vec<usize>> = vec![Vec::new(); k];

    for (p, pos) in pivot_positions.iter().enumerate() {
        owner[*pos] = p;
    }

    for pos in 0..n {

        if is_pivot[pos] {
            continue;
        }

        let mut closest = 0;
        for p in 1..k {
            if pivot_distances[p][pos] < pivot_distances[closest][pos] {
                closest = p;
            }
        }

        owner[pos] = closest;
        partitions[closest].push(members[pos]);
    }

    let mut ranges = RangeTable::new(k);
    for pos in 0..n {
        let j = owner[pos];
        for i in 0..k {
            ranges.get_mut(i, j).include(pivot_distances[i][pos]);
        }
    }

    return Split {
        pivots: pivot_positions.iter().map(|pos| members[*pos]).collect(),
        partitions,
        ranges,
    };
}

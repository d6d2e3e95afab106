//! Range and nearest neighbor queries against a built or loaded [`Gnat`].
//!
//! Both queries prune with the range tables: for a query point `p`, a pivot `i` at distance `d_i`
//! and any sample `x` under pivot `j`, `|dist(p, x) - d_i| <= dist(pivot_i, x)`, and the table
//! bounds `dist(pivot_i, x)` for everything under `j`.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap};

use serde::{Serialize, Deserialize};

use crate::database::{SampleDatabase, SampleKey};
use crate::error::Result;
use crate::io::GetNode;
use crate::metric::Metric;
use crate::node::{Node, NodeId};
use crate::tree::Gnat;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub key: SampleKey,
    pub distance: f64,
}

/// The `n` closest samples to a query, closest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestNeighbors {
    pub neighbors: Vec<Neighbor>,
}

impl NearestNeighbors {

    pub fn keys(&self) -> Vec<SampleKey> {
        return self.neighbors.iter().map(|n| n.key).collect();
    }

    pub fn to_yaml(&self) -> String {

        let mut s = String::new();
        for neighbor in self.neighbors.iter() {
            s = s + &format!("  {}: \n", neighbor.key);
            s = s + &format!("    distance: {}\n", neighbor.distance);
        }

        return s;
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self)
    }
}

impl<D, M> Gnat<D, M>
where
    D: SampleDatabase,
    M: Metric<D::Sample>,
{

    /// Every key whose sample lies strictly closer than `radius` to `point`
    pub fn query(&self, point: &D::Sample, radius: f64) -> Result<BTreeSet<SampleKey>> {

        let mut hits: BTreeSet<SampleKey> = BTreeSet::new();

        //strict inequality, nothing is closer than a non-positive radius
        if !(radius > 0.0) {
            return Ok(hits);
        }

        let mut nodes_to_check: Vec<NodeId> = vec![self.root];
        let mut num_nodes_visited: usize = 0;

        while let Some(id) = nodes_to_check.pop() {

            num_nodes_visited += 1;

            match self.pager.get_node(id)? {

                Node::Leaf(leaf) => {
                    for key in leaf.members.iter() {
                        if self.distance_to(point, *key)? < radius {
                            hits.insert(*key);
                        }
                    }
                },
                Node::Internal(internal) => {

                    let mut pivot_distances: Vec<f64> = Vec::with_capacity(internal.pivots.len());
                    for key in internal.pivots.iter() {
                        let distance = self.distance_to(point, *key)?;
                        if distance < radius {
                            hits.insert(*key);
                        }
                        pivot_distances.push(distance);
                    }

                    for (j, child) in internal.children.iter().enumerate() {

                        //one pivot whose shell misses the query ball rules the whole child out
                        let survives = pivot_distances.iter().enumerate().all(|(i, d)| {
                            internal.ranges.get(i, j).intersects(d - radius, d + radius)
                        });

                        if survives {
                            nodes_to_check.push(*child);
                        }
                    }
                },
            }
        }

        log::trace!("range query visited {} of {} nodes, {} hits", num_nodes_visited, self.num_nodes(), hits.len());

        return Ok(hits);
    }

    /// Lazily yields every stored key in nondecreasing distance to `point`.
    ///
    /// Equidistant samples come out lowest key first. Subtrees are only expanded once nothing on
    /// the frontier is closer than their lower bound, so taking the first few items only touches
    /// the part of the tree that could hold them.
    pub fn neighbor_query<'a>(&'a self, point: &'a D::Sample) -> NeighborQuery<'a, D, M> {

        let mut frontier = BinaryHeap::new();
        frontier.push(Reverse(FrontierEntry::node(self.root, 0.0)));

        return NeighborQuery {
            gnat: self,
            point,
            frontier,
        };
    }

    pub fn nearest_neighbor(&self, point: &D::Sample) -> Result<Option<Neighbor>> {

        return self.neighbor_query(point).next().transpose();
    }

    pub fn nearest_neighbors(&self, point: &D::Sample, n: usize) -> Result<NearestNeighbors> {

        let neighbors = self.neighbor_query(point).take(n).collect::<Result<Vec<Neighbor>>>()?;

        return Ok(NearestNeighbors { neighbors });
    }
}

const NODE_RANK: u8 = 0;
const SAMPLE_RANK: u8 = 1;

/// Frontier ordering: distance, then nodes before samples, then lowest id
#[derive(Debug, Clone, Copy)]
struct FrontierEntry {
    distance: f64,
    rank: u8,
    id: u64,
}

impl FrontierEntry {

    fn node(id: NodeId, lower_bound: f64) -> Self {
        return Self { distance: lower_bound, rank: NODE_RANK, id: id as u64 };
    }

    fn sample(key: SampleKey, distance: f64) -> Self {
        return Self { distance, rank: SAMPLE_RANK, id: key };
    }
}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance.total_cmp(&other.distance)
            .then(self.rank.cmp(&other.rank))
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierEntry {}

/// Best-first traversal returned by [`Gnat::neighbor_query`]
pub struct NeighborQuery<'a, D: SampleDatabase, M> {
    gnat: &'a Gnat<D, M>,
    point: &'a D::Sample,
    frontier: BinaryHeap<Reverse<FrontierEntry>>,
}

impl<'a, D, M> NeighborQuery<'a, D, M>
where
    D: SampleDatabase,
    M: Metric<D::Sample>,
{

    /// Pushes everything directly under `id` onto the frontier
    fn expand(&mut self, id: NodeId, bound: f64) -> Result<()> {

        let gnat = self.gnat;

        match gnat.pager.get_node(id)? {

            Node::Leaf(leaf) => {
                for key in leaf.members.iter() {
                    let distance = gnat.distance_to(self.point, *key)?;
                    self.frontier.push(Reverse(FrontierEntry::sample(*key, distance)));
                }
            },
            Node::Internal(internal) => {

                let mut pivot_distances: Vec<f64> = Vec::with_capacity(internal.pivots.len());
                for key in internal.pivots.iter() {
                    let distance = gnat.distance_to(self.point, *key)?;
                    self.frontier.push(Reverse(FrontierEntry::sample(*key, distance)));
                    pivot_distances.push(distance);
                }

                for (j, child) in internal.children.iter().enumerate() {

                    let mut lower_bound = bound;
                    for (i, d) in pivot_distances.iter().enumerate() {
                        lower_bound = lower_bound.max(internal.ranges.get(i, j).lower_bound(*d));
                    }

                    self.frontier.push(Reverse(FrontierEntry::node(*child, lower_bound)));
                }
            },
        }

        Ok(())
    }
}

impl<'a, D, M> Iterator for NeighborQuery<'a, D, M>
where
    D: SampleDatabase,
    M: Metric<D::Sample>,
{
    type Item = Result<Neighbor>;

    fn next(&mut self) -> Option<Self::Item> {

        loop {

            let Reverse(entry) = self.frontier.pop()?;

            match entry.rank {
                SAMPLE_RANK => return Some(Ok(Neighbor { key: entry.id, distance: entry.distance })),
                _ => {
                    if let Err(e) = self.expand(entry.id as NodeId, entry.distance) {
                        self.frontier.clear();
                        return Some(Err(e));
                    }
                },
            }
        }
    }
}

/// Brute force range query, the reference every tree query must agree with
pub fn linear_query<D, M>(database: &D, metric: &M, point: &D::Sample, radius: f64) -> Result<BTreeSet<SampleKey>>
where
    D: SampleDatabase,
    M: Metric<D::Sample>,
{

    let mut hits: BTreeSet<SampleKey> = BTreeSet::new();

    for key in database.sample_keys()? {
        let sample = database.get_sample(key)?;
        if metric.distance(point, &sample) < radius {
            hits.insert(key);
        }
    }

    return Ok(hits);
}

/// Brute force nearest neighbor, lowest key wins ties
pub fn linear_neighbor<D, M>(database: &D, metric: &M, point: &D::Sample) -> Result<Option<Neighbor>>
where
    D: SampleDatabase,
    M: Metric<D::Sample>,
{

    let mut best: Option<Neighbor> = None;

    for key in database.sample_keys()? {

        let sample = database.get_sample(key)?;
        let distance = metric.distance(point, &sample);

        let better = match best {
            None => true,
            Some(current) => distance < current.distance || (distance == current.distance && key < current.key),
        };

        if better {
            best = Some(Neighbor { key, distance });
        }
    }

    return Ok(best);
}

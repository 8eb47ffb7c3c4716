//! Single-linkage clustering with a data-driven linkage threshold.
//!
//! Two points share a cluster iff they are connected by a chain of links
//! shorter than the threshold. The threshold is not global: it is derived
//! from the nearest-neighbour spacing of the current point set, so it
//! follows the live-point density as it contracts between iterations.

use crate::constants::CLUSTER_LINK_FACTOR;
use crate::types::{Points, Vector};

use super::metric::scaled_distance_sq;

/// Cluster labels for a point set.
#[derive(Debug, Clone)]
pub struct Clustering {
    /// Cluster index of each point, in `0..nclusters`.
    pub labels: Vec<usize>,
    /// Number of clusters.
    pub nclusters: usize,
}

/// Disjoint-set forest with path halving and union by size.
struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        let (big, small) = if self.size[ra] >= self.size[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
    }
}

/// Cluster `points` by single linkage in the scaled (and wrapped) metric.
///
/// The threshold is [`CLUSTER_LINK_FACTOR`] times the largest
/// nearest-neighbour distance. Labels are numbered in order of each
/// cluster's first member.
pub fn single_linkage(points: &Points, scales: &Vector, wrapped: &[bool]) -> Clustering {
    let n = points.nrows();
    if n <= 1 {
        return Clustering {
            labels: vec![0; n],
            nclusters: n,
        };
    }

    let mut nn_sq = vec![f64::INFINITY; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d2 = scaled_distance_sq(points, i, points, j, scales, wrapped);
            if d2 < nn_sq[i] {
                nn_sq[i] = d2;
            }
            if d2 < nn_sq[j] {
                nn_sq[j] = d2;
            }
        }
    }
    let max_nn_sq = nn_sq.iter().cloned().fold(0.0, f64::max);
    let threshold_sq = CLUSTER_LINK_FACTOR * CLUSTER_LINK_FACTOR * max_nn_sq;

    let mut forest = UnionFind::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            if scaled_distance_sq(points, i, points, j, scales, wrapped) <= threshold_sq {
                forest.union(i, j);
            }
        }
    }

    let mut root_label: Vec<Option<usize>> = vec![None; n];
    let mut labels = Vec::with_capacity(n);
    let mut nclusters = 0;
    for i in 0..n {
        let root = forest.find(i);
        let label = *root_label[root].get_or_insert_with(|| {
            nclusters += 1;
            nclusters - 1
        });
        labels.push(label);
    }

    tracing::debug!(nclusters, threshold_sq, "single-linkage clustering");

    Clustering { labels, nclusters }
}

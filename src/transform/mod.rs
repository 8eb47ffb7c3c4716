//! Metric learning: per-cluster whitening of the live points.
//!
//! A [`TransformLayer`] maps unit-cube coordinates into a whitened space in
//! which the live points of each cluster have roughly unit spread. It is
//! refitted from scratch every iteration by [`TransformLayer::optimize`]:
//!
//! 1. Cluster the assignment points by single linkage in a per-dimension
//!    scaled metric (circular in wrapped dimensions).
//! 2. Attach each fit point to the cluster of its nearest assignment point.
//! 3. Fit a linear map per cluster ([`TransformKind::Scaling`] or
//!    [`TransformKind::Affine`]), falling back to the pooled diagonal scales
//!    when a cluster is too small or degenerate.
//!
//! The pooled scales are kept as the clustering metric of the next call.

mod clustering;
mod fit;
pub mod metric;

pub use clustering::{single_linkage, Clustering};
pub use fit::{ClusterTransform, TransformKind};

use crate::error::{RegionError, Result};
use crate::statistics::WelfordCovariance;
use crate::types::{row_vector, Points, Vector};

use fit::{cluster_center, cluster_cuts, diagonal_transform, fit_cluster, jittered_scales};
use metric::{dimension_scales, scaled_distance_sq};

/// Per-cluster whitening transform fitted to a live-point set.
#[derive(Debug, Clone)]
pub struct TransformLayer {
    kind: TransformKind,
    wrapped_dims: Vec<usize>,
    /// Per-dimension wrap mask, sized on the last fit.
    wrapped: Vec<bool>,
    /// Pooled per-dimension scales; the clustering metric.
    scales: Option<Vector>,
    fit_points: Option<Points>,
    labels: Vec<usize>,
    clusters: Vec<ClusterTransform>,
}

impl TransformLayer {
    /// Create an unfitted layer of the given kind.
    pub fn new(kind: TransformKind, wrapped_dims: impl Into<Vec<usize>>) -> Self {
        Self {
            kind,
            wrapped_dims: wrapped_dims.into(),
            wrapped: Vec::new(),
            scales: None,
            fit_points: None,
            labels: Vec::new(),
            clusters: Vec::new(),
        }
    }

    /// Unfitted layer with per-dimension rescaling.
    pub fn scaling(wrapped_dims: impl Into<Vec<usize>>) -> Self {
        Self::new(TransformKind::Scaling, wrapped_dims)
    }

    /// Unfitted layer with full covariance whitening.
    pub fn affine(wrapped_dims: impl Into<Vec<usize>>) -> Self {
        Self::new(TransformKind::Affine, wrapped_dims)
    }

    /// Fit the layer.
    ///
    /// `cluster_points` defines the clusters; `points` are the points the
    /// per-cluster maps are fitted to (usually the same live points).
    pub fn optimize(&mut self, points: &Points, cluster_points: &Points) -> Result<()> {
        let dim = points.ncols();
        if cluster_points.ncols() != dim {
            return Err(RegionError::DimensionMismatch {
                expected: dim,
                actual: cluster_points.ncols(),
            });
        }
        for set in [points, cluster_points] {
            if set.nrows() == 0 {
                return Err(RegionError::InsufficientPoints {
                    needed: 1,
                    actual: 0,
                });
            }
            if set.iter().any(|v| !v.is_finite()) {
                return Err(RegionError::invalid("points contain non-finite coordinates"));
            }
        }
        let wrapped = self.wrap_mask(dim)?;

        let seed_scales = match &self.scales {
            Some(s) if s.len() == dim => s.clone(),
            _ => dimension_scales(cluster_points, &wrapped),
        };
        let clustering = single_linkage(cluster_points, &seed_scales, &wrapped);

        let labels: Vec<usize> = (0..points.nrows())
            .map(|i| {
                let j = nearest_row(points, i, cluster_points, &seed_scales, &wrapped);
                clustering.labels[j]
            })
            .collect();
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); clustering.nclusters];
        for (i, &label) in labels.iter().enumerate() {
            members[label].push(i);
        }
        if let Some(cluster) = members.iter().position(Vec::is_empty) {
            return Err(RegionError::EmptyCluster { cluster });
        }

        let pooled = pooled_scales(points, &members, &wrapped);

        let clusters = members
            .iter()
            .enumerate()
            .map(|(c, m)| {
                fit_cluster(self.kind, points, m, &wrapped).unwrap_or_else(|| {
                    tracing::debug!(
                        cluster = c,
                        size = m.len(),
                        kind = ?self.kind,
                        "degenerate cluster, using pooled diagonal scales"
                    );
                    let cuts = cluster_cuts(points, m, &wrapped);
                    let center = cluster_center(points, m, &cuts, &wrapped);
                    diagonal_transform(center, cuts, wrapped.clone(), &pooled, m.len(), true)
                })
            })
            .collect();

        tracing::debug!(
            nclusters = clustering.nclusters,
            npoints = points.nrows(),
            kind = ?self.kind,
            "transform layer fitted"
        );

        self.wrapped = wrapped;
        self.scales = Some(pooled);
        self.fit_points = Some(points.clone());
        self.labels = labels;
        self.clusters = clusters;
        Ok(())
    }

    /// Whitened coordinates of `points`, each row mapped by the cluster of
    /// its nearest fit point.
    pub fn transform(&self, points: &Points) -> Result<Points> {
        let labels = self.assign_clusters(points)?;
        let mut out = Points::zeros(points.nrows(), points.ncols());
        for (i, &c) in labels.iter().enumerate() {
            out.set_row(i, &self.clusters[c].forward_row(points, i).transpose());
        }
        Ok(out)
    }

    /// Cluster of the nearest fit point for every row of `points`.
    pub fn assign_clusters(&self, points: &Points) -> Result<Vec<usize>> {
        let (fit_points, scales) = self.fitted()?;
        self.check_dim(points)?;
        Ok((0..points.nrows())
            .map(|i| self.labels[nearest_row(points, i, fit_points, scales, &self.wrapped)])
            .collect())
    }

    /// Whitened coordinates of `points` under cluster `c`'s map.
    pub fn transform_in_cluster(&self, points: &Points, c: usize) -> Result<Points> {
        self.fitted()?;
        self.check_dim(points)?;
        let cluster = self.cluster(c)?;
        let mut out = Points::zeros(points.nrows(), points.ncols());
        for i in 0..points.nrows() {
            out.set_row(i, &cluster.forward_row(points, i).transpose());
        }
        Ok(out)
    }

    /// Unit-cube coordinates of whitened points under cluster `c`'s map.
    ///
    /// Wrapped dimensions are folded back into [0, 1).
    pub fn untransform_in_cluster(&self, whitened: &Points, c: usize) -> Result<Points> {
        self.fitted()?;
        self.check_dim(whitened)?;
        let cluster = self.cluster(c)?;
        let mut out = Points::zeros(whitened.nrows(), whitened.ncols());
        for i in 0..whitened.nrows() {
            let x = cluster.backward(&row_vector(whitened, i));
            out.set_row(i, &x.transpose());
        }
        Ok(out)
    }

    /// Number of clusters of the last fit (0 before fitting).
    pub fn nclusters(&self) -> usize {
        self.clusters.len()
    }

    /// Cluster label of each fit point.
    pub fn clusterids(&self) -> &[usize] {
        &self.labels
    }

    /// Per-cluster transforms of the last fit.
    pub fn clusters(&self) -> &[ClusterTransform] {
        &self.clusters
    }

    /// Periodic dimensions.
    pub fn wrapped_dims(&self) -> &[usize] {
        &self.wrapped_dims
    }

    /// Transform variant.
    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    /// Dimensionality of the last fit, if fitted.
    pub fn ndim(&self) -> Option<usize> {
        self.fit_points.as_ref().map(|p| p.ncols())
    }

    /// Pooled per-dimension scales of the last fit.
    pub fn scales(&self) -> Option<&Vector> {
        self.scales.as_ref()
    }

    pub(crate) fn wrap_mask_fitted(&self) -> &[bool] {
        &self.wrapped
    }

    pub(crate) fn cluster(&self, c: usize) -> Result<&ClusterTransform> {
        self.clusters.get(c).ok_or_else(|| {
            RegionError::invalid(format!(
                "cluster {c} out of range for {} clusters",
                self.clusters.len()
            ))
        })
    }

    fn fitted(&self) -> Result<(&Points, &Vector)> {
        match (&self.fit_points, &self.scales) {
            (Some(p), Some(s)) => Ok((p, s)),
            _ => Err(RegionError::NotReady { stage: "optimize" }),
        }
    }

    fn check_dim(&self, points: &Points) -> Result<()> {
        match self.ndim() {
            Some(d) if d != points.ncols() => Err(RegionError::DimensionMismatch {
                expected: d,
                actual: points.ncols(),
            }),
            _ => Ok(()),
        }
    }

    fn wrap_mask(&self, dim: usize) -> Result<Vec<bool>> {
        let mut mask = vec![false; dim];
        for &k in &self.wrapped_dims {
            if k >= dim {
                return Err(RegionError::invalid(format!(
                    "wrapped dimension {k} out of range for {dim}-dimensional points"
                )));
            }
            mask[k] = true;
        }
        Ok(mask)
    }
}

/// Index of the row of `reference` nearest to row `i` of `points`.
fn nearest_row(
    points: &Points,
    i: usize,
    reference: &Points,
    scales: &Vector,
    wrapped: &[bool],
) -> usize {
    let mut best = 0;
    let mut best_d2 = f64::INFINITY;
    for j in 0..reference.nrows() {
        let d2 = scaled_distance_sq(points, i, reference, j, scales, wrapped);
        if d2 < best_d2 {
            best_d2 = d2;
            best = j;
        }
    }
    best
}

/// Per-dimension standard deviation of the cluster-centred points.
fn pooled_scales(points: &Points, members: &[Vec<usize>], wrapped: &[bool]) -> Vector {
    let dim = points.ncols();
    let mut welford = WelfordCovariance::new(dim);
    for m in members {
        let cuts = cluster_cuts(points, m, wrapped);
        let center = cluster_center(points, m, &cuts, wrapped);
        for &i in m {
            let offset = Vector::from_fn(dim, |k, _| {
                metric::unwrap_coordinate(points[(i, k)], cuts[k], wrapped[k]) - center[k]
            });
            welford.update(&offset);
        }
    }
    match welford.finalize() {
        Some(cov) => jittered_scales(&cov.diagonal().map(|v| {
            if v.sqrt() > crate::constants::MIN_SCALE {
                v
            } else {
                1.0
            }
        })),
        None => Vector::from_element(dim, 1.0),
    }
}

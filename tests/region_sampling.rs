//! End-to-end region construction and sampling.
//!
//! Builds regions around uniform boxes with both transform kinds and checks
//! that every registered sampling method returns points covering the box,
//! slightly enlarged, and nothing else.

use mlfriends::{Points, Region, RegionConfig, RegionError, SamplingMethod, TransformLayer};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

fn uniform_box(n: usize, lo: [f64; 2], hi: [f64; 2], seed: u64) -> Points {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    Points::from_fn(n, 2, |_, k| lo[k] + (hi[k] - lo[k]) * rng.random::<f64>())
}

fn column_range(points: &Points, k: usize) -> (f64, f64) {
    let col = points.column(k);
    (col.min(), col.max())
}

fn build<'a>(points: &'a Points, layer: &'a TransformLayer) -> Region<'a> {
    let mut region = Region::new(points, layer, RegionConfig::default()).unwrap();
    region.apply_enlargement(30).unwrap();
    region.create_wrapping_geometry().unwrap();
    region
}

// ============================================================================
// Scaling transform
// ============================================================================

#[test]
fn scaling_region_covers_box() {
    let points = uniform_box(1000, [0.2, 0.02], [0.5, 0.05], 1);
    let mut layer = TransformLayer::scaling(vec![]);
    layer.optimize(&points, &points).unwrap();
    assert_eq!(layer.nclusters(), 1);

    let region = build(&points, &layer);
    assert_eq!(region.unormed(), &layer.transform(&points).unwrap());
    assert!(region.inside(&points).unwrap().iter().all(|&b| b));

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
    for &method in region.sampling_methods() {
        let batch = region.sample_with(method, 4000, &mut rng).unwrap();
        assert_eq!(batch.len(), 4000, "{method}");
        assert!(batch.ncalls >= 4000);

        let (lo1, hi1) = column_range(&batch.points, 0);
        let (lo2, hi2) = column_range(&batch.points, 1);
        assert!(0.15 < lo1 && lo1 < 0.25, "{method}: lo1 = {lo1}");
        assert!(0.015 < lo2 && lo2 < 0.025, "{method}: lo2 = {lo2}");
        assert!(0.45 < hi1 && hi1 < 0.55, "{method}: hi1 = {hi1}");
        assert!(0.045 < hi2 && hi2 < 0.055, "{method}: hi2 = {hi2}");

        let inside = region.inside(&batch.points).unwrap();
        let frac = inside.iter().filter(|&&b| b).count() as f64 / inside.len() as f64;
        assert!(frac > 0.99, "{method}: inside fraction {frac}");
    }
}

#[test]
fn scaling_region_tiny_radius_keeps_live_points() {
    let points = uniform_box(1000, [0.2, 0.02], [0.5, 0.05], 3);
    let mut layer = TransformLayer::scaling(vec![]);
    layer.optimize(&points, &points).unwrap();
    let mut region = build(&points, &layer);

    region.set_maxradiussq(1e-90).unwrap();
    assert_eq!(region.maxradiussq(), Some(1e-90));
    assert_eq!(region.ball_radiussq().unwrap(), 1e-90);
    assert_eq!(region.unormed(), &layer.transform(&points).unwrap());
    assert!(region.inside(&points).unwrap().iter().all(|&b| b));
    // The refitted ellipsoid still holds every live point
    assert!(region.inside_ellipsoid(&points).unwrap().iter().all(|&b| b));
}

// ============================================================================
// Affine transform
// ============================================================================

#[test]
fn affine_region_covers_box() {
    let points = uniform_box(1000, [0.0, 0.0], [1.0, 0.5], 4);
    let mut layer = TransformLayer::affine(vec![]);
    layer.optimize(&points, &points).unwrap();
    assert_eq!(layer.nclusters(), 1);

    let region = build(&points, &layer);
    assert_eq!(region.unormed(), &layer.transform(&points).unwrap());
    assert!(region.inside(&points).unwrap().iter().all(|&b| b));

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
    for &method in region.sampling_methods() {
        let batch = region.sample_with(method, 4000, &mut rng).unwrap();
        assert_eq!(batch.len(), 4000, "{method}");

        let (lo1, hi1) = column_range(&batch.points, 0);
        let (lo2, hi2) = column_range(&batch.points, 1);
        assert!((0.0..0.1).contains(&lo1), "{method}: lo1 = {lo1}");
        assert!((0.0..0.1).contains(&lo2), "{method}: lo2 = {lo2}");
        assert!(0.95 < hi1 && hi1 <= 1.0, "{method}: hi1 = {hi1}");
        assert!((0.45..0.55).contains(&hi2), "{method}: hi2 = {hi2}");
        assert!(region.inside(&batch.points).unwrap().iter().all(|&b| b));
    }
}

#[test]
fn raw_strategies() {
    let points = uniform_box(500, [0.3, 0.3], [0.7, 0.6], 6);
    let mut layer = TransformLayer::affine(vec![]);
    layer.optimize(&points, &points).unwrap();
    let region = build(&points, &layer);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);

    // Ellipsoid draws are unconditional
    let batch = region.sample_from_ellipsoid(1000, &mut rng).unwrap();
    assert_eq!(batch.len(), 1000);
    assert_eq!(batch.ncalls, 1000);
    assert!(region
        .inside_ellipsoid(&batch.points)
        .unwrap()
        .iter()
        .all(|&b| b));

    let batch = region.sample_from_balls(1000, &mut rng).unwrap();
    assert_eq!(batch.len(), 1000);
    assert!(batch.efficiency() > 0.0 && batch.efficiency() <= 1.0);
    assert!(region.inside(&batch.points).unwrap().iter().all(|&b| b));
}

// ============================================================================
// Adaptive selection
// ============================================================================

#[test]
fn adaptive_sampling_tries_every_method() {
    let points = uniform_box(400, [0.2, 0.2], [0.8, 0.4], 8);
    let mut layer = TransformLayer::affine(vec![]);
    layer.optimize(&points, &points).unwrap();
    let mut region = build(&points, &layer);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(9);

    assert_eq!(region.current_sampling_method(), SamplingMethod::BallUnion);
    region.sample(200, &mut rng).unwrap();
    assert_eq!(region.current_sampling_method(), SamplingMethod::Ellipsoid);
    region.sample(200, &mut rng).unwrap();

    let summary = region.summary();
    assert!(summary.efficiencies.iter().all(|(_, e)| e.is_some()));
    for _ in 0..3 {
        let batch = region.sample(100, &mut rng).unwrap();
        assert_eq!(batch.len(), 100);
        assert!(region.inside(&batch.points).unwrap().iter().all(|&b| b));
    }
}

#[test]
fn draw_cap_returns_partial_batch() {
    let points = uniform_box(200, [0.2, 0.2], [0.8, 0.8], 10);
    let mut layer = TransformLayer::affine(vec![]);
    layer.optimize(&points, &points).unwrap();
    let config = RegionConfig::new().max_candidate_draws(50).draw_batch_size(16);
    let mut region = Region::new(&points, &layer, config).unwrap();
    region.apply_enlargement(10).unwrap();
    region.create_wrapping_geometry().unwrap();

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
    let batch = region
        .sample_with(SamplingMethod::BallUnion, 1000, &mut rng)
        .unwrap();
    assert_eq!(batch.ncalls, 50);
    assert!(batch.len() <= 50);
}

// ============================================================================
// Ellipsoid and pair distance
// ============================================================================

#[test]
fn ellipsoid_membership_matches_quadratic_form() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(12);
    let points = Points::from_fn(1000, 2, |_, k| {
        let x = 0.4 + 0.2 * rng.random::<f64>();
        if k == 1 {
            x * 0.5
        } else {
            x
        }
    });
    let mut layer = TransformLayer::affine(vec![]);
    layer.optimize(&points, &points).unwrap();
    let region = build(&points, &layer);

    let center = region.ellipsoid_center().unwrap().clone();
    let invcov = region.ellipsoid_invcov().unwrap().clone();
    let enlarge = region.ellipsoid().unwrap().enlarge();
    assert_eq!(enlarge, region.enlarge().unwrap());
    assert!(region.inside_ellipsoid(&points).unwrap().iter().all(|&b| b));

    let test_points = Points::from_fn(100, 2, |_, _| rng.random::<f64>());
    let inside = region.inside_ellipsoid(&test_points).unwrap();
    let mut ninside = 0;
    for (i, &flag) in inside.iter().enumerate() {
        let d = test_points.row(i).transpose() - &center;
        let expected = d.dot(&(&invcov * &d)) <= enlarge;
        assert_eq!(flag, expected, "point {i}");
        ninside += usize::from(flag);
    }
    assert!(ninside < 100);
}

#[test]
fn mean_pair_distance_on_half_annulus() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(13);
    let n = 300;
    let mut points = Points::zeros(n, 2);
    for i in 0..n {
        let angle = std::f64::consts::PI * rng.random::<f64>();
        let radius = 0.3 + 0.1 * rng.random::<f64>();
        points[(i, 0)] = 0.5 + radius * angle.cos();
        points[(i, 1)] = 0.1 + radius * angle.sin();
    }
    let mut layer = TransformLayer::affine(vec![]);
    layer.optimize(&points, &points).unwrap();
    let region = Region::new(&points, &layer, RegionConfig::default()).unwrap();

    let u = region.unormed();
    let mut total = 0.0;
    for i in 0..n {
        for j in 0..i {
            let mut d2 = 0.0;
            for k in 0..2 {
                let d = u[(i, k)] - u[(j, k)];
                d2 += d * d;
            }
            total += f64::sqrt(d2);
        }
    }
    let expected = total / (n * (n - 1) / 2) as f64;
    assert_eq!(region.compute_mean_pair_distance(), expected);
    assert!(expected > 0.0);
}

// ============================================================================
// Lifecycle errors
// ============================================================================

#[test]
fn sampling_before_geometry_is_not_ready() {
    let points = uniform_box(100, [0.2, 0.2], [0.8, 0.8], 14);
    let mut layer = TransformLayer::scaling(vec![]);
    layer.optimize(&points, &points).unwrap();
    let mut region = Region::new(&points, &layer, RegionConfig::default()).unwrap();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(15);

    region.apply_enlargement(5).unwrap();
    for result in [
        region.sample_from_balls(10, &mut rng),
        region.sample_from_ellipsoid(10, &mut rng),
        region.sample_with(SamplingMethod::Ellipsoid, 10, &mut rng),
    ] {
        assert_eq!(
            result.unwrap_err(),
            RegionError::NotReady {
                stage: "create_wrapping_geometry"
            }
        );
    }

    region.create_wrapping_geometry().unwrap();
    // A new enlargement discards the geometry
    region.apply_enlargement(5).unwrap();
    assert!(region.ellipsoid().is_err());
    assert!(region.cones().is_empty());
}

#[test]
fn membership_dimension_mismatch() {
    let points = uniform_box(100, [0.2, 0.2], [0.8, 0.8], 16);
    let mut layer = TransformLayer::scaling(vec![]);
    layer.optimize(&points, &points).unwrap();
    let region = build(&points, &layer);
    let wrong = Points::zeros(3, 3);
    assert_eq!(
        region.inside(&wrong).unwrap_err(),
        RegionError::DimensionMismatch {
            expected: 2,
            actual: 3
        }
    );
}

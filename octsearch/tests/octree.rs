use nalgebra::Point3;
use octsearch::{
    shapes::{EdgeShapes, Intersect, PointShapes, Segment, Shapes},
    Octree, Settings, TreeBoundBox, VolumeType,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_points(rng: &mut StdRng, n: usize, scale: f64) -> Vec<Point3<f64>> {
    (0..n)
        .map(|_| {
            Point3::new(
                rng.gen_range(-scale..scale),
                rng.gen_range(-scale..scale),
                rng.gen_range(-scale..scale),
            )
        })
        .collect()
}

/// Convex polygon in the `z = 0` plane, as a closed loop of edges
fn polygon(n: usize) -> (Vec<Point3<f64>>, Vec<[usize; 2]>) {
    let pts = (0..n)
        .map(|i| {
            let a = std::f64::consts::TAU * (i as f64 + 0.25) / n as f64;
            Point3::new(a.cos(), a.sin(), 0.0)
        })
        .collect();
    let edges = (0..n).map(|i| [i, (i + 1) % n]).collect();
    (pts, edges)
}

/// Bounds around the polygon whose subdivision planes never hit `z = 0`
fn polygon_bounds() -> TreeBoundBox {
    TreeBoundBox::new(Point3::new(-1.7, -1.9, -1.0), Point3::new(2.3, 2.1, 0.5))
}

#[test]
fn test_three_points() {
    let pts = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(10.0, 0.0, 0.0),
        Point3::new(0.0, 10.0, 0.0),
    ];
    let bb = TreeBoundBox::new(
        Point3::new(-1.0, -1.0, -1.0),
        Point3::new(11.0, 11.0, 11.0),
    );
    let settings = Settings {
        max_levels: 4,
        max_leaf_ratio: 1.0,
        ..Settings::default()
    };
    let tree = Octree::build(PointShapes::new(&pts), bb, settings).unwrap();
    let hit = tree
        .find_nearest(&Point3::new(1.0, 1.0, 1.0), f64::INFINITY)
        .unwrap();
    assert_eq!(hit.index, 0);
    assert_eq!(hit.point, pts[0]);
    assert_eq!((hit.point - Point3::new(1.0, 1.0, 1.0)).norm_squared(), 3.0);
}

#[test]
fn test_nearest_vs_brute_force() {
    let mut rng = StdRng::seed_from_u64(0x1234);
    let pts = random_points(&mut rng, 1000, 1.0);
    let bb = TreeBoundBox::from_points(&pts).extend(1e-4);
    let tree =
        Octree::build(PointShapes::new(&pts), bb, Settings::default()).unwrap();

    let samples = random_points(&mut rng, 1000, 1.5);
    let hits = tree.find_nearest_many(&samples, f64::INFINITY);
    for (s, hit) in samples.iter().zip(hits) {
        let expected = (0..pts.len())
            .min_by(|a, b| {
                let da = (pts[*a] - s).norm_squared();
                let db = (pts[*b] - s).norm_squared();
                da.total_cmp(&db)
            })
            .unwrap();
        let hit = hit.unwrap();
        assert_eq!(hit.index, expected, "wrong nearest point to {s:?}");
        assert_eq!(tree.find_nearest(s, f64::INFINITY), Some(hit));
    }
}

#[test]
fn test_nearest_line_vs_brute_force() {
    let mut rng = StdRng::seed_from_u64(0x5678);
    let pts = random_points(&mut rng, 300, 1.0);
    let bb = TreeBoundBox::from_points(&pts).extend(1e-4);
    let tree =
        Octree::build(PointShapes::new(&pts), bb, Settings::default()).unwrap();

    for _ in 0..100 {
        let ends = random_points(&mut rng, 2, 1.0);
        let line = Segment::new(ends[0], ends[1]);
        let mut tightest = TreeBoundBox::great();
        let hit = tree.find_nearest_line(&line, &mut tightest).unwrap();

        let dist = |p: &Point3<f64>| (line.nearest_point(p) - p).norm();
        let best = pts.iter().map(dist).fold(f64::INFINITY, f64::min);
        approx::assert_relative_eq!(dist(&pts[hit.index]), best);
    }
}

#[test]
fn test_ray_ordering() {
    let (pts, edges) = polygon(12);
    let tree = Octree::build(
        EdgeShapes::new(&pts, &edges).with_cached_bounds(),
        polygon_bounds(),
        Settings::default(),
    )
    .unwrap();

    let mut rng = StdRng::seed_from_u64(0x9abc);
    for _ in 0..200 {
        let mut end_point = || {
            let a = rng.gen_range(0.0..std::f64::consts::TAU);
            let r = rng.gen_range(1.2..1.6);
            Point3::new(r * a.cos(), r * a.sin(), 0.0)
        };
        let start = end_point();
        let end = end_point();

        let shapes = tree.shapes();
        let brute: Vec<_> = (0..shapes.len())
            .filter_map(|i| shapes.intersect(i, &start, &end).map(|p| (i, p)))
            .collect();
        let nearest = brute.iter().min_by(|a, b| {
            (a.1 - start).norm().total_cmp(&(b.1 - start).norm())
        });

        let hit = tree.find_line(&start, &end);
        match (nearest, hit) {
            (None, None) => (),
            (Some((i, p)), Some(hit)) => {
                approx::assert_relative_eq!(
                    (hit.point - start).norm(),
                    (p - start).norm(),
                    epsilon = 1e-9
                );
                if (hit.point - p).norm() > 1e-9 {
                    panic!("expected edge {i} at {p:?}, got {hit:?}");
                }
            }
            (a, b) => panic!("mismatch for {start:?} -> {end:?}: {a:?} {b:?}"),
        }

        // Any hit must be a real one
        if let Some(hit) = tree.find_line_any(&start, &end) {
            assert!(brute.iter().any(|(i, _)| *i == hit.index));
        } else {
            assert!(brute.is_empty());
        }

        // Every hit is reported, nearest first
        let all = tree.find_all_intersections(&start, &end);
        assert_eq!(all.len(), brute.len());
        assert!(all.windows(2).all(|w| {
            (w[0].point - start).norm() <= (w[1].point - start).norm()
        }));
    }
}

#[test]
fn test_round_trip() {
    let (pts, edges) = polygon(40);
    let settings = Settings {
        max_leaf_ratio: 2.0,
        ..Settings::default()
    };
    let tree = Octree::build(
        EdgeShapes::new(&pts, &edges),
        polygon_bounds(),
        settings,
    )
    .unwrap();

    let mut buf = vec![];
    tree.save(&mut buf).unwrap();
    let loaded =
        Octree::load(EdgeShapes::new(&pts, &edges), settings, buf.as_slice())
            .unwrap();
    assert_eq!(tree.nodes(), loaded.nodes());
    assert_eq!(tree.contents(), loaded.contents());

    let mut rng = StdRng::seed_from_u64(0xdef0);
    for _ in 0..100 {
        let s = random_points(&mut rng, 2, 1.5);
        assert_eq!(
            tree.find_nearest(&s[0], f64::INFINITY),
            loaded.find_nearest(&s[0], f64::INFINITY)
        );
        let a = Point3::new(s[0].x, s[0].y, 0.0);
        let b = Point3::new(s[1].x, s[1].y, 0.0);
        assert_eq!(tree.find_line(&a, &b), loaded.find_line(&a, &b));
        assert_eq!(
            tree.find_sphere(&s[0], 0.3),
            loaded.find_sphere(&s[0], 0.3)
        );
    }
}

#[test]
fn test_zero_shapes() {
    let pts: Vec<Point3<f64>> = vec![];
    let bb = TreeBoundBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
    let tree =
        Octree::build(PointShapes::new(&pts), bb, Settings::default()).unwrap();
    assert!(tree.is_empty());

    let p = Point3::new(0.5, 0.5, 0.5);
    assert!(tree.find_nearest(&p, f64::INFINITY).is_none());
    let mut tightest = TreeBoundBox::great();
    let line = Segment::new(Point3::origin(), p);
    assert!(tree.find_nearest_line(&line, &mut tightest).is_none());
    assert!(tree.find_box(&bb).is_empty());
    assert!(tree.find_sphere(&p, 10.0).is_empty());
    assert!(tree.find_indices(&p).is_empty());
    assert!(tree.find_node(&p).is_none());
    assert_eq!(tree.classify(&p), VolumeType::Unknown);

    let mut pairs = 0;
    tree.find_near(1.0, &tree, |_, _, _, _, _| pairs += 1);
    assert_eq!(pairs, 0);

    let mut buf = vec![];
    tree.save(&mut buf).unwrap();
    let loaded = Octree::load(
        PointShapes::new(&pts),
        Settings::default(),
        buf.as_slice(),
    )
    .unwrap();
    assert!(loaded.is_empty());
}

#[test]
fn test_determinism() {
    let mut rng = StdRng::seed_from_u64(42);
    let pts = random_points(&mut rng, 500, 1.0);
    let bb = TreeBoundBox::from_points(&pts).extend(1e-4);
    let a =
        Octree::build(PointShapes::new(&pts), bb, Settings::default()).unwrap();
    let b =
        Octree::build(PointShapes::new(&pts), bb, Settings::default()).unwrap();
    assert_eq!(a.nodes(), b.nodes());
    assert_eq!(a.contents(), b.contents());

    a.ensure_classified();
    for s in random_points(&mut rng, 100, 1.2) {
        let h = a.find_nearest(&s, f64::INFINITY);
        for _ in 0..3 {
            assert_eq!(a.find_nearest(&s, f64::INFINITY), h);
        }
        assert_eq!(b.find_nearest(&s, f64::INFINITY), h);
    }
}

#[test]
fn test_coverage() {
    let mut rng = StdRng::seed_from_u64(7);
    let pts = random_points(&mut rng, 400, 1.0);
    let edges: Vec<[usize; 2]> = (0..200).map(|i| [2 * i, 2 * i + 1]).collect();
    let bb = TreeBoundBox::from_points(&pts).extend(1e-4);
    let settings = Settings {
        max_leaf_ratio: 4.0,
        max_duplicity: 6.0,
        ..Settings::default()
    };
    let tree =
        Octree::build(EdgeShapes::new(&pts, &edges), bb, settings).unwrap();
    let shapes = tree.shapes();

    // Every bucket holds exactly the shapes that overlap its octant
    for (i, node) in tree.nodes().iter().enumerate() {
        for o in octsearch::bounds::Octant::iter() {
            let sub = tree.sub_bounds(i, o);
            let expected: Vec<usize> = (0..shapes.len())
                .filter(|s| shapes.overlaps_box(*s, &sub))
                .collect();
            match node.children[o.index()] {
                octsearch::tree::OctantRef::Content(c) => {
                    let mut got = tree.contents()[c].clone();
                    got.sort();
                    assert_eq!(got, expected, "node {i} octant {o}");
                }
                octsearch::tree::OctantRef::Empty => {
                    assert!(expected.is_empty(), "node {i} octant {o}");
                }
                octsearch::tree::OctantRef::Node(..) => (),
            }
        }
    }

    // Range queries match a linear scan
    for _ in 0..50 {
        let c = random_points(&mut rng, 2, 1.0);
        let query = TreeBoundBox::new(c[0].inf(&c[1]), c[0].sup(&c[1]));
        let expected: Vec<usize> = (0..shapes.len())
            .filter(|s| shapes.overlaps_box(*s, &query))
            .collect();
        assert_eq!(tree.find_box(&query), expected);

        let r2 = rng.gen_range(0.01..0.2);
        let expected: Vec<usize> = (0..shapes.len())
            .filter(|s| shapes.overlaps_sphere(*s, &c[0], r2))
            .collect();
        assert_eq!(tree.find_sphere(&c[0], r2), expected);
    }
}

#[test]
fn test_find_near() {
    let mut rng = StdRng::seed_from_u64(99);
    let a_pts = random_points(&mut rng, 200, 1.0);
    let b_pts = random_points(&mut rng, 150, 1.0);
    let bb = TreeBoundBox::new(
        Point3::new(-1.0, -1.0, -1.0),
        Point3::new(1.0, 1.0, 1.0),
    )
    .extend(1e-4);
    let settings = Settings {
        max_leaf_ratio: 4.0,
        ..Settings::default()
    };
    let a = Octree::build(PointShapes::new(&a_pts), bb, settings).unwrap();
    let b = Octree::build(PointShapes::new(&b_pts), bb, settings).unwrap();

    let near = 0.1;
    let mut found = std::collections::BTreeSet::new();
    a.find_near(near, &b, |d, sa, i, sb, j| {
        if (sa.point(i) - sb.point(j)).norm() <= d {
            found.insert((i, j));
        }
    });

    let mut expected = std::collections::BTreeSet::new();
    for (i, p) in a_pts.iter().enumerate() {
        for (j, q) in b_pts.iter().enumerate() {
            if (p - q).norm() <= near {
                expected.insert((i, j));
            }
        }
    }
    assert!(!expected.is_empty());
    assert_eq!(found, expected);

    // Self-pairs are skipped when comparing a tree with itself
    a.find_near(near, &a, |_, _, i, _, j| assert_ne!(i, j));
}

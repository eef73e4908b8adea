use nalgebra::Point3;
use octsearch::{
    shapes::{Classify, PatchShapes},
    Octree, Settings, TreeBoundBox, VolumeType,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Unit cube split into 12 outward-facing triangles
fn cube() -> (Vec<Point3<f64>>, Vec<Vec<usize>>) {
    let pts = (0..8)
        .map(|i| {
            Point3::new(
                (i & 1) as f64,
                ((i >> 1) & 1) as f64,
                ((i >> 2) & 1) as f64,
            )
        })
        .collect();
    let quads = [
        [0, 4, 6, 2],
        [1, 3, 7, 5],
        [0, 1, 5, 4],
        [2, 6, 7, 3],
        [0, 2, 3, 1],
        [4, 5, 7, 6],
    ];
    let tris = quads
        .iter()
        .flat_map(|[a, b, c, d]| [vec![*a, *b, *c], vec![*a, *c, *d]])
        .collect();
    (pts, tris)
}

fn tree<'a>(
    pts: &'a [Point3<f64>],
    tris: &'a [Vec<usize>],
) -> Octree<PatchShapes<'a>> {
    let bb = TreeBoundBox::new(
        Point3::new(-1.1, -1.2, -1.3),
        Point3::new(2.3, 2.2, 2.1),
    );
    let settings = Settings {
        max_leaf_ratio: 2.0,
        ..Settings::default()
    };
    let shapes = PatchShapes::new(pts, tris).with_cached_bounds();
    Octree::build(shapes, bb, settings).unwrap()
}

fn truth(p: &Point3<f64>) -> VolumeType {
    if p.iter().all(|c| *c > 0.0 && *c < 1.0) {
        VolumeType::Inside
    } else {
        VolumeType::Outside
    }
}

#[test]
fn test_cube_centre_and_far_field() {
    let (pts, tris) = cube();
    let tree = tree(&pts, &tris);
    assert_eq!(tree.classify(&Point3::new(0.5, 0.5, 0.5)), VolumeType::Inside);
    assert_eq!(
        tree.classify(&Point3::new(10.0, 10.0, 10.0)),
        VolumeType::Outside
    );
    assert_eq!(
        tree.classify(&Point3::new(-5.0, 0.5, 0.5)),
        VolumeType::Outside
    );
}

#[test]
fn test_cube_far_away() {
    // Bounds hugging the cube, so that far samples land in octants which
    // hold faces and have to be classified against the nearest face
    let (pts, tris) = cube();
    let bb = TreeBoundBox::new(
        Point3::new(-1e-4, -1e-4, -1e-4),
        Point3::new(1.0001, 1.0001, 1.0001),
    );
    let settings = Settings {
        max_leaf_ratio: 2.0,
        ..Settings::default()
    };
    let shapes = PatchShapes::new(&pts, &tris).with_cached_bounds();
    let tree = Octree::build(shapes, bb, settings).unwrap();

    let samples = [
        Point3::new(1e8, 0.5, 0.5),
        Point3::new(0.3, 1e8, 0.6),
        Point3::new(0.4, 0.7, -1e8),
        Point3::new(-1e8, -1e8, 1e8),
        Point3::new(5e9, 0.5, -2e9),
    ];
    for p in &samples {
        assert_eq!(tree.classify(p), VolumeType::Outside, "at {p:?}");
    }
    let types = tree.classify_many(&samples);
    assert!(types.iter().all(|t| *t == VolumeType::Outside));
    assert_eq!(
        tree.classify(&Point3::new(0.5, 0.5, 0.5)),
        VolumeType::Inside
    );
}

#[test]
fn test_cube_on_face() {
    let (pts, tris) = cube();
    let tree = tree(&pts, &tris);
    let shapes = tree.shapes();

    // A point on the surface has a zero offset from its nearest point, which
    // counts as being on the outward side
    for p in [
        Point3::new(1.0, 0.3, 0.6),
        Point3::new(0.2, 0.0, 0.7),
        Point3::new(0.25, 0.4, 1.0),
        // On a triangle diagonal
        Point3::new(0.5, 1.0, 0.5),
    ] {
        assert_eq!(shapes.volume_type(&tree, &p), VolumeType::Outside);
        assert_ne!(tree.classify(&p), VolumeType::Unknown);
    }
}

#[test]
fn test_cube_random() {
    let (pts, tris) = cube();
    let tree = tree(&pts, &tris);
    let mut rng = StdRng::seed_from_u64(0xc0be);

    let samples: Vec<_> = (0..2000)
        .map(|_| {
            Point3::new(
                rng.gen_range(-1.0..2.0),
                rng.gen_range(-1.0..2.0),
                rng.gen_range(-1.0..2.0),
            )
        })
        .filter(|p: &Point3<f64>| {
            // Keep clear of the surface itself
            p.iter().all(|c| (c - 0.0).abs() > 1e-6 && (c - 1.0).abs() > 1e-6)
        })
        .collect();

    let types = tree.classify_many(&samples);
    for (p, t) in samples.iter().zip(&types) {
        assert_eq!(*t, truth(p), "bad classification at {p:?}");
        assert_eq!(tree.shapes().volume_type(&tree, p), truth(p));
    }
}

#[test]
fn test_open_surface() {
    // Dropping two triangles leaves a hole, but points near the remaining
    // faces still classify by their nearest face
    let (pts, mut tris) = cube();
    tris.truncate(10);
    let tree = tree(&pts, &tris);
    assert_eq!(tree.classify(&Point3::new(0.5, 0.5, 0.4)), VolumeType::Inside);
    assert_eq!(
        tree.classify(&Point3::new(0.5, 0.5, -0.4)),
        VolumeType::Outside
    );
}

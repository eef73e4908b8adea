//! Point location and boundary queries on a polyhedral mesh
//!
//! [`MeshSearch`] wraps a [`PolyMesh`] with two octrees, built on first use:
//! one over the cells (for point location and nearest-cell queries) and one
//! over the boundary faces (for nearest-boundary, ray and inside/outside
//! queries).
//!
//! Most queries can be answered in three ways, chosen with [`SearchMethod`]:
//! through the tree, by a linear scan of the whole mesh, or by walking
//! through the mesh from a nearby seed.
use crate::{
    bounds::{GREAT, SMALL, TreeBoundBox},
    shapes::{PatchShapes, Shapes, geom::face_nearest},
    tree::{Hit, Octree, Settings, VolumeType},
    Error,
};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

mod cell;
mod mesh;

pub use cell::CellShapes;
pub use mesh::PolyMesh;

/// Settings for a [`MeshSearch`]
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshSearchSettings {
    /// Relative distance to step past each hit in
    /// [`intersections`](MeshSearch::intersections)
    pub tol: f64,

    /// Settings for the cell tree
    pub cell_tree: Settings,

    /// Settings for the boundary face tree
    pub boundary_tree: Settings,
}

impl Default for MeshSearchSettings {
    fn default() -> Self {
        Self {
            tol: 1e-3,
            cell_tree: Settings {
                max_levels: 8,
                max_leaf_ratio: 10.0,
                max_duplicity: 6.0,
                ..Settings::default()
            },
            boundary_tree: Settings {
                max_levels: 8,
                max_leaf_ratio: 10.0,
                max_duplicity: 3.0,
                ..Settings::default()
            },
        }
    }
}

/// Strategy for a mesh query
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SearchMethod {
    /// Use the cell or boundary tree, building it if needed
    #[default]
    Tree,
    /// Check every cell or face
    Linear,
    /// Walk through the mesh, starting from the given cell or face
    ///
    /// Queries return [`Error::BadSeed`] if the seed is not a cell (or face,
    /// or boundary face, depending on the query) of the mesh.
    Walk(usize),
}

/// Searchable wrapper around a [`PolyMesh`]
///
/// Boundary face indices reported by queries are indices into
/// [`PolyMesh::faces`], not into the boundary face list.
#[derive(Debug)]
pub struct MeshSearch<'a> {
    mesh: &'a PolyMesh,
    settings: MeshSearchSettings,

    /// Bounds supplied by the caller, which survive [`clear`](Self::clear)
    fixed_bounds: Option<TreeBoundBox>,
    bounds: OnceLock<TreeBoundBox>,
    cell_tree: OnceLock<Octree<CellShapes<'a>>>,
    boundary_tree: OnceLock<Octree<PatchShapes<'a>>>,
}

impl<'a> MeshSearch<'a> {
    /// Builds a new search object
    ///
    /// The trees use the bounds of the mesh points, grown slightly.
    pub fn new(
        mesh: &'a PolyMesh,
        settings: MeshSearchSettings,
    ) -> Result<Self, Error> {
        settings.cell_tree.validate()?;
        settings.boundary_tree.validate()?;
        if !(settings.tol > 0.0) {
            return Err(Error::BadSettings("tol must be positive"));
        }
        Ok(Self {
            mesh,
            settings,
            fixed_bounds: None,
            bounds: OnceLock::new(),
            cell_tree: OnceLock::new(),
            boundary_tree: OnceLock::new(),
        })
    }

    /// Builds a new search object with trees over the given bounds
    pub fn with_bounds(
        mesh: &'a PolyMesh,
        bb: TreeBoundBox,
        settings: MeshSearchSettings,
    ) -> Result<Self, Error> {
        if !bb.is_valid() {
            return Err(Error::BadBounds(bb));
        }
        let mut out = Self::new(mesh, settings)?;
        out.fixed_bounds = Some(bb);
        Ok(out)
    }

    /// Returns the underlying mesh
    pub fn mesh(&self) -> &'a PolyMesh {
        self.mesh
    }

    /// Drops the cached trees, so that they are rebuilt on next use
    pub fn clear(&mut self) {
        self.cell_tree.take();
        self.boundary_tree.take();
        self.bounds.take();
    }

    /// Returns the bounds used for the trees
    pub fn bounds(&self) -> TreeBoundBox {
        if let Some(bb) = self.fixed_bounds {
            return bb;
        }
        *self.bounds.get_or_init(|| {
            TreeBoundBox::from_points(self.mesh.points()).extend(1e-4)
        })
    }

    /// Returns the cell tree, building it if needed
    pub fn cell_tree(&self) -> Result<&Octree<CellShapes<'a>>, Error> {
        if let Some(t) = self.cell_tree.get() {
            return Ok(t);
        }
        let t = Octree::build(
            CellShapes::new(self.mesh),
            self.bounds(),
            self.settings.cell_tree,
        )?;
        Ok(self.cell_tree.get_or_init(|| t))
    }

    /// Returns the boundary face tree, building it if needed
    ///
    /// Shape `i` in this tree is face `i + mesh.internal_face_count()`.
    pub fn boundary_tree(&self) -> Result<&Octree<PatchShapes<'a>>, Error> {
        if let Some(t) = self.boundary_tree.get() {
            return Ok(t);
        }
        let t = Octree::build(
            PatchShapes::new(self.mesh.points(), self.mesh.boundary_faces()),
            self.bounds(),
            self.settings.boundary_tree,
        )?;
        Ok(self.boundary_tree.get_or_init(|| t))
    }

    /// Finds the nearest shape, first within the tree's own span
    fn nearest_in<S: Shapes>(
        tree: &Octree<S>,
        sample: &Point3<f64>,
    ) -> Option<Hit> {
        if tree.is_empty() {
            return None;
        }
        let span = tree.bounds().span().norm_squared();
        tree.find_nearest(sample, span)
            .or_else(|| tree.find_nearest(sample, GREAT * GREAT))
    }

    ////////////////////////////////////////////////////////////////////////////

    /// Finds the cell whose centre is nearest to a point
    ///
    /// A walk stops at the first cell with no closer neighbour, so may end
    /// in a local minimum on strongly non-convex meshes.
    pub fn find_nearest_cell(
        &self,
        location: &Point3<f64>,
        method: SearchMethod,
    ) -> Result<usize, Error> {
        let centres = self.mesh.cell_centres();
        Ok(match method {
            SearchMethod::Tree => {
                let tree = self.cell_tree()?;
                Self::nearest_in(tree, location)
                    .ok_or(Error::OutOfReach(*location))?
                    .index
            }
            SearchMethod::Linear => {
                find_nearer(location, centres, 0..centres.len(), 0).0
            }
            SearchMethod::Walk(seed) => {
                let mut cur = check_seed(seed, 0..centres.len(), "cell")?;
                let mut dist = (centres[cur] - location).norm_squared();
                loop {
                    let nbrs = self.mesh.cell_cells()[cur].iter().copied();
                    let (next, d) = find_nearer(location, centres, nbrs, cur);
                    if d >= dist {
                        break cur;
                    }
                    cur = next;
                    dist = d;
                }
            }
        })
    }

    /// Finds the face whose centre is nearest to a point
    pub fn find_nearest_face(
        &self,
        location: &Point3<f64>,
        method: SearchMethod,
    ) -> Result<usize, Error> {
        let centres = self.mesh.face_centres();
        let cells = self.mesh.cells();
        Ok(match method {
            SearchMethod::Tree => {
                let cell = self.find_nearest_cell(location, method)?;
                let faces = &cells[cell];
                let (f, _) = find_nearer(
                    location,
                    centres,
                    faces.iter().copied(),
                    faces[0],
                );
                f
            }
            SearchMethod::Linear => {
                find_nearer(location, centres, 0..centres.len(), 0).0
            }
            SearchMethod::Walk(seed) => {
                let mut cur = check_seed(seed, 0..centres.len(), "face")?;
                loop {
                    let owner = self.mesh.owner()[cur];
                    let mut candidates = cells[owner].clone();
                    if self.mesh.is_internal_face(cur) {
                        let n = self.mesh.neighbour()[cur];
                        candidates.extend(&cells[n]);
                    }
                    let (next, _) = find_nearer(
                        location,
                        centres,
                        candidates.into_iter(),
                        cur,
                    );
                    if next == cur {
                        break cur;
                    }
                    cur = next;
                }
            }
        })
    }

    /// Finds the cell containing a point
    ///
    /// Returns `None` if the point is outside the mesh, or (for a walk) if
    /// the walk gets stuck before reaching it.
    pub fn find_cell(
        &self,
        location: &Point3<f64>,
        method: SearchMethod,
    ) -> Result<Option<usize>, Error> {
        let mesh = self.mesh;
        Ok(match method {
            SearchMethod::Tree => self.cell_tree()?.find_inside(location),
            SearchMethod::Linear => (0..mesh.cell_count())
                .find(|&c| mesh.point_in_cell(location, c)),
            SearchMethod::Walk(seed) => {
                check_seed(seed, 0..mesh.cell_count(), "cell")?;
                self.find_cell_walk(location, seed)
            }
        })
    }

    fn find_cell_walk(
        &self,
        location: &Point3<f64>,
        seed: usize,
    ) -> Option<usize> {
        let mesh = self.mesh;
        if mesh.point_in_cell(location, seed) {
            return Some(seed);
        }
        let centres = mesh.cell_centres();
        let mut cur = seed;
        let mut dist = (centres[cur] - location).norm_squared();
        loop {
            let mut next = None;
            for &c in &mesh.cell_cells()[cur] {
                if mesh.point_in_cell(location, c) {
                    return Some(c);
                }
                let d = (centres[c] - location).norm_squared();
                if d < dist {
                    dist = d;
                    next = Some(c);
                }
            }
            cur = next?;
        }
    }

    /// Finds the boundary face nearest to a point
    ///
    /// Returns `None` if the mesh has no boundary faces.
    pub fn find_nearest_boundary_face(
        &self,
        location: &Point3<f64>,
        method: SearchMethod,
    ) -> Result<Option<usize>, Error> {
        let mesh = self.mesh;
        let offset = mesh.internal_face_count();
        let dist = |f: usize| {
            let face = &mesh.faces()[f];
            let c = &mesh.face_centres()[f];
            let (p, _) = face_nearest(mesh.points(), face, c, location);
            (p - location).norm()
        };
        Ok(match method {
            SearchMethod::Tree => {
                let tree = self.boundary_tree()?;
                Self::nearest_in(tree, location).map(|h| h.index + offset)
            }
            SearchMethod::Linear => {
                let mut best = None;
                let mut min_dist = GREAT;
                for f in offset..mesh.faces().len() {
                    let d = dist(f);
                    if d < min_dist {
                        min_dist = d;
                        best = Some(f);
                    }
                }
                best
            }
            SearchMethod::Walk(seed) => {
                let valid = offset..mesh.faces().len();
                let mut cur = check_seed(seed, valid, "boundary face")?;
                let mut min_dist = dist(cur);
                loop {
                    let last = cur;
                    for &e in &mesh.face_edges()[last] {
                        for &f in &mesh.edge_faces()[e] {
                            if f >= offset && f != last {
                                let d = dist(f);
                                if d < min_dist {
                                    min_dist = d;
                                    cur = f;
                                }
                            }
                        }
                    }
                    if cur == last {
                        break Some(cur);
                    }
                }
            }
        })
    }

    /// Finds the first boundary face hit by the segment `start → end`
    pub fn intersection(
        &self,
        start: &Point3<f64>,
        end: &Point3<f64>,
    ) -> Result<Option<Hit>, Error> {
        let offset = self.mesh.internal_face_count();
        let hit = self.boundary_tree()?.find_line(start, end);
        Ok(hit.map(|h| Hit {
            index: h.index + offset,
            point: h.point,
        }))
    }

    /// Finds every boundary face hit by the segment `start → end`, in order
    ///
    /// After each hit, the search restarts a small distance further along
    /// the segment (scaled by [`MeshSearchSettings::tol`] and the distance
    /// from the hit to the centre of the face's owner cell).
    pub fn intersections(
        &self,
        start: &Point3<f64>,
        end: &Point3<f64>,
    ) -> Result<Vec<Hit>, Error> {
        let mesh = self.mesh;
        let dir = (end - start).normalize();
        let mut out = vec![];
        let mut pt = *start;
        while let Some(hit) = self.intersection(&pt, end)? {
            out.push(hit);
            let typ_dim = mesh.face_areas()[hit.index].norm().sqrt();
            if (hit.point - end).norm() / typ_dim < SMALL {
                break;
            }
            pt = hit.point + self.offset(&hit.point, hit.index, &dir);
        }
        Ok(out)
    }

    /// Step past a boundary hit, scaled by the owner cell size
    fn offset(
        &self,
        point: &Point3<f64>,
        face: usize,
        dir: &Vector3<f64>,
    ) -> Vector3<f64> {
        let owner = self.mesh.owner()[face];
        let c = self.mesh.cell_centres()[owner];
        dir * (self.settings.tol * (c - point).norm())
    }

    /// Checks whether a point is inside the mesh boundary
    pub fn is_inside(&self, p: &Point3<f64>) -> Result<bool, Error> {
        Ok(self.boundary_tree()?.classify(p) == VolumeType::Inside)
    }
}

/// Checks that a walk starts inside the valid index range
fn check_seed(
    seed: usize,
    valid: std::ops::Range<usize>,
    what: &str,
) -> Result<usize, Error> {
    if valid.contains(&seed) {
        Ok(seed)
    } else {
        Err(Error::BadSeed(format!("{what} {seed} is not in {valid:?}")))
    }
}

/// Finds the point nearest to `sample` among the given candidates
///
/// Returns the starting index (and its distance) if no candidate is strictly
/// closer.
fn find_nearer(
    sample: &Point3<f64>,
    points: &[Point3<f64>],
    candidates: impl Iterator<Item = usize>,
    start: usize,
) -> (usize, f64) {
    let mut best = start;
    let mut best_dist = (points[start] - sample).norm_squared();
    for i in candidates {
        let d = (points[i] - sample).norm_squared();
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    (best, best_dist)
}

#[cfg(test)]
mod test {
    use super::*;

    fn block() -> PolyMesh {
        let bb = TreeBoundBox::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 4.0, 4.0),
        );
        PolyMesh::hex_block(&bb, [4, 4, 4]).unwrap()
    }

    #[test]
    fn test_settings() {
        let mesh = block();
        let settings = MeshSearchSettings {
            tol: 0.0,
            ..MeshSearchSettings::default()
        };
        assert!(matches!(
            MeshSearch::new(&mesh, settings),
            Err(Error::BadSettings(..))
        ));
        let bb = TreeBoundBox::inverted();
        assert!(matches!(
            MeshSearch::with_bounds(&mesh, bb, MeshSearchSettings::default()),
            Err(Error::BadBounds(..))
        ));
    }

    #[test]
    fn test_find_cell() {
        let mesh = block();
        let search = MeshSearch::new(&mesh, MeshSearchSettings::default())
            .unwrap();
        let p = Point3::new(2.3, 1.6, 3.2);
        // Cell (2, 1, 3)
        let expected = 2 + 4 * (1 + 4 * 3);
        for m in [
            SearchMethod::Tree,
            SearchMethod::Linear,
            SearchMethod::Walk(0),
        ] {
            assert_eq!(search.find_cell(&p, m).unwrap(), Some(expected));
            assert_eq!(search.find_nearest_cell(&p, m).unwrap(), expected);
        }

        let outside = Point3::new(5.0, 1.0, 1.0);
        assert_eq!(
            search.find_cell(&outside, SearchMethod::Tree).unwrap(),
            None
        );
        assert_eq!(
            search.find_cell(&outside, SearchMethod::Linear).unwrap(),
            None
        );
        assert_eq!(
            search.find_cell(&outside, SearchMethod::Walk(5)).unwrap(),
            None
        );
    }

    #[test]
    fn test_nearest_face() {
        let mesh = block();
        let search = MeshSearch::new(&mesh, MeshSearchSettings::default())
            .unwrap();
        let p = Point3::new(2.9, 1.6, 3.4);
        let tree = search.find_nearest_face(&p, SearchMethod::Tree).unwrap();
        let lin = search.find_nearest_face(&p, SearchMethod::Linear).unwrap();
        let walk =
            search.find_nearest_face(&p, SearchMethod::Walk(0)).unwrap();
        assert_eq!(tree, lin);
        assert_eq!(walk, lin);
        approx::assert_relative_eq!(
            mesh.face_centres()[lin],
            Point3::new(3.0, 1.5, 3.5)
        );
    }

    #[test]
    fn test_nearest_boundary_face() {
        let mesh = block();
        let search = MeshSearch::new(&mesh, MeshSearchSettings::default())
            .unwrap();
        let p = Point3::new(3.8, 1.5, 2.5);
        let lin = search
            .find_nearest_boundary_face(&p, SearchMethod::Linear)
            .unwrap()
            .unwrap();
        assert!(!mesh.is_internal_face(lin));
        approx::assert_relative_eq!(
            mesh.face_centres()[lin],
            Point3::new(4.0, 1.5, 2.5)
        );
        let last = mesh.faces().len() - 1;
        for m in [SearchMethod::Tree, SearchMethod::Walk(last)] {
            assert_eq!(
                search.find_nearest_boundary_face(&p, m).unwrap(),
                Some(lin)
            );
        }
    }

    #[test]
    fn test_intersections() {
        let mesh = block();
        let search = MeshSearch::new(&mesh, MeshSearchSettings::default())
            .unwrap();
        let start = Point3::new(-1.0, 1.3, 2.6);
        let end = Point3::new(5.0, 1.3, 2.6);
        let hit = search.intersection(&start, &end).unwrap().unwrap();
        approx::assert_relative_eq!(hit.point, Point3::new(0.0, 1.3, 2.6));
        assert!(!mesh.is_internal_face(hit.index));
        assert_eq!(mesh.owner()[hit.index], 4 * (1 + 4 * 2));

        let hits = search.intersections(&start, &end).unwrap();
        assert_eq!(hits.len(), 2);
        approx::assert_relative_eq!(
            hits[1].point,
            Point3::new(4.0, 1.3, 2.6)
        );
        assert_eq!(mesh.owner()[hits[1].index], 3 + 4 * (1 + 4 * 2));

        // Segment ending inside the mesh
        let inner = Point3::new(2.0, 1.3, 2.6);
        assert_eq!(search.intersections(&start, &inner).unwrap().len(), 1);
    }

    #[test]
    fn test_bad_seed() {
        let mesh = block();
        let search = MeshSearch::new(&mesh, MeshSearchSettings::default())
            .unwrap();
        let p = Point3::new(1.5, 1.5, 1.5);
        let cells = mesh.cell_count();
        let faces = mesh.faces().len();

        assert!(matches!(
            search.find_cell(&p, SearchMethod::Walk(cells)),
            Err(Error::BadSeed(..))
        ));
        assert!(matches!(
            search.find_nearest_cell(&p, SearchMethod::Walk(cells)),
            Err(Error::BadSeed(..))
        ));
        assert!(matches!(
            search.find_nearest_face(&p, SearchMethod::Walk(faces)),
            Err(Error::BadSeed(..))
        ));
        // Internal faces can't start a walk over the boundary
        assert!(matches!(
            search.find_nearest_boundary_face(&p, SearchMethod::Walk(0)),
            Err(Error::BadSeed(..))
        ));
        assert!(matches!(
            search.find_nearest_boundary_face(&p, SearchMethod::Walk(faces)),
            Err(Error::BadSeed(..))
        ));

        // The last valid seeds still work
        assert!(search.find_cell(&p, SearchMethod::Walk(cells - 1)).is_ok());
        assert!(
            search
                .find_nearest_boundary_face(&p, SearchMethod::Walk(faces - 1))
                .is_ok()
        );
    }

    #[test]
    fn test_far_away() {
        let bb = TreeBoundBox::new(
            Point3::origin(),
            Point3::new(3.0, 3.0, 3.0),
        );
        let mesh = PolyMesh::hex_block(&bb, [3, 3, 3]).unwrap();
        let search = MeshSearch::new(&mesh, MeshSearchSettings::default())
            .unwrap();
        let p = Point3::new(1e8, 2.5, 2.5);

        // Distances this large tie between neighbouring cells, so compare
        // by distance rather than by index
        let dist = |c: usize| (mesh.cell_centres()[c] - p).norm_squared();
        let lin = search.find_nearest_cell(&p, SearchMethod::Linear).unwrap();
        let tree = search.find_nearest_cell(&p, SearchMethod::Tree).unwrap();
        assert_eq!(dist(tree), dist(lin));
        approx::assert_relative_eq!(
            mesh.cell_centres()[tree].x,
            2.5,
            epsilon = 1e-12
        );

        let f = search
            .find_nearest_boundary_face(&p, SearchMethod::Tree)
            .unwrap()
            .unwrap();
        assert!(!mesh.is_internal_face(f));
        assert!(mesh.faces()[f].iter().any(|&i| mesh.points()[i].x == 3.0));

        assert!(!search.is_inside(&p).unwrap());
    }

    #[test]
    fn test_is_inside() {
        let mesh = block();
        let mut search = MeshSearch::new(&mesh, MeshSearchSettings::default())
            .unwrap();
        assert!(search.is_inside(&Point3::new(1.1, 2.2, 3.3)).unwrap());
        assert!(!search.is_inside(&Point3::new(4.1, 2.2, 3.3)).unwrap());
        assert!(!search.is_inside(&Point3::new(-0.1, -0.2, 5.3)).unwrap());

        search.clear();
        assert!(search.is_inside(&Point3::new(3.9, 0.1, 0.2)).unwrap());
    }
}

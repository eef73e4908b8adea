use super::PolyMesh;
use crate::{
    bounds::TreeBoundBox,
    shapes::{Contains, Nearest, Shapes},
};
use nalgebra::Point3;

/// Shape collection where each shape is a mesh cell
///
/// Overlap tests use the cell's bounding box, and nearest-point queries use
/// the cell centre.
#[derive(Clone, Debug)]
pub struct CellShapes<'a> {
    mesh: &'a PolyMesh,
    bbs: Vec<TreeBoundBox>,
}

impl<'a> CellShapes<'a> {
    /// Builds the cell shapes, caching each cell's bounding box
    pub fn new(mesh: &'a PolyMesh) -> Self {
        let bbs =
            (0..mesh.cell_count()).map(|c| mesh.cell_bounds(c)).collect();
        Self { mesh, bbs }
    }

    /// Returns the underlying mesh
    pub fn mesh(&self) -> &'a PolyMesh {
        self.mesh
    }
}

impl Shapes for CellShapes<'_> {
    fn len(&self) -> usize {
        self.mesh.cell_count()
    }

    fn shape_points(&self) -> Vec<Point3<f64>> {
        self.mesh.cell_centres().to_vec()
    }

    fn overlaps_box(&self, index: usize, bb: &TreeBoundBox) -> bool {
        self.bbs[index].overlaps(bb)
    }

    fn overlaps_sphere(
        &self,
        index: usize,
        centre: &Point3<f64>,
        radius_sqr: f64,
    ) -> bool {
        self.bbs[index].overlaps_sphere(centre, radius_sqr)
    }

    fn find_nearest(
        &self,
        indices: &[usize],
        sample: &Point3<f64>,
        nearest: &mut Nearest,
    ) {
        let centres = self.mesh.cell_centres();
        for &i in indices {
            let p = centres[i];
            nearest.update(i, p, (p - sample).norm_squared());
        }
    }
}

impl Contains for CellShapes<'_> {
    fn contains(&self, index: usize, sample: &Point3<f64>) -> bool {
        self.bbs[index].contains(sample)
            && self.mesh.point_in_cell(sample, index)
    }
}

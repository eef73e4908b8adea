use crate::{
    bounds::{TreeBoundBox, VSMALL},
    shapes::geom::{EdgeAddressing, face_area, face_centre},
    Error,
};
use nalgebra::{Point3, Vector3};

/// Minimal polyhedral mesh, in owner / neighbour form
///
/// Faces `0..neighbour.len()` are internal faces, shared by their owner and
/// neighbour cells; the remaining faces are boundary faces, used only by
/// their owner.  Face points are ordered so that the right-hand normal
/// points from the owner to the neighbour (or out of the mesh, for boundary
/// faces).
#[derive(Clone, Debug)]
pub struct PolyMesh {
    points: Vec<Point3<f64>>,
    faces: Vec<Vec<usize>>,
    owner: Vec<usize>,
    neighbour: Vec<usize>,

    cells: Vec<Vec<usize>>,
    cell_cells: Vec<Vec<usize>>,
    face_centres: Vec<Point3<f64>>,
    face_areas: Vec<Vector3<f64>>,
    cell_centres: Vec<Point3<f64>>,
    cell_volumes: Vec<f64>,
    edges: EdgeAddressing,
}

impl PolyMesh {
    /// Builds a mesh, checking that its addressing is consistent
    pub fn new(
        points: Vec<Point3<f64>>,
        faces: Vec<Vec<usize>>,
        owner: Vec<usize>,
        neighbour: Vec<usize>,
    ) -> Result<Self, Error> {
        let bad = |s: String| Err(Error::BadMesh(s));
        if faces.is_empty() {
            return bad("mesh has no faces".to_owned());
        }
        if owner.len() != faces.len() {
            return bad(format!(
                "{} owners for {} faces",
                owner.len(),
                faces.len()
            ));
        }
        if neighbour.len() > faces.len() {
            return bad(format!(
                "{} neighbours for {} faces",
                neighbour.len(),
                faces.len()
            ));
        }
        for (i, f) in faces.iter().enumerate() {
            if f.len() < 3 {
                return bad(format!("face {i} has only {} points", f.len()));
            }
            if let Some(p) = f.iter().find(|p| **p >= points.len()) {
                return bad(format!("face {i} refers to missing point {p}"));
            }
        }
        if let Some(i) =
            (0..neighbour.len()).find(|i| owner[*i] == neighbour[*i])
        {
            return bad(format!("face {i} has the same owner and neighbour"));
        }

        let cell_count =
            owner.iter().chain(&neighbour).max().map_or(0, |c| c + 1);
        let mut cells = vec![vec![]; cell_count];
        for (f, &c) in owner.iter().enumerate() {
            cells[c].push(f);
        }
        for (f, &c) in neighbour.iter().enumerate() {
            cells[c].push(f);
        }
        if let Some(c) = cells.iter().position(|c| c.is_empty()) {
            return bad(format!("cell {c} has no faces"));
        }

        let mut cell_cells = vec![vec![]; cell_count];
        for (&o, &n) in owner.iter().zip(&neighbour) {
            cell_cells[o].push(n);
            cell_cells[n].push(o);
        }

        let face_centres: Vec<_> =
            faces.iter().map(|f| face_centre(&points, f)).collect();
        let face_areas: Vec<_> =
            faces.iter().map(|f| face_area(&points, f)).collect();

        let mut out = Self {
            edges: EdgeAddressing::new(&faces),
            points,
            faces,
            owner,
            neighbour,
            cells,
            cell_cells,
            face_centres,
            face_areas,
            cell_centres: vec![],
            cell_volumes: vec![],
        };
        let (centres, volumes): (Vec<_>, Vec<_>) = (0..cell_count)
            .map(|c| out.calc_cell_centre(c))
            .unzip();
        out.cell_centres = centres;
        out.cell_volumes = volumes;
        Ok(out)
    }

    /// Builds a block of `n[0] × n[1] × n[2]` hexahedral cells filling a box
    ///
    /// Cell `(i, j, k)` has index `i + n[0] * (j + n[1] * k)`.  Internal
    /// faces come first, then the boundary faces on the `-x`, `+x`, `-y`,
    /// `+y`, `-z` and `+z` sides of the block.
    pub fn hex_block(bb: &TreeBoundBox, n: [usize; 3]) -> Result<Self, Error> {
        if !bb.is_valid() {
            return Err(Error::BadBounds(*bb));
        }
        if n.contains(&0) {
            return Err(Error::BadMesh(format!("bad block size {n:?}")));
        }
        let [nx, ny, nz] = n;
        let pid = |i: usize, j: usize, k: usize| {
            i + (nx + 1) * (j + (ny + 1) * k)
        };
        let cid = |i: usize, j: usize, k: usize| i + nx * (j + ny * k);

        let span = bb.span();
        let mut points = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
        for k in 0..=nz {
            for j in 0..=ny {
                for i in 0..=nx {
                    let t = Vector3::new(
                        i as f64 / nx as f64,
                        j as f64 / ny as f64,
                        k as f64 / nz as f64,
                    );
                    points.push(bb.min + span.component_mul(&t));
                }
            }
        }

        // Faces with normals along +x, +y and +z at the low corner of a cell
        let x_face = |i, j, k| {
            vec![
                pid(i, j, k),
                pid(i, j + 1, k),
                pid(i, j + 1, k + 1),
                pid(i, j, k + 1),
            ]
        };
        let y_face = |i, j, k| {
            vec![
                pid(i, j, k),
                pid(i, j, k + 1),
                pid(i + 1, j, k + 1),
                pid(i + 1, j, k),
            ]
        };
        let z_face = |i, j, k| {
            vec![
                pid(i, j, k),
                pid(i + 1, j, k),
                pid(i + 1, j + 1, k),
                pid(i, j + 1, k),
            ]
        };
        let flip = |mut f: Vec<usize>| {
            f.reverse();
            f
        };

        let mut faces = vec![];
        let mut owner = vec![];
        let mut neighbour = vec![];
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let c = cid(i, j, k);
                    if i + 1 < nx {
                        faces.push(x_face(i + 1, j, k));
                        owner.push(c);
                        neighbour.push(cid(i + 1, j, k));
                    }
                    if j + 1 < ny {
                        faces.push(y_face(i, j + 1, k));
                        owner.push(c);
                        neighbour.push(cid(i, j + 1, k));
                    }
                    if k + 1 < nz {
                        faces.push(z_face(i, j, k + 1));
                        owner.push(c);
                        neighbour.push(cid(i, j, k + 1));
                    }
                }
            }
        }

        for k in 0..nz {
            for j in 0..ny {
                faces.push(flip(x_face(0, j, k)));
                owner.push(cid(0, j, k));
            }
        }
        for k in 0..nz {
            for j in 0..ny {
                faces.push(x_face(nx, j, k));
                owner.push(cid(nx - 1, j, k));
            }
        }
        for k in 0..nz {
            for i in 0..nx {
                faces.push(flip(y_face(i, 0, k)));
                owner.push(cid(i, 0, k));
            }
        }
        for k in 0..nz {
            for i in 0..nx {
                faces.push(y_face(i, ny, k));
                owner.push(cid(i, ny - 1, k));
            }
        }
        for j in 0..ny {
            for i in 0..nx {
                faces.push(flip(z_face(i, j, 0)));
                owner.push(cid(i, j, 0));
            }
        }
        for j in 0..ny {
            for i in 0..nx {
                faces.push(z_face(i, j, nz));
                owner.push(cid(i, j, nz - 1));
            }
        }

        Self::new(points, faces, owner, neighbour)
    }

    /// Computes the centre and volume of a cell by splitting it into
    /// pyramids, one per face, around an estimated centre
    fn calc_cell_centre(&self, cell: usize) -> (Point3<f64>, f64) {
        let faces = &self.cells[cell];
        let est = faces
            .iter()
            .map(|f| self.face_centres[*f].coords)
            .sum::<Vector3<f64>>()
            / faces.len() as f64;

        let mut sum = Vector3::zeros();
        let mut vol = 0.0;
        for &f in faces {
            let fc = self.face_centres[f].coords;
            let mut v = self.face_areas[f].dot(&(fc - est)) / 3.0;
            if self.owner[f] != cell {
                v = -v;
            }
            sum += (fc * 0.75 + est * 0.25) * v;
            vol += v;
        }
        if vol.abs() > VSMALL {
            (Point3::from(sum / vol), vol)
        } else {
            (Point3::from(est), vol)
        }
    }

    /// Returns the mesh points
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Returns every face, internal faces first
    pub fn faces(&self) -> &[Vec<usize>] {
        &self.faces
    }

    /// Returns the boundary faces, which start at
    /// [`internal_face_count`](Self::internal_face_count)
    pub fn boundary_faces(&self) -> &[Vec<usize>] {
        &self.faces[self.neighbour.len()..]
    }

    /// Returns the owner cell of each face
    pub fn owner(&self) -> &[usize] {
        &self.owner
    }

    /// Returns the neighbour cell of each internal face
    pub fn neighbour(&self) -> &[usize] {
        &self.neighbour
    }

    /// Number of internal faces
    pub fn internal_face_count(&self) -> usize {
        self.neighbour.len()
    }

    /// Checks whether a face is internal
    pub fn is_internal_face(&self, face: usize) -> bool {
        face < self.neighbour.len()
    }

    /// Number of cells
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Returns the faces of each cell
    pub fn cells(&self) -> &[Vec<usize>] {
        &self.cells
    }

    /// Returns the face-neighbours of each cell
    pub fn cell_cells(&self) -> &[Vec<usize>] {
        &self.cell_cells
    }

    #[allow(missing_docs)]
    pub fn face_centres(&self) -> &[Point3<f64>] {
        &self.face_centres
    }

    #[allow(missing_docs)]
    pub fn face_areas(&self) -> &[Vector3<f64>] {
        &self.face_areas
    }

    #[allow(missing_docs)]
    pub fn cell_centres(&self) -> &[Point3<f64>] {
        &self.cell_centres
    }

    #[allow(missing_docs)]
    pub fn cell_volumes(&self) -> &[f64] {
        &self.cell_volumes
    }

    /// Returns the edges of each face
    pub fn face_edges(&self) -> &[Vec<usize>] {
        &self.edges.face_edges
    }

    /// Returns the faces using each edge
    pub fn edge_faces(&self) -> &[Vec<usize>] {
        &self.edges.edge_faces
    }

    /// Returns the bounding box of a cell
    pub fn cell_bounds(&self, cell: usize) -> TreeBoundBox {
        let mut bb = TreeBoundBox::inverted();
        for &f in &self.cells[cell] {
            for &p in &self.faces[f] {
                bb.add_point(&self.points[p]);
            }
        }
        bb
    }

    /// Checks whether a point is inside a cell
    ///
    /// The point must be on the inner side of (or on) the plane of every
    /// face of the cell, so this is exact for convex cells.
    pub fn point_in_cell(&self, p: &Point3<f64>, cell: usize) -> bool {
        self.cells[cell].iter().all(|&f| {
            let mut n = self.face_areas[f];
            if self.owner[f] != cell {
                n = -n;
            }
            (p - self.face_centres[f]).dot(&n) <= 0.0
        })
    }
}

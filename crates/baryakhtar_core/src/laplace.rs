use crate::mesh::Mesh;

/// Discrete Laplacian of a block-layout vector field on a regular grid.
///
/// Every existing axis neighbour `nb` of cell `i` adds `(F[nb] - F[i]) / h²`.
/// Neighbours outside the grid are dropped, so boundary cells use a reduced
/// stencil instead of wrapping or padding.
#[derive(Debug, Clone, Copy)]
pub struct LaplaceOperator {
    dims: [usize; 3],
    spacing: [f64; 3],
}

impl LaplaceOperator {
    /// Uses the mesh's physical spacings.
    pub fn new(mesh: &Mesh) -> Self {
        Self {
            dims: [mesh.nx, mesh.ny, mesh.nz],
            spacing: mesh.physical_spacing(),
        }
    }

    pub fn apply(&self, field: &[f64], out: &mut [f64]) {
        laplace_field(field, out, self.spacing, self.dims);
    }
}

/// Writes the Laplacian of `field` into `out`; both hold `3 * nx * ny * nz` values.
pub fn laplace_field(field: &[f64], out: &mut [f64], spacing: [f64; 3], dims: [usize; 3]) {
    let [nx, ny, nz] = dims;
    let n = nx * ny * nz;
    debug_assert_eq!(field.len(), 3 * n);
    debug_assert_eq!(out.len(), 3 * n);

    let ax = 1.0 / (spacing[0] * spacing[0]);
    let ay = 1.0 / (spacing[1] * spacing[1]);
    let az = 1.0 / (spacing[2] * spacing[2]);
    let nxy = nx * ny;

    for c in 0..3 {
        let f = &field[c * n..(c + 1) * n];
        let o = &mut out[c * n..(c + 1) * n];
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let id = k * nxy + j * nx + i;
                    let fi = f[id];
                    let mut acc = 0.0;
                    if i > 0 {
                        acc += ax * (f[id - 1] - fi);
                    }
                    if i + 1 < nx {
                        acc += ax * (f[id + 1] - fi);
                    }
                    if j > 0 {
                        acc += ay * (f[id - nx] - fi);
                    }
                    if j + 1 < ny {
                        acc += ay * (f[id + nx] - fi);
                    }
                    if k > 0 {
                        acc += az * (f[id - nxy] - fi);
                    }
                    if k + 1 < nz {
                        acc += az * (f[id + nxy] - fi);
                    }
                    o[id] = acc;
                }
            }
        }
    }
}

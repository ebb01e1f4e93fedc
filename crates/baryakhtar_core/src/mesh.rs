use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};

/// Regular finite-difference mesh of `nx × ny × nz` cuboid cells.
///
/// Spacings are in mesh units; multiply by `unit_length` for metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub unit_length: f64,
}

impl Mesh {
    pub fn new(
        (nx, ny, nz): (usize, usize, usize),
        (dx, dy, dz): (f64, f64, f64),
        unit_length: f64,
    ) -> Result<Self> {
        let mesh = Self {
            nx,
            ny,
            nz,
            dx,
            dy,
            dz,
            unit_length,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Checks dimensions and spacings; deserialized meshes go through this too.
    pub fn validate(&self) -> Result<()> {
        if self.nx == 0 || self.ny == 0 || self.nz == 0 {
            return Err(SimError::config(format!(
                "mesh dimensions must be positive, got {}x{}x{}",
                self.nx, self.ny, self.nz
            )));
        }
        for (label, value) in [
            ("dx", self.dx),
            ("dy", self.dy),
            ("dz", self.dz),
            ("unit_length", self.unit_length),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::config(format!(
                    "{label} must be positive and finite, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Total number of cells.
    pub fn n_cells(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Flat scalar-field offset of cell (i, j, k); x varies fastest.
    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(i < self.nx && j < self.ny && k < self.nz);
        k * self.nx * self.ny + j * self.nx + i
    }

    /// Inverse of [`Mesh::index`].
    #[inline]
    pub fn ijk(&self, index: usize) -> (usize, usize, usize) {
        let nxy = self.nx * self.ny;
        let k = index / nxy;
        let rem = index % nxy;
        (rem % self.nx, rem / self.nx, k)
    }

    /// Cell centre in mesh units.
    pub fn position(&self, index: usize) -> [f64; 3] {
        let (i, j, k) = self.ijk(index);
        [
            (i as f64 + 0.5) * self.dx,
            (j as f64 + 0.5) * self.dy,
            (k as f64 + 0.5) * self.dz,
        ]
    }

    /// Spacings in metres.
    pub fn physical_spacing(&self) -> [f64; 3] {
        [
            self.dx * self.unit_length,
            self.dy * self.unit_length,
            self.dz * self.unit_length,
        ]
    }

    /// Cell volume in cubic metres.
    pub fn cell_volume(&self) -> f64 {
        let [dx, dy, dz] = self.physical_spacing();
        dx * dy * dz
    }

    pub fn contains(&self, i: usize, j: usize, k: usize) -> bool {
        i < self.nx && j < self.ny && k < self.nz
    }
}

use crate::error::{Result, SimError};
use crate::mesh::Mesh;

/// A per-cell configuration value: one value for every cell, a function of the
/// cell centre position (mesh units), or an explicit array in mesh index order.
pub enum CellSource<T> {
    Uniform(T),
    Function(Box<dyn Fn([f64; 3]) -> T>),
    Values(Vec<T>),
}

impl<T: Clone> CellSource<T> {
    pub fn function(f: impl Fn([f64; 3]) -> T + 'static) -> Self {
        CellSource::Function(Box::new(f))
    }

    /// Broadcasts the source onto the mesh.
    pub fn resolve(&self, mesh: &Mesh) -> Result<Vec<T>> {
        let n = mesh.n_cells();
        match self {
            CellSource::Uniform(value) => Ok(vec![value.clone(); n]),
            CellSource::Function(f) => Ok((0..n).map(|idx| f(mesh.position(idx))).collect()),
            CellSource::Values(values) => {
                if values.len() != n {
                    return Err(SimError::config(format!(
                        "expected {} per-cell values, got {}",
                        n,
                        values.len()
                    )));
                }
                Ok(values.clone())
            }
        }
    }
}

impl CellSource<f64> {
    /// Resolves and rejects non-finite values or values outside `[min, ∞)`.
    pub(crate) fn resolve_at_least(&self, mesh: &Mesh, min: f64, label: &str) -> Result<Vec<f64>> {
        let values = self.resolve(mesh)?;
        if let Some((idx, v)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < min)
        {
            return Err(SimError::config(format!(
                "{label} at cell {idx} must be finite and >= {min}, got {v}"
            )));
        }
        Ok(values)
    }
}

impl From<f64> for CellSource<f64> {
    fn from(value: f64) -> Self {
        CellSource::Uniform(value)
    }
}

impl From<Vec<f64>> for CellSource<f64> {
    fn from(values: Vec<f64>) -> Self {
        CellSource::Values(values)
    }
}

impl From<bool> for CellSource<bool> {
    fn from(value: bool) -> Self {
        CellSource::Uniform(value)
    }
}

impl From<Vec<bool>> for CellSource<bool> {
    fn from(values: Vec<bool>) -> Self {
        CellSource::Values(values)
    }
}

impl From<[f64; 3]> for CellSource<[f64; 3]> {
    fn from(value: [f64; 3]) -> Self {
        CellSource::Uniform(value)
    }
}

impl From<(f64, f64, f64)> for CellSource<[f64; 3]> {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        CellSource::Uniform([x, y, z])
    }
}

impl From<Vec<[f64; 3]>> for CellSource<[f64; 3]> {
    fn from(values: Vec<[f64; 3]>) -> Self {
        CellSource::Values(values)
    }
}

#[cfg(test)]
mod tests {
    use super::CellSource;
    use crate::mesh::Mesh;

    #[test]
    fn function_sources_see_cell_centres() {
        let mesh = Mesh::new((3, 2, 1), (1.0, 1.0, 1.0), 1.0).expect("mesh");
        let values = CellSource::function(|p: [f64; 3]| p[0] + 10.0 * p[1])
            .resolve(&mesh)
            .expect("resolve");
        assert_eq!(values[mesh.index(0, 0, 0)], 5.5);
        assert_eq!(values[mesh.index(2, 1, 0)], 17.5);
    }

    #[test]
    fn explicit_values_must_match_cell_count() {
        let mesh = Mesh::new((2, 2, 1), (1.0, 1.0, 1.0), 1.0).expect("mesh");
        let err = CellSource::from(vec![0.1, 0.2])
            .resolve(&mesh)
            .expect_err("too few values");
        assert!(err.to_string().contains("expected 4 per-cell values"));
    }

    #[test]
    fn bounded_resolution_rejects_negative_and_nan() {
        let mesh = Mesh::new((2, 1, 1), (1.0, 1.0, 1.0), 1.0).expect("mesh");
        assert!(CellSource::from(vec![0.1, -0.1])
            .resolve_at_least(&mesh, 0.0, "alpha")
            .is_err());
        assert!(CellSource::from(f64::NAN)
            .resolve_at_least(&mesh, 0.0, "alpha")
            .is_err());
        let ok = CellSource::from(0.5)
            .resolve_at_least(&mesh, 0.0, "alpha")
            .expect("valid");
        assert_eq!(ok, vec![0.5, 0.5]);
    }
}

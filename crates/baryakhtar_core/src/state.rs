use crate::error::{Result, SimError};
use crate::mesh::Mesh;
use crate::source::CellSource;

/// Per-cell unit vectors stored as three contiguous blocks `[mx.., my.., mz..]`,
/// together with the snapshot taken before the last forward step.
#[derive(Debug, Clone)]
pub struct MagnetizationState {
    n: usize,
    spin: Vec<f64>,
    spin_last: Vec<f64>,
}

impl MagnetizationState {
    /// Uniform +x state on `n` cells.
    pub fn new(n: usize) -> Self {
        let mut spin = vec![0.0; 3 * n];
        spin[..n].fill(1.0);
        Self {
            n,
            spin_last: spin.clone(),
            spin,
        }
    }

    pub fn n_cells(&self) -> usize {
        self.n
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.spin
    }

    pub fn previous(&self) -> &[f64] {
        &self.spin_last
    }

    /// Fills the field from `source`. With `normalize`, every non-zero vector is
    /// scaled to unit length; zero vectors stay zero. Nothing is modified on error.
    pub fn set(
        &mut self,
        mesh: &Mesh,
        source: &CellSource<[f64; 3]>,
        normalize: bool,
    ) -> Result<()> {
        if mesh.n_cells() != self.n {
            return Err(SimError::config(format!(
                "mesh has {} cells but the state holds {}",
                mesh.n_cells(),
                self.n
            )));
        }
        let values = source.resolve(mesh)?;
        let n = self.n;
        let mut spin = vec![0.0; 3 * n];
        for (idx, v) in values.iter().enumerate() {
            if v.iter().any(|c| !c.is_finite()) {
                return Err(SimError::config(format!(
                    "initial orientation at cell {idx} is not finite: {v:?}"
                )));
            }
            let mut v = *v;
            if normalize {
                let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
                if norm > 0.0 {
                    v = [v[0] / norm, v[1] / norm, v[2] / norm];
                }
            }
            spin[idx] = v[0];
            spin[idx + n] = v[1];
            spin[idx + 2 * n] = v[2];
        }
        self.spin = spin;
        Ok(())
    }

    /// Zeroes the cells flagged in `mask` (vacuum).
    pub(crate) fn clear_cells(&mut self, mask: &[bool]) {
        let n = self.n;
        for idx in (0..n).filter(|&idx| mask.get(idx).copied().unwrap_or(false)) {
            self.spin[idx] = 0.0;
            self.spin[idx + n] = 0.0;
            self.spin[idx + 2 * n] = 0.0;
        }
    }

    pub(crate) fn snapshot(&mut self) {
        self.spin_last.copy_from_slice(&self.spin);
    }

    pub(crate) fn commit(&mut self, y: &[f64]) {
        self.spin.copy_from_slice(y);
    }

    pub fn spin_at(&self, idx: usize) -> [f64; 3] {
        [
            self.spin[idx],
            self.spin[idx + self.n],
            self.spin[idx + 2 * self.n],
        ]
    }

    /// Mean of each component over cells with non-zero `ms`.
    pub fn average_magnetization(&self, ms: &[f64]) -> Result<[f64; 3]> {
        let n = self.n;
        if self.spin.len() != 3 * n || ms.len() != n {
            return Err(SimError::config(format!(
                "shape mismatch: spin has {} values, Ms has {} for {} cells",
                self.spin.len(),
                ms.len(),
                n
            )));
        }
        let mut sum = [0.0; 3];
        let mut count = 0usize;
        for idx in (0..n).filter(|&idx| ms[idx] != 0.0) {
            let m = self.spin_at(idx);
            sum[0] += m[0];
            sum[1] += m[1];
            sum[2] += m[2];
            count += 1;
        }
        if count == 0 {
            return Err(SimError::config("no magnetic cells to average over"));
        }
        let c = count as f64;
        Ok([sum[0] / c, sum[1] / c, sum[2] / c])
    }

    /// Euclidean norm of every cell vector.
    pub fn spin_length(&self) -> Vec<f64> {
        (0..self.n)
            .map(|idx| {
                let m = self.spin_at(idx);
                (m[0] * m[0] + m[1] * m[1] + m[2] * m[2]).sqrt()
            })
            .collect()
    }

    /// Largest `| |m_i| - 1 |` over non-pinned cells. NaN if any such length is NaN.
    pub fn max_deviation_from_unit_length(&self, pins: &[bool]) -> f64 {
        let mut worst = 0.0f64;
        for (idx, length) in self.spin_length().into_iter().enumerate() {
            if pins.get(idx).copied().unwrap_or(false) {
                continue;
            }
            let deviation = (length - 1.0).abs();
            if deviation.is_nan() {
                return f64::NAN;
            }
            worst = worst.max(deviation);
        }
        worst
    }

    /// `max_i |M_i(t) - M_i(t - dt)| / dt` and the per-cell rates behind it.
    pub fn max_dm_dt(&self, dt: f64) -> (f64, Vec<f64>) {
        let n = self.n;
        let rates: Vec<f64> = (0..n)
            .map(|idx| {
                let d0 = self.spin[idx] - self.spin_last[idx];
                let d1 = self.spin[idx + n] - self.spin_last[idx + n];
                let d2 = self.spin[idx + 2 * n] - self.spin_last[idx + 2 * n];
                (d0 * d0 + d1 * d1 + d2 * d2).sqrt() / dt
            })
            .collect();
        let max = rates.iter().copied().fold(0.0, f64::max);
        (max, rates)
    }
}

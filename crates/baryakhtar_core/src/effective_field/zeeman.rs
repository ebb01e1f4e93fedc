use super::{ForceTerm, SetupContext, TermBase};
use crate::error::{Result, SimError};

/// Uniform applied field H0 (A/m), optionally scaled by a function of time.
pub struct Zeeman {
    name: String,
    h0: [f64; 3],
    modulation: Option<Box<dyn Fn(f64) -> f64>>,
    base: TermBase,
}

impl Zeeman {
    pub fn new(h0: [f64; 3]) -> Self {
        Self {
            name: "Zeeman".to_string(),
            h0,
            modulation: None,
            base: TermBase::default(),
        }
    }

    /// Field `h0 * modulation(t)`.
    pub fn time_dependent(h0: [f64; 3], modulation: impl Fn(f64) -> f64 + 'static) -> Self {
        Self {
            modulation: Some(Box::new(modulation)),
            ..Self::new(h0)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replaces H0; takes effect at the next field evaluation.
    pub fn update_field(&mut self, h0: [f64; 3]) {
        self.h0 = h0;
    }

    fn fill(&mut self, scale: f64) {
        let n = self.base.n;
        for c in 0..3 {
            self.base.field[c * n..(c + 1) * n].fill(self.h0[c] * scale);
        }
    }
}

impl ForceTerm for Zeeman {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn setup(&mut self, ctx: &SetupContext<'_>) -> Result<()> {
        if self.h0.iter().any(|v| !v.is_finite()) {
            return Err(SimError::config(format!(
                "Zeeman field must be finite, got {:?}",
                self.h0
            )));
        }
        self.base.setup(ctx)?;
        self.fill(1.0);
        Ok(())
    }

    fn compute_field(&mut self, t: f64, _spin: &[f64]) -> &[f64] {
        let scale = self.modulation.as_ref().map_or(1.0, |f| f(t));
        self.fill(scale);
        &self.base.field
    }

    fn compute_energy(&self, spin: &[f64]) -> f64 {
        let n = self.base.n;
        let field = &self.base.field;
        let mut sum = 0.0;
        for idx in 0..n {
            let mh = spin[idx] * field[idx]
                + spin[n + idx] * field[n + idx]
                + spin[2 * n + idx] * field[2 * n + idx];
            sum -= self.base.ms[idx] * mh;
        }
        sum * self.base.mu_0 * self.base.volume
    }

    fn average_field(&self) -> [f64; 3] {
        self.base.average_field()
    }
}

#[cfg(test)]
mod tests {
    use super::Zeeman;
    use crate::constants::Constants;
    use crate::effective_field::{ForceTerm, SetupContext};
    use crate::mesh::Mesh;

    #[test]
    fn field_is_uniform_and_energy_follows_alignment() {
        let mesh = Mesh::new((2, 1, 1), (1.0, 1.0, 1.0), 1e-9).expect("mesh");
        let constants = Constants::default();
        // cell 0 along +z, cell 1 along -z
        let spin = vec![0.0, 0.0, 0.0, 0.0, 1.0, -1.0];
        let ms = vec![1e6, 1e6];
        let mut zeeman = Zeeman::new([0.0, 0.0, 1e5]);
        zeeman
            .setup(&SetupContext {
                mesh: &mesh,
                spin: &spin,
                ms: &ms,
                constants: &constants,
            })
            .expect("setup");
        let field = zeeman.compute_field(0.0, &spin).to_vec();
        assert_eq!(field, vec![0.0, 0.0, 0.0, 0.0, 1e5, 1e5]);
        assert_eq!(zeeman.average_field(), [0.0, 0.0, 1e5]);
        // opposite cells cancel
        assert!(zeeman.compute_energy(&spin).abs() < 1e-30);

        let aligned = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0];
        let expected = -2.0 * constants.mu_0 * 1e6 * 1e5 * 1e-27;
        assert!((zeeman.compute_energy(&aligned) - expected).abs() < 1e-12 * expected.abs());
    }

    #[test]
    fn modulation_scales_the_field_in_time() {
        let mesh = Mesh::new((1, 1, 1), (1.0, 1.0, 1.0), 1.0).expect("mesh");
        let constants = Constants::default();
        let spin = vec![1.0, 0.0, 0.0];
        let ms = vec![1.0];
        let mut zeeman = Zeeman::time_dependent([2.0, 0.0, 0.0], |t| t * 0.5);
        zeeman
            .setup(&SetupContext {
                mesh: &mesh,
                spin: &spin,
                ms: &ms,
                constants: &constants,
            })
            .expect("setup");
        assert_eq!(zeeman.compute_field(4.0, &spin), &[4.0, 0.0, 0.0]);
        assert_eq!(zeeman.compute_field(1.0, &spin), &[1.0, 0.0, 0.0]);
    }
}

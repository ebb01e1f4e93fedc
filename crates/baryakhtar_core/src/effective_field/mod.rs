//! Pluggable force terms and their aggregation into the effective field.
//!
//! All fields use the block layout of the magnetization: `[Hx.., Hy.., Hz..]`.

pub mod anisotropy;
pub mod zeeman;

pub use anisotropy::UniaxialAnisotropy;
pub use zeeman::Zeeman;

use crate::constants::Constants;
use crate::error::{Result, SimError};
use crate::mesh::Mesh;

/// What a force term sees when it is registered.
pub struct SetupContext<'a> {
    pub mesh: &'a Mesh,
    pub spin: &'a [f64],
    /// Saturation magnetisation per cell (A/m); zero marks vacuum.
    pub ms: &'a [f64],
    pub constants: &'a Constants,
}

/// One interaction contributing to the effective field.
pub trait ForceTerm {
    fn name(&self) -> &str;

    fn set_name(&mut self, name: String);

    fn setup(&mut self, ctx: &SetupContext<'_>) -> Result<()>;

    /// Field (A/m) for the given magnetization, in an internal buffer.
    fn compute_field(&mut self, t: f64, spin: &[f64]) -> &[f64];

    /// Energy (J) of the given magnetization.
    fn compute_energy(&self, spin: &[f64]) -> f64;

    /// Per-component mean of the last computed field.
    fn average_field(&self) -> [f64; 3];
}

/// State shared by the reference terms: geometry, Ms and the field buffer.
#[derive(Debug, Clone, Default)]
pub struct TermBase {
    pub n: usize,
    pub field: Vec<f64>,
    pub ms: Vec<f64>,
    pub ms_inv: Vec<f64>,
    pub volume: f64,
    pub mu_0: f64,
}

impl TermBase {
    pub fn setup(&mut self, ctx: &SetupContext<'_>) -> Result<()> {
        let n = ctx.mesh.n_cells();
        if ctx.spin.len() != 3 * n || ctx.ms.len() != n {
            return Err(SimError::config(format!(
                "term setup expects {} spin values and {} Ms values, got {} and {}",
                3 * n,
                n,
                ctx.spin.len(),
                ctx.ms.len()
            )));
        }
        self.n = n;
        self.field = vec![0.0; 3 * n];
        self.ms = ctx.ms.to_vec();
        self.ms_inv = ctx
            .ms
            .iter()
            .map(|&ms| if ms == 0.0 { 0.0 } else { 1.0 / ms })
            .collect();
        self.volume = ctx.mesh.cell_volume();
        self.mu_0 = ctx.constants.mu_0;
        Ok(())
    }

    pub fn average_field(&self) -> [f64; 3] {
        average_blocks(&self.field, self.n)
    }
}

pub(crate) fn average_blocks(field: &[f64], n: usize) -> [f64; 3] {
    if n == 0 {
        return [0.0; 3];
    }
    let mean = |c: usize| field[c * n..(c + 1) * n].iter().sum::<f64>() / n as f64;
    [mean(0), mean(1), mean(2)]
}

/// Ordered collection of force terms.
#[derive(Default)]
pub struct ForceAggregator {
    terms: Vec<Box<dyn ForceTerm>>,
}

impl ForceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the term up and appends it, renaming it if its name is taken.
    /// Returns the name it was registered under.
    pub fn add(&mut self, mut term: Box<dyn ForceTerm>, ctx: &SetupContext<'_>) -> Result<String> {
        term.setup(ctx)?;
        let name = self.unique_name(term.name());
        if name != term.name() {
            log::debug!("renaming interaction '{}' to '{}'", term.name(), name);
            term.set_name(name.clone());
        }
        self.terms.push(term);
        Ok(name)
    }

    fn unique_name(&self, base: &str) -> String {
        let taken = |candidate: &str| self.terms.iter().any(|t| t.name() == candidate);
        if !taken(base) {
            return base.to_string();
        }
        let mut suffix = 2usize;
        loop {
            let candidate = format!("{base}_{suffix}");
            if !taken(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Writes the sum of every term's field into `out`. Zero when empty.
    pub fn compute_effective_field(&mut self, t: f64, spin: &[f64], out: &mut [f64]) {
        out.fill(0.0);
        for term in &mut self.terms {
            let field = term.compute_field(t, spin);
            for (acc, v) in out.iter_mut().zip(field) {
                *acc += v;
            }
        }
    }

    pub fn compute_total_energy(&self, spin: &[f64]) -> f64 {
        self.terms.iter().map(|t| t.compute_energy(spin)).sum()
    }

    pub fn lookup(&self, name: &str) -> Result<&dyn ForceTerm> {
        match self.terms.iter().find(|t| t.name() == name) {
            Some(term) => Ok(term.as_ref()),
            None => Err(self.not_found(name)),
        }
    }

    pub fn lookup_mut(&mut self, name: &str) -> Result<&mut (dyn ForceTerm + 'static)> {
        let err = self.not_found(name);
        match self.terms.iter_mut().find(|t| t.name() == name) {
            Some(term) => Ok(term.as_mut()),
            None => Err(err),
        }
    }

    fn not_found(&self, name: &str) -> SimError {
        SimError::NotFound {
            name: name.to_string(),
            available: self.names(),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.terms.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

use crate::sim::Simulation;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// A quantity a recorder can ask the simulation for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Observable {
    TotalEnergy,
    /// Max unit-length deviation over non-pinned cells.
    SpinError,
    AverageMagnetization,
    TermEnergy(String),
    TermAverageField(String),
    /// Magnetization of one cell.
    Probe { i: usize, j: usize, k: usize },
}

impl Observable {
    pub fn unit(&self) -> &'static str {
        match self {
            Observable::TotalEnergy | Observable::TermEnergy(_) => "<J>",
            _ => "<>",
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(
            self,
            Observable::AverageMagnetization
                | Observable::TermAverageField(_)
                | Observable::Probe { .. }
        )
    }

    /// Column headers: `name` for scalars, `name_x`, `name_y`, `name_z` for vectors.
    pub fn headers(&self, name: &str) -> Vec<String> {
        if self.is_vector() {
            vec![format!("{name}_x"), format!("{name}_y"), format!("{name}_z")]
        } else {
            vec![name.to_string()]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObservableValue {
    Scalar(f64),
    Vector([f64; 3]),
}

impl ObservableValue {
    pub fn components(&self) -> Vec<f64> {
        match *self {
            ObservableValue::Scalar(v) => vec![v],
            ObservableValue::Vector(v) => v.to_vec(),
        }
    }
}

/// Named observables in registration order. Re-registering a name replaces
/// the entry in place.
#[derive(Debug, Clone, Default)]
pub struct ObservableRegistry {
    entries: Vec<(String, Observable)>,
}

impl ObservableRegistry {
    pub fn insert(&mut self, name: impl Into<String>, observable: Observable) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = observable,
            None => self.entries.push((name, observable)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Observable> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, obs)| obs)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Observable)> {
        self.entries.iter().map(|(n, obs)| (n.as_str(), obs))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Called by the simulation once per committed step, and once for the t = 0 seed.
pub trait Recorder {
    fn record(&mut self, sim: &Simulation) -> anyhow::Result<()>;
}

impl<R: Recorder> Recorder for Rc<RefCell<R>> {
    fn record(&mut self, sim: &Simulation) -> anyhow::Result<()> {
        self.borrow_mut().record(sim)
    }
}

/// Keeps every recorded row in memory: `time`, `step`, then each observable.
#[derive(Debug, Clone, Default)]
pub struct TableRecorder {
    pub headers: Vec<String>,
    pub units: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl TableRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values of one column, if present. Rows recorded before the column was
    /// registered read as NaN.
    pub fn column(&self, header: &str) -> Option<Vec<f64>> {
        let idx = self.headers.iter().position(|h| h == header)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).copied().unwrap_or(f64::NAN))
                .collect(),
        )
    }
}

impl Recorder for TableRecorder {
    fn record(&mut self, sim: &Simulation) -> anyhow::Result<()> {
        let mut headers = vec!["time".to_string(), "step".to_string()];
        let mut units = vec!["<s>".to_string(), "<>".to_string()];
        let mut row = vec![sim.t(), sim.step() as f64];
        for (name, observable) in sim.observables().iter() {
            let value = sim
                .evaluate(observable)
                .map_err(|e| anyhow::anyhow!("observable '{name}': {e}"))?;
            for header in observable.headers(name) {
                headers.push(header);
                units.push(observable.unit().to_string());
            }
            row.extend(value.components());
        }
        if !self.rows.is_empty() && headers != self.headers {
            log::debug!("observable set changed, table columns now {:?}", headers);
        }
        self.headers = headers;
        self.units = units;
        self.rows.push(row);
        Ok(())
    }
}

use super::reaction_network::solution::Solution;
use super::reaction_network::species::{SpeciesIndex, TIME_SLOT};
use crate::error::TrialError;
use crate::summary::Summary;

type ReplicateID = usize;

/// Species major sample matrix: `rows[slot][sample]`. Row 0 is time.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    rows: Vec<Vec<f64>>,
}

impl Trajectory {
    /// A trajectory with `species` rows and no samples yet.
    pub fn new(species: usize) -> Self {
        Self {
            rows: vec![Vec::new(); species],
        }
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        Self { rows }
    }

    /// Appends one sample of every species, writing `time` into row 0.
    pub fn record(&mut self, time: f64, solution: &Solution) {
        for (slot, row) in self.rows.iter_mut().enumerate() {
            let value = match slot {
                TIME_SLOT => time,
                _ => solution.get(slot).0 as f64,
            };
            row.push(value);
        }
    }

    pub fn row(&self, slot: usize) -> &[f64] {
        self.rows.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn row_mut(&mut self, slot: usize) -> Option<&mut Vec<f64>> {
        self.rows.get_mut(slot)
    }

    /// Row of a named species.
    pub fn species_row(&self, species: &SpeciesIndex, name: &str) -> Option<&[f64]> {
        species.slot(name).map(|slot| self.row(slot))
    }

    pub fn species(&self) -> usize {
        self.rows.len()
    }

    pub fn samples(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    pub fn into_rows(self) -> Vec<Vec<f64>> {
        self.rows
    }
}

/// What one replicate sends back to the coordinating rank.
#[derive(Clone, Debug, PartialEq)]
pub struct TrialResult {
    pub id: ReplicateID,
    pub seed: u64,
    /// Resection delay actually simulated, after clipping.
    pub delay: u64,
    pub summary: Summary,
    /// Homologous D-loop counts, zeroed after recombination.
    pub dlc: Vec<f64>,
}

/// A replicate that was abandoned. Carries what is needed to replay it.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicateFailure {
    pub id: ReplicateID,
    pub seed: u64,
    pub error: TrialError,
}

impl std::fmt::Display for ReplicateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "replicate {} (seed {}) failed: {}", self.id, self.seed, self.error)
    }
}

impl std::error::Error for ReplicateFailure {}

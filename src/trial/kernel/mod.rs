use rand::{rngs::StdRng, Rng, SeedableRng};

use super::reaction_network::solution::Solution;
use super::reaction_network::CompiledReaction;
use super::results::Trajectory;
use crate::error::KernelError;

/// Stochastic simulation engine the two-phase driver delegates to.
///
/// `simulate` advances `solution` in place from `start` to `end` and returns
/// `points` evenly spaced samples over that interval, both ends included. It is
/// called twice per replicate on the same solution, so implementations must
/// not reset it.
pub trait Kernel {
    fn reseed(&mut self, seed: u64);

    fn simulate(
        &mut self,
        reactions: &[CompiledReaction],
        solution: &mut Solution,
        start: f64,
        end: f64,
        points: usize,
    ) -> Result<Trajectory, KernelError>;
}

/// Direct method Gillespie kernel.
#[derive(Clone, Debug)]
pub struct GillespieKernel {
    prng: StdRng,
    seed: u64,
    max_events: Option<u64>,
}

impl Default for GillespieKernel {
    fn default() -> Self {
        Self::new(0)
    }
}

impl GillespieKernel {
    pub fn new(seed: u64) -> Self {
        Self {
            prng: StdRng::seed_from_u64(seed),
            seed,
            max_events: None,
        }
    }

    /// Caps the number of reactions fired by a single `simulate` call.
    pub fn with_event_budget(mut self, max_events: u64) -> Self {
        self.max_events = Some(max_events);
        self
    }

    /// returns the seed the generator was last seeded with
    pub fn get_seed(&self) -> u64 {
        self.seed
    }

    fn propensities(
        reactions: &[CompiledReaction],
        solution: &Solution,
    ) -> Result<Vec<f64>, KernelError> {
        reactions
            .iter()
            .enumerate()
            .map(|(id, reaction)| {
                let value = reaction.constant * solution.get(reaction.reactant).0 as f64;
                if value.is_finite() && value >= 0.0 {
                    Ok(value)
                } else {
                    Err(KernelError::InvalidPropensity { reaction: id, value })
                }
            })
            .collect()
    }

    /// Picks a reaction with probability proportional to its propensity
    fn next_reaction(&mut self, propensities: &[f64], total: f64) -> usize {
        let mut index = self.prng.gen::<f64>() * total;
        let mut last_possible = 0;

        for (id, &propensity) in propensities.iter().enumerate() {
            if propensity <= 0.0 {
                continue;
            }
            if propensity > index {
                return id;
            }
            index -= propensity;
            last_possible = id;
        }

        // rounding left a sliver past the final bin
        last_possible
    }
}

impl Kernel for GillespieKernel {
    fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.prng = StdRng::seed_from_u64(seed);
    }

    fn simulate(
        &mut self,
        reactions: &[CompiledReaction],
        solution: &mut Solution,
        start: f64,
        end: f64,
        points: usize,
    ) -> Result<Trajectory, KernelError> {
        if !start.is_finite() || !end.is_finite() || end < start {
            return Err(KernelError::InvalidInterval { start, end });
        }

        let times = sample_times(start, end, points);
        let mut trajectory = Trajectory::new(solution.len());
        let mut next_sample = 0;
        let mut time = start;
        let mut events = 0u64;

        while next_sample < times.len() {
            let propensities = Self::propensities(reactions, solution)?;
            let total: f64 = propensities.iter().sum();

            let next_time = if total > 0.0 {
                time - (1.0 - self.prng.gen::<f64>()).ln() / total
            } else {
                f64::INFINITY
            };

            // the state holds until the next event
            while next_sample < times.len() && times[next_sample] < next_time {
                trajectory.record(times[next_sample], solution);
                next_sample += 1;
            }
            if next_sample == times.len() {
                break;
            }

            if let Some(budget) = self.max_events {
                if events >= budget {
                    return Err(KernelError::EventBudgetExhausted(budget));
                }
            }

            let id = self.next_reaction(&propensities, total);
            let reaction = &reactions[id];
            if !solution.apply(reaction.reactant, reaction.product) {
                return Err(KernelError::Depleted {
                    reaction: id,
                    slot: reaction.reactant,
                });
            }
            time = next_time;
            events += 1;
        }

        Ok(trajectory)
    }
}

/// `points` evenly spaced values from `start` to `end`, both included.
pub fn sample_times(start: f64, end: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (points - 1) as f64;
            (0..points)
                .map(|i| if i == points - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

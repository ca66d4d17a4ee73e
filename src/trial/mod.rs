use rand::{rngs::StdRng, SeedableRng};
use tracing::debug;

use crate::config::{CensorMode, Config, Fingerprint};
use crate::error::TrialError;
use crate::summary::{self, Summary};
use kernel::Kernel;
use reaction_network::solution::{Count, Solution};
use reaction_network::species::{Family, SpeciesIndex, FREE_SITES_SLOT, RECOMBINED, TIME_SLOT};
use reaction_network::Model;
use results::{ReplicateFailure, Trajectory, TrialResult};

pub mod kernel;
pub mod reaction_network;
pub mod results;

/// Seed of one replicate. Depends only on the configuration and the replicate index.
pub fn replicate_seed(seed_base: u64, id: usize, fingerprint: Fingerprint) -> u64 {
    seed_base
        .wrapping_add(id as u64)
        .wrapping_add(u64::from(fingerprint.0))
}

/// Truncates a raw delay draw to whole time units and clamps it into
/// `[0, timepoints - 1]`. Negative draws are folded onto the positive axis.
pub fn clip_delay(raw: f64, timepoints: u64) -> u64 {
    let horizon = timepoints.saturating_sub(1);
    let delay = raw.trunc().abs();
    if delay.is_nan() {
        return 0;
    }
    if delay >= horizon as f64 {
        return horizon;
    }
    delay as u64
}

/// How the sample axis is split between the resection and dynamics phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub delay: u64,
    pub delay_points: usize,
    pub dynamics_points: usize,
    pub total_points: usize,
}

impl Schedule {
    /// Integer division can leave the two segments one sample short of the
    /// full axis; the delay segment takes that sample.
    pub fn new(delay: u64, timepoints: u64, every: u64) -> Self {
        let total_points = (timepoints / every) as usize;
        let mut delay_points = (delay / every) as usize;
        let dynamics_points = (timepoints.saturating_sub(delay) / every) as usize;
        if delay_points + dynamics_points != total_points {
            delay_points += 1;
        }

        Self {
            delay,
            delay_points,
            dynamics_points,
            total_points,
        }
    }
}

/// Zeroes the D-loop channels after the first sample where `R` is positive,
/// provided recombination is still visible at the end of the run. Returns the
/// commitment index.
pub fn censor_after_commitment(
    trajectory: &mut Trajectory,
    species: &SpeciesIndex,
    mode: CensorMode,
) -> Option<usize> {
    let recombined = trajectory.species_row(species, RECOMBINED)?;
    if recombined.last().copied().unwrap_or(0.0) == 0.0 {
        return None;
    }
    let commitment = recombined.iter().position(|&count| count > 0.0)?;

    let families: &[Family] = match mode {
        CensorMode::Homologous => &[Family::Homologous],
        CensorMode::Both => &Family::ALL,
    };
    for family in families {
        let Some(slot) = species.slot(family.dloop()) else {
            continue;
        };
        if let Some(row) = trajectory.row_mut(slot) {
            for value in row.iter_mut().skip(commitment + 1) {
                *value = 0.0;
            }
        }
    }

    Some(commitment)
}

/// The runtime environment for a single replicate: a resection delay with no
/// free sites followed by the search dynamics with every site released.
pub struct Trial<'trial> {
    model: &'trial Model,
    config: &'trial Config,
    id: usize,
    seed: u64,
}

impl<'trial> Trial<'trial> {
    pub fn from(model: &'trial Model, config: &'trial Config, id: usize) -> Self {
        let seed = replicate_seed(config.seed_base, id, model.fingerprint);
        Self { model, config, id, seed }
    }

    pub fn get_id(&self) -> usize {
        self.id
    }

    pub fn get_seed(&self) -> u64 {
        self.seed
    }

    /// Runs both phases on `kernel`, splices them and post-processes the result.
    pub fn simulate<K: Kernel>(&self, kernel: &mut K) -> Result<TrialResult, ReplicateFailure> {
        self.run(kernel).map_err(|error| ReplicateFailure {
            id: self.id,
            seed: self.seed,
            error,
        })
    }

    /// Rebuilds the result of a replicate from its archived channels.
    pub fn restore(&self, summary: Summary, dlc: Vec<f64>) -> Result<TrialResult, ReplicateFailure> {
        let delay = self.draw_delay().map_err(|error| ReplicateFailure {
            id: self.id,
            seed: self.seed,
            error,
        })?;
        Ok(TrialResult {
            id: self.id,
            seed: self.seed,
            delay,
            summary,
            dlc,
        })
    }

    /// The delay is drawn from its own generator so it can be replayed without the kernel.
    fn draw_delay(&self) -> Result<u64, TrialError> {
        let mut prng = StdRng::seed_from_u64(self.seed);
        let raw_delay = self
            .config
            .delay
            .sample(&mut prng)
            .map_err(|e| TrialError::Delay(e.to_string()))?;
        let delay = clip_delay(raw_delay, self.config.timepoints);
        debug!(replicate = self.id, seed = self.seed, raw_delay, delay, "resection delay drawn");
        Ok(delay)
    }

    fn run<K: Kernel>(&self, kernel: &mut K) -> Result<TrialResult, TrialError> {
        let species = &self.model.species;
        let reactions = self.model.network.compile(species)?;
        let population = self.config.population;

        let delay = self.draw_delay()?;
        let schedule = Schedule::new(delay, self.config.timepoints, self.config.every);

        kernel.reseed(self.seed);
        let mut solution = Solution::empty(species);

        // resection: nothing can bind
        solution.set(FREE_SITES_SLOT, Count(0));
        let resection = if schedule.delay_points > 0 {
            kernel.simulate(&reactions, &mut solution, 0.0, delay as f64, schedule.delay_points)?
        } else {
            Trajectory::new(species.len())
        };

        // search: every site released at once
        solution.set(FREE_SITES_SLOT, Count(population));
        let dynamics = if schedule.dynamics_points > 0 {
            kernel.simulate(
                &reactions,
                &mut solution,
                delay as f64,
                self.config.timepoints as f64,
                schedule.dynamics_points,
            )?
        } else {
            Trajectory::new(species.len())
        };

        let mut trajectory = self.splice(&schedule, resection, dynamics)?;
        // occupancy counts every site, including D-loops resolved by recombination
        let mut summary = summary::extract(&trajectory, species);
        if let Some(commitment) = censor_after_commitment(&mut trajectory, species, self.config.censor) {
            debug!(replicate = self.id, commitment, "recombination committed");
            for (channel, family) in [
                (summary::DLOOP_HOMOLOGIES, Family::Homologous),
                (summary::DLOOP_HETEROLOGIES, Family::Heterologous),
            ] {
                if let Some(row) = trajectory.species_row(species, family.dloop()) {
                    summary.insert(channel, row.to_vec());
                }
            }
        }

        let dlc = trajectory
            .species_row(species, Family::Homologous.dloop())
            .map(<[f64]>::to_vec)
            .unwrap_or_default();

        Ok(TrialResult {
            id: self.id,
            seed: self.seed,
            delay,
            summary,
            dlc,
        })
    }

    /// Concatenates both segments. Free sites read `N` throughout the
    /// resection and time is rebuilt on the uniform external grid.
    fn splice(
        &self,
        schedule: &Schedule,
        resection: Trajectory,
        dynamics: Trajectory,
    ) -> Result<Trajectory, TrialError> {
        for (segment, expected) in [
            (&resection, schedule.delay_points),
            (&dynamics, schedule.dynamics_points),
        ] {
            if segment.samples() != expected {
                return Err(TrialError::SampleMismatch {
                    expected,
                    found: segment.samples(),
                });
            }
        }

        let population = self.config.population as f64;
        let every = self.config.every;
        let resection = resection.into_rows();
        let dynamics = dynamics.into_rows();

        let rows = (0..self.model.species.len())
            .map(|slot| match slot {
                TIME_SLOT => (0..schedule.total_points)
                    .map(|i| (i as u64 * every) as f64)
                    .collect(),
                FREE_SITES_SLOT => std::iter::repeat(population)
                    .take(schedule.delay_points)
                    .chain(dynamics[slot].iter().copied())
                    .collect(),
                _ => resection[slot]
                    .iter()
                    .chain(dynamics[slot].iter())
                    .copied()
                    .collect(),
            })
            .collect();

        Ok(Trajectory::from_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::small_config;
    use crate::error::KernelError;
    use crate::summary::{DLOOP_HETEROLOGIES, DLOOP_HOMOLOGIES, FREE_SITES, OCCUPIED_SITES, RECOMBINED_CHANNEL};
    use kernel::GillespieKernel;
    use proptest::prelude::*;
    use reaction_network::{generate, CompiledReaction};

    #[test]
    fn seed_depends_on_index_and_fingerprint() {
        let fp = Fingerprint(10);
        assert_eq!(replicate_seed(1999, 3, fp), 2012);
        assert_ne!(replicate_seed(1999, 3, fp), replicate_seed(1999, 4, fp));
        assert_eq!(replicate_seed(u64::MAX, 1, Fingerprint(0)), 0);
    }

    #[test]
    fn delay_is_clipped_to_horizon() {
        assert_eq!(clip_delay(12.9, 1000), 12);
        assert_eq!(clip_delay(999.5, 1000), 999);
        assert_eq!(clip_delay(1.0e12, 1000), 999);
        assert_eq!(clip_delay(f64::INFINITY, 1000), 999);
        assert_eq!(clip_delay(-37.8, 1000), 37);
        assert_eq!(clip_delay(f64::NAN, 1000), 0);
        assert_eq!(clip_delay(5.0, 1), 0);
    }

    proptest! {
        #[test]
        fn any_draw_lands_inside_the_horizon(raw in any::<f64>(), timepoints in 1u64..100_000) {
            prop_assert!(clip_delay(raw, timepoints) < timepoints);
        }

        #[test]
        fn schedule_covers_the_axis(delay in 0u64..1000, every in prop::sample::select(vec![1u64, 2, 5, 10, 50])) {
            let schedule = Schedule::new(delay, 1000, every);
            prop_assert_eq!(schedule.delay_points + schedule.dynamics_points, schedule.total_points);
        }
    }

    #[test]
    fn schedule_gives_rounding_sample_to_delay() {
        // 125 = 12 * 10 + 5, (1000 - 125) / 10 = 87
        let schedule = Schedule::new(125, 1000, 10);
        assert_eq!(schedule.delay_points, 13);
        assert_eq!(schedule.dynamics_points, 87);
        assert_eq!(schedule.total_points, 100);

        let exact = Schedule::new(120, 1000, 10);
        assert_eq!((exact.delay_points, exact.dynamics_points), (12, 88));

        let none = Schedule::new(0, 1000, 10);
        assert_eq!((none.delay_points, none.dynamics_points), (0, 100));

        let late = Schedule::new(995, 1000, 10);
        assert_eq!((late.delay_points, late.dynamics_points), (100, 0));
    }

    fn synthetic(recombined: Vec<f64>) -> (SpeciesIndex, Trajectory) {
        let species = SpeciesIndex::declare(&[8]);
        let n = recombined.len();
        let mut rows = vec![vec![1.0; n]; species.len()];
        rows[species.slot(RECOMBINED).unwrap()] = recombined;
        (species, Trajectory::from_rows(rows))
    }

    #[test]
    fn censoring_after_first_commitment() {
        let (species, mut trajectory) = synthetic(vec![0.0, 0.0, 1.0, 1.0, 2.0]);
        let commitment = censor_after_commitment(&mut trajectory, &species, CensorMode::Homologous);
        assert_eq!(commitment, Some(2));

        let dhm = trajectory.species_row(&species, "DHM").unwrap();
        assert_eq!(dhm, &[1.0, 1.0, 1.0, 0.0, 0.0]);
        let dht = trajectory.species_row(&species, "DHT").unwrap();
        assert_eq!(dht, &[1.0; 5]);
    }

    #[test]
    fn censoring_both_families() {
        let (species, mut trajectory) = synthetic(vec![0.0, 1.0, 1.0]);
        censor_after_commitment(&mut trajectory, &species, CensorMode::Both);
        assert_eq!(trajectory.species_row(&species, "DHM").unwrap(), &[1.0, 1.0, 0.0]);
        assert_eq!(trajectory.species_row(&species, "DHT").unwrap(), &[1.0, 1.0, 0.0]);
    }

    #[test]
    fn no_censoring_without_recombination() {
        let (species, mut trajectory) = synthetic(vec![0.0, 0.0, 0.0]);
        assert_eq!(
            censor_after_commitment(&mut trajectory, &species, CensorMode::Both),
            None
        );
        assert_eq!(trajectory.species_row(&species, "DHM").unwrap(), &[1.0; 3]);
    }

    #[test]
    fn replicate_conserves_sites() {
        let config = small_config();
        let model = generate(&config).unwrap();
        let mut kernel = GillespieKernel::default();

        for id in 0..4 {
            let result = Trial::from(&model, &config, id).simulate(&mut kernel).unwrap();
            let free = result.summary.get(FREE_SITES).unwrap();
            let occupied = result.summary.get(OCCUPIED_SITES).unwrap();
            assert_eq!(free.len(), 100);
            for (f, o) in free.iter().zip(occupied) {
                assert_eq!(f + o, 200.0);
            }
            assert!(result.delay < config.timepoints);
            assert_eq!(result.dlc, result.summary.get(DLOOP_HOMOLOGIES).unwrap());
        }
    }

    #[test]
    fn resection_holds_every_site_free() {
        let mut config = small_config();
        config.delay = crate::config::DelayDistribution::Normal { delay_mu: 500.0, delay_sigma: 0.0 };
        config.kon = 10.0;
        let model = generate(&config).unwrap();
        let result = Trial::from(&model, &config, 0)
            .simulate(&mut GillespieKernel::default())
            .unwrap();

        assert_eq!(result.delay, 500);
        let free = result.summary.get(FREE_SITES).unwrap();
        let time = result.summary.get(summary::TIME).unwrap();
        assert!(free[..50].iter().all(|&f| f == 200.0));
        assert!(free[51..].iter().any(|&f| f < 200.0));
        assert_eq!(time[0], 0.0);
        assert_eq!(time[99], 990.0);
    }

    /// Long complexes, fast D-loops and no D-loop dissociation: most replicates recombine.
    fn recombining_config() -> Config {
        let mut config = small_config();
        config.intermediates = vec![8, 9, 12, 15, 24, 48, 96, 144, 192];
        config.homologous_fraction = 0.5;
        config.kon = 0.01;
        config.kdloop = 10.0;
        config.koff2 = 0.0;
        config.kre = 0.1;
        config
    }

    #[test]
    fn recombination_keeps_sites_conserved() {
        let config = recombining_config();
        let model = generate(&config).unwrap();
        let mut kernel = GillespieKernel::default();
        let mut recombined = 0;

        for id in 0..10 {
            let result = Trial::from(&model, &config, id).simulate(&mut kernel).unwrap();
            let free = result.summary.get(FREE_SITES).unwrap();
            let occupied = result.summary.get(OCCUPIED_SITES).unwrap();
            for (sample, (f, o)) in free.iter().zip(occupied).enumerate() {
                assert_eq!(f + o, 200.0, "replicate {} sample {}", id, sample);
            }

            let r = result.summary.get(RECOMBINED_CHANNEL).unwrap();
            let Some(commitment) = r.iter().position(|&count| count > 0.0) else {
                continue;
            };
            recombined += 1;
            let dhm = result.summary.get(DLOOP_HOMOLOGIES).unwrap();
            assert!(dhm[commitment + 1..].iter().all(|&count| count == 0.0));
            assert_eq!(result.dlc, dhm);
        }
        assert!(recombined > 0);
    }

    #[test]
    fn both_mode_censors_heterologous_channel_too() {
        let mut config = recombining_config();
        config.censor = CensorMode::Both;
        let model = generate(&config).unwrap();
        let mut kernel = GillespieKernel::default();

        for id in 0..10 {
            let result = Trial::from(&model, &config, id).simulate(&mut kernel).unwrap();
            let r = result.summary.get(RECOMBINED_CHANNEL).unwrap();
            if let Some(commitment) = r.iter().position(|&count| count > 0.0) {
                let dht = result.summary.get(DLOOP_HETEROLOGIES).unwrap();
                assert!(dht[commitment + 1..].iter().all(|&count| count == 0.0));
            }
            let free = result.summary.get(FREE_SITES).unwrap();
            let occupied = result.summary.get(OCCUPIED_SITES).unwrap();
            assert!(free.iter().zip(occupied).all(|(f, o)| f + o == 200.0));
        }
    }

    #[test]
    fn restore_replays_the_delay() {
        let config = small_config();
        let model = generate(&config).unwrap();
        let trial = Trial::from(&model, &config, 3);
        let simulated = trial.simulate(&mut GillespieKernel::default()).unwrap();
        let restored = trial
            .restore(simulated.summary.clone(), simulated.dlc.clone())
            .unwrap();
        assert_eq!(restored, simulated);
    }

    #[test]
    fn same_replicate_same_result() {
        let config = small_config();
        let model = generate(&config).unwrap();
        let a = Trial::from(&model, &config, 2).simulate(&mut GillespieKernel::new(5)).unwrap();
        let b = Trial::from(&model, &config, 2).simulate(&mut GillespieKernel::new(9)).unwrap();
        assert_eq!(a, b);
    }

    struct BrokenKernel;

    impl Kernel for BrokenKernel {
        fn reseed(&mut self, _seed: u64) {}

        fn simulate(
            &mut self,
            _reactions: &[CompiledReaction],
            _solution: &mut Solution,
            _start: f64,
            _end: f64,
            _points: usize,
        ) -> Result<Trajectory, KernelError> {
            Err(KernelError::EventBudgetExhausted(0))
        }
    }

    #[test]
    fn kernel_failure_names_the_replicate() {
        let config = small_config();
        let model = generate(&config).unwrap();
        let trial = Trial::from(&model, &config, 7);
        let failure = trial.simulate(&mut BrokenKernel).unwrap_err();
        assert_eq!(failure.id, 7);
        assert_eq!(failure.seed, trial.get_seed());
        assert_eq!(failure.error, TrialError::Kernel(KernelError::EventBudgetExhausted(0)));
    }
}

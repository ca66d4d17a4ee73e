//! # Description
//! Stochastic simulation engine for RAD51-mediated homology search. A
//! parameter set is turned into a strand-exchange reaction network, each
//! replicate is simulated in two phases (a resection delay with no free sites,
//! then the search dynamics with every site released) and the replicates are
//! averaged into ensemble trajectories and smoothed D-loop curves.
//!
//! # Usage
//! - `Builder::new(config)` with defaults, refined by its setters
//! - `Rad51Engine::run(&ctx)` on every rank of a `Communicator`
//!     - only the root rank receives the `EnsembleReport`
//! - `Rad51Engine::run_local()` / `Rad51Engine::run_threaded(ranks)` for
//!   in-process runs
//!
//! # Output layout
//! When an output directory is set every artifact lands in
//! `<output>/<fingerprint>/`:
//!     - params.yaml, run.yaml
//!     - records/simulation_<id>.csv
//!     - ensemble.csv, dlc_window<w>.csv

pub mod aggregate;
pub mod archive;
pub mod config;
pub mod distribution;
pub mod error;
pub mod summary;
pub mod trial;

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::PathBuf;

use tracing::{error, info, warn};

use aggregate::{aggregate, aggregate_dlc};
use archive::{RunLayout, RunManifest};
pub use config::{CensorMode, Config, DelayDistribution, Fingerprint};
pub use distribution::{Communicator, SingleProcess, ThreadGroup};
pub use error::EngineError;
use error::{ArchiveError, ConfigError, DistributionError};
pub use summary::Summary;
use trial::kernel::{GillespieKernel, Kernel};
use trial::reaction_network::{generate, Model};
use trial::results::{ReplicateFailure, TrialResult};
use trial::Trial;

/// Smoothing windows applied to the D-loop curve unless told otherwise.
pub const DEFAULT_WINDOWS: [usize; 5] = [0, 100, 200, 500, 1000];

type Outcome = Result<TrialResult, ReplicateFailure>;

/// What the root rank knows once every replicate is accounted for.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleReport {
    pub fingerprint: Fingerprint,
    /// Mean of every channel over the successful replicates.
    pub summary: Summary,
    /// Mean censored homologous D-loop series, keyed by smoothing window.
    pub dlc_curves: BTreeMap<usize, Vec<f64>>,
    pub completed: usize,
    pub failures: Vec<ReplicateFailure>,
    pub run_dir: Option<PathBuf>,
}

/// This is a builder object containing defaults and methods for constructing a Rad51Engine.
pub struct Builder<K = GillespieKernel> {
    config: Config,
    num_replicates: usize,
    output: Option<PathBuf>,
    windows: Vec<usize>,
    resume: bool,
    kernel: K,
}

impl Builder<GillespieKernel> {
    /// Builds a new engine description from a parameter set with default values
    ///
    /// replicates = 100
    /// output = none, nothing is written
    /// windows = 0, 100, 200, 500, 1000
    /// kernel = direct method Gillespie without an event budget
    pub fn new(config: Config) -> Self {
        Self {
            config,
            num_replicates: 100,
            output: None,
            windows: DEFAULT_WINDOWS.to_vec(),
            resume: false,
            kernel: GillespieKernel::default(),
        }
    }
}

impl<K: Kernel + Clone> Builder<K> {
    pub fn replicates(mut self, count: usize) -> Self {
        self.num_replicates = count;
        self
    }

    /// Directory under which the run directory is created
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn windows(mut self, windows: Vec<usize>) -> Self {
        self.windows = windows;
        self
    }

    /// Loads replicates that already have an archive instead of simulating them again
    pub fn resume(mut self) -> Self {
        self.resume = true;
        self
    }

    /// Swaps the stochastic kernel. Every rank works on its own clone.
    pub fn kernel<J: Kernel + Clone>(self, kernel: J) -> Builder<J> {
        Builder {
            config: self.config,
            num_replicates: self.num_replicates,
            output: self.output,
            windows: self.windows,
            resume: self.resume,
            kernel,
        }
    }

    /// Consumes the builder after validating the configuration
    pub fn build(self) -> Result<Rad51Engine<K>, ConfigError> {
        self.config.validate()?;
        Ok(Rad51Engine {
            config: self.config,
            num_replicates: self.num_replicates,
            output: self.output,
            windows: self.windows,
            resume: self.resume,
            kernel: self.kernel,
        })
    }
}

/// Main runtime object. Holds no per-run state so one engine can serve many runs.
#[derive(Clone, Debug)]
pub struct Rad51Engine<K = GillespieKernel> {
    config: Config,
    num_replicates: usize,
    output: Option<PathBuf>,
    windows: Vec<usize>,
    resume: bool,
    kernel: K,
}

impl<K: Kernel + Clone> Rad51Engine<K> {
    pub fn get_config(&self) -> &Config {
        &self.config
    }

    pub fn get_replicates(&self) -> usize {
        self.num_replicates
    }

    /// Runs this rank's share of the ensemble. Every rank of `ctx` must call
    /// this; the root gets the report and the others get `None`.
    pub fn run<C: Communicator>(&self, ctx: &C) -> Result<Option<EnsembleReport>, EngineError> {
        let prepared = ctx.is_root().then(|| self.prepare(ctx.size()));
        // a root that failed to prepare still broadcasts so the workers can leave
        let shared = match &prepared {
            Some(Ok(model)) => Some(Some(model.clone())),
            Some(Err(_)) => Some(None),
            None => None,
        };
        let model = ctx.broadcast(shared)?;
        if let Some(Err(error)) = prepared {
            return Err(error);
        }
        let Some(model) = model else {
            return Ok(None);
        };

        let layout = self
            .output
            .as_ref()
            .map(|output| RunLayout::new(output, model.fingerprint));
        let replicates = distribution::partition(self.num_replicates, ctx.rank(), ctx.size());
        info!(
            rank = ctx.rank(),
            first = replicates.start,
            count = replicates.len(),
            "rank started"
        );
        let outcomes = self.run_replicates(&model, layout.as_ref(), replicates);

        match ctx.gather(outcomes)? {
            Some(gathered) => self.finish(&model, layout, gathered).map(Some),
            None => Ok(None),
        }
    }

    /// The whole ensemble on the calling thread.
    pub fn run_local(&self) -> Result<EnsembleReport, EngineError> {
        self.run(&SingleProcess)?
            .ok_or(EngineError::Distribution(DistributionError::Disconnected {
                rank: distribution::ROOT,
            }))
    }

    /// The ensemble spread over `ranks` threads of one process.
    pub fn run_threaded(&self, ranks: usize) -> Result<EnsembleReport, EngineError>
    where
        K: Send + Sync + 'static,
    {
        let engine = self.clone();
        let outputs = ThreadGroup::run(ranks, move |ctx| engine.run(ctx))?;

        let mut report = None;
        for output in outputs {
            if let Some(root) = output? {
                report = Some(root);
            }
        }
        report.ok_or(EngineError::Distribution(DistributionError::Disconnected {
            rank: distribution::ROOT,
        }))
    }

    /// Root only: generates the model and lays out the run directory.
    fn prepare(&self, ranks: usize) -> Result<Model, EngineError> {
        let model = generate(&self.config)?;
        info!(
            fingerprint = %model.fingerprint,
            reactions = model.network.get_reactions().len(),
            species = model.species.len(),
            replicates = self.num_replicates,
            ranks,
            "model generated"
        );

        if let Some(output) = &self.output {
            let layout = RunLayout::new(output, model.fingerprint);
            layout.create()?;
            archive::write_params(&layout, &self.config)?;
            archive::write_manifest(
                &layout,
                &RunManifest {
                    fingerprint: model.fingerprint.0,
                    replicates: self.num_replicates,
                    ranks,
                    windows: self.windows.clone(),
                    started_at: chrono::Utc::now(),
                },
            )?;
        }
        Ok(model)
    }

    fn run_replicates(
        &self,
        model: &Model,
        layout: Option<&RunLayout>,
        replicates: Range<usize>,
    ) -> Result<Vec<Outcome>, ArchiveError> {
        let mut kernel = self.kernel.clone();
        let mut outcomes = Vec::with_capacity(replicates.len());

        for id in replicates {
            let trial = Trial::from(model, &self.config, id);

            if let Some(restored) = self.restore(&trial, layout)? {
                outcomes.push(restored);
                continue;
            }

            let outcome = trial.simulate(&mut kernel);
            match &outcome {
                Ok(result) => {
                    info!(replicate = id, seed = result.seed, delay = result.delay, "replicate completed");
                    if let Some(layout) = layout {
                        archive::write_replicate(layout, result)?;
                    }
                }
                Err(failure) => {
                    error!(replicate = id, seed = failure.seed, error = %failure.error, "replicate failed");
                }
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// An archived replicate, if resuming and one with the right shape exists.
    fn restore(&self, trial: &Trial, layout: Option<&RunLayout>) -> Result<Option<Outcome>, ArchiveError> {
        let Some(layout) = layout.filter(|_| self.resume) else {
            return Ok(None);
        };
        let Some((summary, dlc)) = archive::read_replicate(layout, trial.get_id())? else {
            return Ok(None);
        };

        let expected = self.config.sample_count();
        if summary.samples() != expected || dlc.len() != expected {
            warn!(
                replicate = trial.get_id(),
                expected,
                found = summary.samples(),
                "archive does not match the configuration, simulating again"
            );
            return Ok(None);
        }
        info!(replicate = trial.get_id(), "replicate restored from archive");
        Ok(Some(trial.restore(summary, dlc)))
    }

    /// Root only: splits failures out, averages what is left and writes the artifacts.
    fn finish(
        &self,
        model: &Model,
        layout: Option<RunLayout>,
        gathered: Vec<Result<Vec<Outcome>, ArchiveError>>,
    ) -> Result<EnsembleReport, EngineError> {
        let mut results = Vec::with_capacity(self.num_replicates);
        let mut failures = Vec::new();
        for rank_outcomes in gathered {
            for outcome in rank_outcomes? {
                match outcome {
                    Ok(result) => results.push(result),
                    Err(failure) => failures.push(failure),
                }
            }
        }

        if results.is_empty() && !failures.is_empty() {
            return Err(EngineError::AllReplicatesFailed(failures.len()));
        }
        if !failures.is_empty() {
            warn!(
                failed = failures.len(),
                completed = results.len(),
                "failed replicates are left out of the ensemble"
            );
        }

        let completed = results.len();
        let (summaries, dlcs): (Vec<Summary>, Vec<Vec<f64>>) = results
            .into_iter()
            .map(|result| (result.summary, result.dlc))
            .unzip();

        let summary = aggregate(&summaries)?;
        let mut dlc_curves = BTreeMap::new();
        for &window in &self.windows {
            dlc_curves.insert(window, aggregate_dlc(&dlcs, window)?);
        }

        if let Some(layout) = &layout {
            archive::write_ensemble(layout, &summary)?;
            let time = summary.get(summary::TIME).unwrap_or(&[]);
            for (window, curve) in &dlc_curves {
                archive::write_curve(layout, *window, time, curve)?;
            }
        }
        info!(fingerprint = %model.fingerprint, completed, "ensemble aggregated");

        Ok(EnsembleReport {
            fingerprint: model.fingerprint,
            summary,
            dlc_curves,
            completed,
            failures,
            run_dir: layout.map(|layout| layout.get_root().to_path_buf()),
        })
    }
}

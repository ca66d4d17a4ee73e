use thiserror::Error;

/// Problems with a parameter set. Always fatal, no network is produced.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Population size N must be positive")]
    EmptyPopulation,
    #[error("Homologous fraction f must lie in [0, 1], got {0}")]
    FractionOutOfRange(f64),
    #[error("Rate constant {name} must be a non-negative finite number, got {value}")]
    InvalidRate { name: &'static str, value: f64 },
    #[error("intermediates must not be empty")]
    NoIntermediates,
    #[error("intermediates must start at 8, got {0}")]
    FirstIntermediate(u32),
    #[error("intermediates must be strictly increasing ({previous} followed by {next})")]
    NonIncreasingIntermediates { previous: u32, next: u32 },
    #[error("timepoints must be positive")]
    EmptyHorizon,
    #[error("every must be a positive divisor of timepoints ({timepoints} % {every} != 0)")]
    InvalidStride { timepoints: u64, every: u64 },
    #[error("Invalid delay distribution: {0}")]
    InvalidDelay(String),
}

/// Failures raised by a stochastic kernel while advancing a state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("Reaction {reaction} references unknown species {species}")]
    UnknownSpecies { reaction: usize, species: String },
    #[error("Reaction {reaction} produced an invalid propensity {value}")]
    InvalidPropensity { reaction: usize, value: f64 },
    #[error("Reaction {reaction} fired with species slot {slot} depleted")]
    Depleted { reaction: usize, slot: usize },
    #[error("Invalid interval [{start}, {end}]")]
    InvalidInterval { start: f64, end: f64 },
    #[error("Event budget of {0} reactions exhausted before the end of the interval")]
    EventBudgetExhausted(u64),
}

/// Reasons a single replicate is abandoned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrialError {
    #[error(transparent)]
    Kernel(#[from] KernelError),
    #[error("Could not draw a resection delay: {0}")]
    Delay(String),
    #[error("Kernel returned {found} samples for a segment of {expected}")]
    SampleMismatch { expected: usize, found: usize },
}

/// Input contract violations of the ensemble aggregator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregateError {
    #[error("Nothing to aggregate")]
    Empty,
    #[error("Replicate {replicate} has channels {found:?}, expected {expected:?}")]
    ChannelMismatch {
        replicate: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("Replicate {replicate} channel {channel:?} has {found} samples, expected {expected}")]
    LengthMismatch {
        replicate: usize,
        channel: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error("Archive {path} is malformed: {reason}")]
    Malformed { path: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DistributionError {
    #[error("Rank {rank} lost its connection to the group")]
    Disconnected { rank: usize },
    #[error("Rank {rank} received a message of an unexpected type")]
    UnexpectedMessage { rank: usize },
    #[error("Root rank must provide a value to broadcast")]
    NothingToBroadcast,
    #[error("Rank {rank} panicked")]
    RankPanicked { rank: usize },
    #[error("A group needs at least one rank")]
    EmptyGroup,
}

/// Engine level error types
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error("All {0} replicates failed")]
    AllReplicatesFailed(usize),
}

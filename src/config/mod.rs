use std::fmt::{self, Display};
use std::path::Path;

use rand::Rng;
use rand_distr::{Distribution, Gamma, Normal};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ConfigError;

/// Smallest complex that survives long enough to be tracked, in nucleotides.
pub const MINIMAL_COMPLEX: u32 = 8;

/// Parameter set for one simulated population of binding sites.
///
/// Field names follow the YAML keys (`N`, `f`, `kon`, ..., `seed_zero`). The
/// resection delay is read from either `gamma_k`/`gamma_theta` or
/// `delay_mu`/`delay_sigma`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Total number of binding sites.
    #[serde(rename = "N")]
    pub population: u64,
    /// Probability that an association is homologous.
    #[serde(rename = "f")]
    pub homologous_fraction: f64,
    pub kon: f64,
    pub koff1: f64,
    pub kext: f64,
    pub ktol: f64,
    pub kdloop: f64,
    pub koff2: f64,
    pub kre: f64,
    /// Length classes a complex moves through, shortest first.
    pub intermediates: Vec<u32>,
    /// Simulated horizon.
    pub timepoints: u64,
    /// Sampling stride, divides `timepoints`.
    pub every: u64,
    #[serde(flatten)]
    pub delay: DelayDistribution,
    #[serde(rename = "seed_zero")]
    pub seed_base: u64,
    #[serde(default)]
    pub censor: CensorMode,
}

/// Distribution of the resection delay preceding the search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DelayDistribution {
    Gamma { gamma_k: f64, gamma_theta: f64 },
    /// Normal draw, folded onto the positive axis.
    Normal { delay_mu: f64, delay_sigma: f64 },
}

/// Which D-loop channels are zeroed once recombination has happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CensorMode {
    #[default]
    Homologous,
    Both,
}

/// Run identifier derived from the configuration values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub u32);

impl Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Config {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks every invariant the generator and the driver rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population == 0 {
            return Err(ConfigError::EmptyPopulation);
        }
        if !(0.0..=1.0).contains(&self.homologous_fraction) {
            return Err(ConfigError::FractionOutOfRange(self.homologous_fraction));
        }
        for (name, value) in self.rate_constants() {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidRate { name, value });
            }
        }

        let first = *self.intermediates.first().ok_or(ConfigError::NoIntermediates)?;
        if first != MINIMAL_COMPLEX {
            return Err(ConfigError::FirstIntermediate(first));
        }
        for pair in self.intermediates.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ConfigError::NonIncreasingIntermediates {
                    previous: pair[0],
                    next: pair[1],
                });
            }
        }

        if self.timepoints == 0 {
            return Err(ConfigError::EmptyHorizon);
        }
        if self.every == 0 || self.timepoints % self.every != 0 {
            return Err(ConfigError::InvalidStride {
                timepoints: self.timepoints,
                every: self.every,
            });
        }

        self.delay.validate()
    }

    pub fn rate_constants(&self) -> [(&'static str, f64); 7] {
        [
            ("kon", self.kon),
            ("koff1", self.koff1),
            ("kext", self.kext),
            ("ktol", self.ktol),
            ("kdloop", self.kdloop),
            ("koff2", self.koff2),
            ("kre", self.kre),
        ]
    }

    /// Number of samples in a spliced trajectory.
    pub fn sample_count(&self) -> usize {
        (self.timepoints / self.every) as usize
    }

    /// Hashes the configuration values, in declaration order, into a 32 bit id.
    pub fn fingerprint(&self) -> Fingerprint {
        let digest = Sha256::digest(self.canonical_values().as_bytes());
        // low 32 bits of the digest read as a big endian integer
        let tail = [digest[28], digest[29], digest[30], digest[31]];
        Fingerprint(u32::from_be_bytes(tail))
    }

    fn canonical_values(&self) -> String {
        let intermediates = self
            .intermediates
            .iter()
            .map(|length| length.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let delay = match self.delay {
            DelayDistribution::Gamma { gamma_k, gamma_theta } => format!("{gamma_k}{gamma_theta}"),
            DelayDistribution::Normal { delay_mu, delay_sigma } => format!("{delay_mu}{delay_sigma}"),
        };

        let censor = match self.censor {
            CensorMode::Homologous => "",
            CensorMode::Both => "both",
        };

        format!(
            "{}{}{}{}{}{}{}{}{}[{}]{}{}{}{}{}",
            self.population,
            self.homologous_fraction,
            self.kon,
            self.koff1,
            self.kext,
            self.ktol,
            self.kdloop,
            self.koff2,
            self.kre,
            intermediates,
            self.timepoints,
            self.every,
            delay,
            self.seed_base,
            censor,
        )
    }
}

impl DelayDistribution {
    fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            DelayDistribution::Gamma { gamma_k, gamma_theta } => {
                Gamma::new(gamma_k, gamma_theta).map_err(|e| ConfigError::InvalidDelay(e.to_string()))?;
            }
            DelayDistribution::Normal { delay_mu, delay_sigma } => {
                Normal::new(delay_mu, delay_sigma).map_err(|e| ConfigError::InvalidDelay(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Draws one raw delay. Not yet truncated or clipped to the horizon.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, ConfigError> {
        match *self {
            DelayDistribution::Gamma { gamma_k, gamma_theta } => {
                let gamma = Gamma::new(gamma_k, gamma_theta).map_err(|e| ConfigError::InvalidDelay(e.to_string()))?;
                Ok(gamma.sample(rng))
            }
            DelayDistribution::Normal { delay_mu, delay_sigma } => {
                let normal = Normal::new(delay_mu, delay_sigma).map_err(|e| ConfigError::InvalidDelay(e.to_string()))?;
                Ok(normal.sample(rng))
            }
        }
    }
}

use std::fmt::{self, Display};

use super::solution::Name;
use super::species::Family;
use crate::config::Config;

/// Base of the per-threshold stabilization of a complex against dissociation.
pub const STABILIZATION_BASE: f64 = 1.4;

/// Represents a single first order reaction: one molecule of the reactant
/// becomes one molecule of the product with a propensity of
/// `rate constant * reactant count`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    reactant: Name,
    product: Name,
    rate_law: RateLaw,
}

impl Reaction {
    pub fn new(reactant: Name, product: Name, rate_law: RateLaw) -> Self {
        Self { reactant, product, rate_law }
    }

    pub fn get_reactant(&self) -> &Name {
        &self.reactant
    }

    pub fn get_product(&self) -> &Name {
        &self.product
    }

    pub fn get_rate_law(&self) -> RateLaw {
        self.rate_law
    }
}

/// Named rate constants a rate law is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateConstants {
    pub kon: f64,
    pub f: f64,
    pub koff1: f64,
    pub kext: f64,
    pub ktol: f64,
    pub kdloop: f64,
    pub koff2: f64,
    pub kre: f64,
}

impl From<&Config> for RateConstants {
    fn from(config: &Config) -> Self {
        Self {
            kon: config.kon,
            f: config.homologous_fraction,
            koff1: config.koff1,
            kext: config.kext,
            ktol: config.ktol,
            kdloop: config.kdloop,
            koff2: config.koff2,
            kre: config.kre,
        }
    }
}

/// Rate constant of a reaction, kept symbolic until a kernel compiles the network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateLaw {
    /// `kon * f` for homologous sites, `kon * (1 - f)` otherwise.
    Association(Family),
    /// `koff1 / 1.4^stabilization`
    Dissociation { stabilization: u32 },
    /// `kext`, throttled by `ktol` for heterologous complexes.
    Extension(Family),
    /// `kdloop * 10^-exponent`; complexes too short to commit have no exponent and a zero rate.
    DLoopFormation { exponent: Option<u32> },
    /// `koff2`
    DLoopDissociation,
    /// `kre`
    Recombination,
}

impl RateLaw {
    pub fn constant(&self, k: &RateConstants) -> f64 {
        match *self {
            RateLaw::Association(Family::Homologous) => k.kon * k.f,
            RateLaw::Association(Family::Heterologous) => k.kon * (1.0 - k.f),
            RateLaw::Dissociation { stabilization } => {
                k.koff1 / STABILIZATION_BASE.powi(stabilization as i32)
            }
            RateLaw::Extension(Family::Homologous) => k.kext,
            RateLaw::Extension(Family::Heterologous) => k.kext * k.ktol,
            RateLaw::DLoopFormation { exponent } => k.kdloop * commitment_probability(exponent),
            RateLaw::DLoopDissociation => k.koff2,
            RateLaw::Recombination => k.kre,
        }
    }
}

/// `10^-exponent`, or zero without an exponent.
pub fn commitment_probability(exponent: Option<u32>) -> f64 {
    match exponent {
        Some(x) => 10f64.powi(-(x as i32)),
        None => 0.0,
    }
}

impl Display for RateLaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RateLaw::Association(Family::Homologous) => write!(f, "kon * f"),
            RateLaw::Association(Family::Heterologous) => write!(f, "kon * (1 - f)"),
            RateLaw::Dissociation { stabilization } => {
                write!(f, "koff1 / ({STABILIZATION_BASE}^{stabilization})")
            }
            RateLaw::Extension(Family::Homologous) => write!(f, "kext"),
            RateLaw::Extension(Family::Heterologous) => write!(f, "kext * ktol"),
            RateLaw::DLoopFormation { exponent } => {
                write!(f, "kdloop * {}", commitment_probability(exponent))
            }
            RateLaw::DLoopDissociation => write!(f, "koff2"),
            RateLaw::Recombination => write!(f, "kre"),
        }
    }
}

use std::fmt::{self, Display};

use reaction::{RateConstants, RateLaw, Reaction};
use solution::Name;
use species::{Family, SpeciesIndex, FREE_SITES, RECOMBINED, TIME};

use crate::config::{Config, Fingerprint};
use crate::error::{ConfigError, KernelError};

pub mod reaction;
pub mod solution;
pub mod species;

/// Lengths a complex must exceed to gain one more stabilization step.
pub const STABILIZATION_THRESHOLDS: [u32; 4] = [8, 9, 12, 15];
/// Stabilization saturates after this many steps.
pub const MAX_STABILIZATION: u32 = 4;

/// Shortest complex able to form a D-loop.
pub const DLOOP_MIN_LENGTH: u32 = 15;
/// `[min, max)` length brackets and the decade exponent of their commitment probability.
pub const DLOOP_BRACKETS: [(u32, u32, u32); 5] = [
    (15, 24, 5),
    (24, 48, 4),
    (48, 96, 3),
    (96, 144, 2),
    (144, 192, 1),
];
/// Exponent for complexes past the last bracket: they always commit at `kdloop`.
pub const DLOOP_TERMINAL_EXPONENT: u32 = 0;

/// Data structure representing the RAD51 strand exchange network: an ordered
/// list of first order reactions plus the rate constants their laws refer to.
#[derive(Clone, Debug, PartialEq)]
pub struct ReactionNetwork {
    reactions: Vec<Reaction>,
    constants: RateConstants,
    population: u64,
}

/// A reaction lowered to species slots and a numeric rate constant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompiledReaction {
    pub reactant: usize,
    pub product: usize,
    pub constant: f64,
}

/// Everything a worker needs to run replicates of one configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    pub network: ReactionNetwork,
    pub species: SpeciesIndex,
    pub fingerprint: Fingerprint,
}

impl ReactionNetwork {
    pub fn get_reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn get_constants(&self) -> &RateConstants {
        &self.constants
    }

    pub fn get_population(&self) -> u64 {
        self.population
    }

    /// Resolves every species against the table and evaluates the rate laws.
    pub fn compile(&self, species: &SpeciesIndex) -> Result<Vec<CompiledReaction>, KernelError> {
        self.reactions
            .iter()
            .enumerate()
            .map(|(id, reaction)| {
                let resolve = |name: &Name| {
                    species.slot(&name.0).ok_or_else(|| KernelError::UnknownSpecies {
                        reaction: id,
                        species: name.0.clone(),
                    })
                };
                Ok(CompiledReaction {
                    reactant: resolve(reaction.get_reactant())?,
                    product: resolve(reaction.get_product())?,
                    constant: reaction.get_rate_law().constant(&self.constants),
                })
            })
            .collect()
    }
}

/// Number of stabilization thresholds a complex of this length exceeds.
pub fn stabilization(length: u32) -> u32 {
    let exceeded = STABILIZATION_THRESHOLDS.iter().filter(|&&t| length > t).count() as u32;
    exceeded.min(MAX_STABILIZATION)
}

/// Decade exponent of the D-loop commitment probability, `None` when the
/// complex is too short to commit. The first matching bracket wins.
pub fn dloop_exponent(length: u32) -> Option<u32> {
    if length < DLOOP_MIN_LENGTH {
        return None;
    }
    let exponent = DLOOP_BRACKETS
        .iter()
        .find(|(min, max, _)| (*min..*max).contains(&length))
        .map(|(_, _, x)| *x)
        .unwrap_or(DLOOP_TERMINAL_EXPONENT);
    Some(exponent)
}

/// Builds the network, its species table and the run fingerprint from a configuration.
pub fn generate(config: &Config) -> Result<Model, ConfigError> {
    config.validate()?;

    let intermediates = &config.intermediates;
    let species = SpeciesIndex::declare(intermediates);
    let free = || Name(FREE_SITES.to_string());
    let mut reactions = Vec::new();

    // association
    for family in Family::ALL {
        reactions.push(Reaction::new(
            free(),
            family.complex_name(intermediates[0]),
            RateLaw::Association(family),
        ));
    }

    // dissociation
    for family in Family::ALL {
        for &length in intermediates {
            reactions.push(Reaction::new(
                family.complex_name(length),
                free(),
                RateLaw::Dissociation { stabilization: stabilization(length) },
            ));
        }
    }

    // extension
    for family in Family::ALL {
        for pair in intermediates.windows(2) {
            reactions.push(Reaction::new(
                family.complex_name(pair[0]),
                family.complex_name(pair[1]),
                RateLaw::Extension(family),
            ));
        }
    }

    // D-loop formation, longest complexes first
    for family in Family::ALL {
        for &length in intermediates.iter().rev() {
            reactions.push(Reaction::new(
                family.complex_name(length),
                Name(family.dloop().to_string()),
                RateLaw::DLoopFormation { exponent: dloop_exponent(length) },
            ));
        }
    }

    // D-loop fate
    for family in Family::ALL {
        reactions.push(Reaction::new(
            Name(family.dloop().to_string()),
            free(),
            RateLaw::DLoopDissociation,
        ));
    }
    for family in Family::ALL {
        reactions.push(Reaction::new(
            Name(family.dloop().to_string()),
            Name(RECOMBINED.to_string()),
            RateLaw::Recombination,
        ));
    }

    let network = ReactionNetwork {
        reactions,
        constants: RateConstants::from(config),
        population: config.population,
    };

    Ok(Model {
        network,
        species,
        fingerprint: config.fingerprint(),
    })
}

impl Model {
    /// Renders the model as Antimony source for SBML based kernels.
    pub fn to_antimony(&self) -> String {
        self.to_string()
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let k = self.network.get_constants();

        writeln!(f, "model rad51_recombination()")?;
        writeln!(f, "    // Parameters")?;
        writeln!(f, "    N = {};", self.network.get_population())?;
        for (name, value) in [
            ("f", k.f),
            ("kon", k.kon),
            ("koff1", k.koff1),
            ("kext", k.kext),
            ("ktol", k.ktol),
            ("kdloop", k.kdloop),
            ("koff2", k.koff2),
            ("kre", k.kre),
        ] {
            writeln!(f, "    {name} = {value};")?;
        }

        writeln!(f, "\n    // Species")?;
        for (_, name) in self.species.iter() {
            match name.0.as_str() {
                TIME => {}
                FREE_SITES => writeln!(f, "    {FREE_SITES} = N;")?,
                other => writeln!(f, "    {other} = 0;")?,
            }
        }

        writeln!(f, "\n    // Reactions")?;
        for (id, reaction) in self.network.get_reactions().iter().enumerate() {
            let reactant = &reaction.get_reactant().0;
            writeln!(
                f,
                "    R{}: {} -> {}; {} * {};",
                id + 1,
                reactant,
                reaction.get_product().0,
                reaction.get_rate_law(),
                reactant,
            )?;
        }
        writeln!(f, "end")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::small_config;

    fn rate_laws_from(model: &Model, reactant: &str) -> Vec<(String, RateLaw)> {
        model
            .network
            .get_reactions()
            .iter()
            .filter(|r| r.get_reactant().0 == reactant)
            .map(|r| (r.get_product().0.clone(), r.get_rate_law()))
            .collect()
    }

    #[test]
    fn stabilization_saturates() {
        assert_eq!(stabilization(8), 0);
        assert_eq!(stabilization(9), 1);
        assert_eq!(stabilization(12), 2);
        assert_eq!(stabilization(15), 3);
        assert_eq!(stabilization(16), 4);
        assert_eq!(stabilization(384), 4);
    }

    #[test]
    fn dloop_brackets() {
        assert_eq!(dloop_exponent(12), None);
        assert_eq!(dloop_exponent(15), Some(5));
        assert_eq!(dloop_exponent(23), Some(5));
        assert_eq!(dloop_exponent(24), Some(4));
        assert_eq!(dloop_exponent(48), Some(3));
        assert_eq!(dloop_exponent(96), Some(2));
        assert_eq!(dloop_exponent(144), Some(1));
        assert_eq!(dloop_exponent(191), Some(1));
        assert_eq!(dloop_exponent(192), Some(0));
        assert_eq!(dloop_exponent(384), Some(0));
    }

    #[test]
    fn longest_complexes_commit_at_full_rate() {
        let mut config = small_config();
        config.intermediates = vec![8, 9, 12, 15, 24, 48, 96, 144, 192, 384];
        config.kdloop = 1.0;
        let model = generate(&config).unwrap();
        let compiled = model.network.compile(&model.species).unwrap();

        let constant_of = |reactant: &str, product: &str| {
            let reactant = model.species.slot(reactant).unwrap();
            let product = model.species.slot(product).unwrap();
            compiled
                .iter()
                .find(|r| r.reactant == reactant && r.product == product)
                .map(|r| r.constant)
                .unwrap()
        };
        assert_eq!(constant_of("HM384", "DHM"), 1.0);
        assert_eq!(constant_of("HT192", "DHT"), 1.0);
        assert!((constant_of("HM144", "DHM") - 0.1).abs() < 1e-15);

        let text = model.to_antimony();
        assert!(text.contains("HM384 -> DHM; kdloop * 1 * HM384;\n"));
    }

    #[test]
    fn reaction_counts() {
        let model = generate(&small_config()).unwrap();
        // 2 associations, 6 dissociations, 4 extensions, 6 D-loop formations, 4 fates
        assert_eq!(model.network.get_reactions().len(), 22);
        assert_eq!(model.species.len(), 11);
    }

    #[test]
    fn association_targets_shortest_complex() {
        let model = generate(&small_config()).unwrap();
        assert_eq!(
            rate_laws_from(&model, "S"),
            vec![
                ("HM8".to_string(), RateLaw::Association(Family::Homologous)),
                ("HT8".to_string(), RateLaw::Association(Family::Heterologous)),
            ]
        );
    }

    #[test]
    fn complexes_dissociate_extend_and_commit() {
        let model = generate(&small_config()).unwrap();
        assert_eq!(
            rate_laws_from(&model, "HT9"),
            vec![
                ("S".to_string(), RateLaw::Dissociation { stabilization: 1 }),
                ("HT12".to_string(), RateLaw::Extension(Family::Heterologous)),
                ("DHT".to_string(), RateLaw::DLoopFormation { exponent: None }),
            ]
        );
        // the longest class has no extension
        assert_eq!(rate_laws_from(&model, "HM12").len(), 2);
    }

    #[test]
    fn dloops_dissociate_or_recombine() {
        let model = generate(&small_config()).unwrap();
        assert_eq!(
            rate_laws_from(&model, "DHM"),
            vec![
                ("S".to_string(), RateLaw::DLoopDissociation),
                ("R".to_string(), RateLaw::Recombination),
            ]
        );
        assert!(rate_laws_from(&model, "R").is_empty());
    }

    #[test]
    fn every_species_resolves() {
        let model = generate(&small_config()).unwrap();
        let compiled = model.network.compile(&model.species).unwrap();
        assert_eq!(compiled.len(), model.network.get_reactions().len());
        assert_eq!(compiled[0].reactant, 1);
        assert_eq!(compiled[0].product, 2);
        assert!((compiled[0].constant - 0.0001 * 0.002).abs() < 1e-18);
    }

    #[test]
    fn compile_rejects_foreign_table() {
        let model = generate(&small_config()).unwrap();
        let other = SpeciesIndex::declare(&[8, 9]);
        assert!(matches!(
            model.network.compile(&other),
            Err(KernelError::UnknownSpecies { .. })
        ));
    }

    #[test]
    fn generation_is_deterministic() {
        let config = small_config();
        let first = generate(&config).unwrap();
        let second = generate(&config.clone()).unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.species, second.species);
        assert_eq!(first.to_antimony(), second.to_antimony());
    }

    #[test]
    fn invalid_config_produces_no_network() {
        let mut config = small_config();
        config.intermediates = vec![10, 12];
        assert!(matches!(generate(&config), Err(ConfigError::FirstIntermediate(10))));
    }

    #[test]
    fn antimony_lists_reactions() {
        let text = generate(&small_config()).unwrap().to_antimony();
        assert!(text.starts_with("model rad51_recombination()"));
        assert!(text.contains("    S = N;\n"));
        assert!(text.contains("    R1: S -> HM8; kon * f * S;\n"));
        assert!(text.contains("    R22: DHT -> R; kre * DHT;\n"));
        assert!(text.trim_end().ends_with("end"));
        assert!(!text.contains("Time"));
    }

    #[test]
    fn antimony_is_the_display_form() {
        let model = generate(&small_config()).unwrap();
        assert_eq!(model.to_antimony(), format!("{}", model));
    }
}

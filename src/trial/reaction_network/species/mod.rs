use std::collections::HashMap;

use super::solution::Name;

pub const TIME: &str = "Time";
pub const FREE_SITES: &str = "S";
pub const RECOMBINED: &str = "R";

/// Slot of the sample time in every trajectory.
pub const TIME_SLOT: usize = 0;
/// Slot of the free binding sites in every trajectory.
pub const FREE_SITES_SLOT: usize = 1;

/// The two mirrored complex families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Homologous,
    Heterologous,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::Homologous, Family::Heterologous];

    /// Prefix of the complex species of this family, e.g. `HM48`.
    pub fn prefix(&self) -> &'static str {
        match self {
            Family::Homologous => "HM",
            Family::Heterologous => "HT",
        }
    }

    pub fn complex_name(&self, length: u32) -> Name {
        Name(format!("{}{}", self.prefix(), length))
    }

    /// Name of the D-loop species the family's complexes commit to.
    pub fn dloop(&self) -> &'static str {
        match self {
            Family::Homologous => "DHM",
            Family::Heterologous => "DHT",
        }
    }
}

/// Bijection between species names and trajectory rows.
///
/// Built once per configuration by the generator and shipped alongside every
/// trajectory so rows are always looked up by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeciesIndex {
    names: Vec<Name>,
    slots: HashMap<Name, usize>,
}

impl SpeciesIndex {
    /// Declares `Time`, `S`, both complex families, both D-loops and `R`, in that order.
    pub fn declare(intermediates: &[u32]) -> Self {
        let mut names = vec![Name(TIME.to_string()), Name(FREE_SITES.to_string())];
        for family in Family::ALL {
            for &length in intermediates {
                names.push(family.complex_name(length));
            }
        }
        for family in Family::ALL {
            names.push(Name(family.dloop().to_string()));
        }
        names.push(Name(RECOMBINED.to_string()));

        Self::from_names(names)
    }

    fn from_names(names: Vec<Name>) -> Self {
        let slots = names
            .iter()
            .enumerate()
            .map(|(slot, name)| (name.clone(), slot))
            .collect();
        Self { names, slots }
    }

    /// Returns the row of a species, if declared
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.slots.get(&Name(name.to_string())).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Name)> {
        self.names.iter().enumerate()
    }

    /// Complexes of one family as `(length, slot)` pairs, parsed from the name suffix.
    pub fn complexes(&self, family: Family) -> Vec<(u32, usize)> {
        self.iter()
            .filter_map(|(slot, name)| {
                let suffix = name.0.strip_prefix(family.prefix())?;
                suffix.parse::<u32>().ok().map(|length| (length, slot))
            })
            .collect()
    }
}

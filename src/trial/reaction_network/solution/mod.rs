use super::species::SpeciesIndex;

/// Tuple struct wrapper around the name of a species
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Debug)]
pub struct Name(pub String);

/// Tuple struct wrapper around the molecule count of a species
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug, Default)]
pub struct Count(pub u64);

/// Molecule counts of every declared species, indexed by species slot.
///
/// Slot 0 belongs to time and always holds zero; the kernel tracks time itself.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct Solution {
    species_counts: Vec<Count>,
}

impl Solution {
    /// All species at zero.
    pub fn empty(species: &SpeciesIndex) -> Self {
        Self {
            species_counts: vec![Count::default(); species.len()],
        }
    }

    pub fn get(&self, slot: usize) -> Count {
        self.species_counts.get(slot).copied().unwrap_or_default()
    }

    /// Forces a species to a count, ignoring whatever the dynamics produced.
    pub fn set(&mut self, slot: usize, count: Count) {
        if let Some(current) = self.species_counts.get_mut(slot) {
            *current = count;
        }
    }

    /// Checks that one molecule of the reactant is available
    pub fn validate(&self, reactant: usize) -> bool {
        self.get(reactant).0 > 0
    }

    /// Moves one molecule from `reactant` to `product`. Returns false, leaving
    /// the solution untouched, when the reactant is depleted.
    pub fn apply(&mut self, reactant: usize, product: usize) -> bool {
        if !self.validate(reactant) || product >= self.species_counts.len() {
            return false;
        }
        self.species_counts[reactant].0 -= 1;
        self.species_counts[product].0 += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.species_counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species_counts.is_empty()
    }

    /// Sum over every species except time.
    pub fn total(&self) -> u64 {
        self.species_counts.iter().skip(1).map(|count| count.0).sum()
    }
}

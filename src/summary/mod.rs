use std::collections::BTreeMap;

use crate::trial::reaction_network::species::{
    Family, SpeciesIndex, FREE_SITES_SLOT, RECOMBINED, TIME_SLOT,
};
use crate::trial::results::Trajectory;

pub const TIME: &str = "time";
pub const FREE_SITES: &str = "free sites";
pub const OCCUPIED_SITES: &str = "occupied sites";
pub const DLOOP_HOMOLOGIES: &str = "D-loop homologies";
pub const DLOOP_HETEROLOGIES: &str = "D-loop heterologies";
pub const RECOMBINED_CHANNEL: &str = "Recombined";

/// Inclusive range of complex lengths grouped into one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub label: &'static str,
    pub min: u32,
    /// `None` leaves the bucket open ended.
    pub max: Option<u32>,
}

impl Bucket {
    pub fn contains(&self, length: u32) -> bool {
        length >= self.min && self.max.map_or(true, |max| length <= max)
    }
}

pub const BUCKETS: [Bucket; 5] = [
    Bucket { label: "8-9", min: 8, max: Some(9) },
    Bucket { label: "12-21", min: 12, max: Some(21) },
    Bucket { label: "24-48", min: 24, max: Some(48) },
    Bucket { label: "51-144", min: 51, max: Some(144) },
    Bucket { label: ">144", min: 145, max: None },
];

pub fn family_channel(family: Family, bucket: &Bucket) -> String {
    let prefix = match family {
        Family::Homologous => "homo",
        Family::Heterologous => "hetero",
    };
    format!("{} {} nts", prefix, bucket.label)
}

pub fn all_associations_channel(bucket: &Bucket) -> String {
    format!("all associations {} nts", bucket.label)
}

/// Named time series of one replicate, or the mean of many.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Summary {
    channels: BTreeMap<String, Vec<f64>>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: impl Into<String>, series: Vec<f64>) {
        self.channels.insert(channel.into(), series);
    }

    pub fn get(&self, channel: &str) -> Option<&[f64]> {
        self.channels.get(channel).map(Vec::as_slice)
    }

    pub fn get_mut(&mut self, channel: &str) -> Option<&mut Vec<f64>> {
        self.channels.get_mut(channel)
    }

    /// Channel names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.channels.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Vec<f64>)> {
        self.channels.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Length of the time axis, taken from the first channel.
    pub fn samples(&self) -> usize {
        self.channels.values().next().map(Vec::len).unwrap_or(0)
    }
}

impl FromIterator<(String, Vec<f64>)> for Summary {
    fn from_iter<I: IntoIterator<Item = (String, Vec<f64>)>>(iter: I) -> Self {
        Self {
            channels: iter.into_iter().collect(),
        }
    }
}

fn sum_rows(trajectory: &Trajectory, slots: impl IntoIterator<Item = usize>) -> Vec<f64> {
    let mut total = vec![0.0; trajectory.samples()];
    for slot in slots {
        for (acc, value) in total.iter_mut().zip(trajectory.row(slot)) {
            *acc += value;
        }
    }
    total
}

fn add(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x + y).collect()
}

/// Groups the rows of a spliced trajectory into named channels.
///
/// Every bucket channel is emitted even when no declared species falls into
/// it, so all replicates of a configuration share one key set.
pub fn extract(trajectory: &Trajectory, species: &SpeciesIndex) -> Summary {
    let mut summary = Summary::new();
    let passthrough = |name: &str| {
        species
            .slot(name)
            .map(|slot| trajectory.row(slot).to_vec())
            .unwrap_or_else(|| vec![0.0; trajectory.samples()])
    };

    summary.insert(TIME, trajectory.row(TIME_SLOT).to_vec());
    summary.insert(FREE_SITES, trajectory.row(FREE_SITES_SLOT).to_vec());
    summary.insert(
        OCCUPIED_SITES,
        sum_rows(trajectory, (0..trajectory.species()).filter(|&s| s != TIME_SLOT && s != FREE_SITES_SLOT)),
    );

    let homologous = species.complexes(Family::Homologous);
    let heterologous = species.complexes(Family::Heterologous);
    for bucket in &BUCKETS {
        let in_bucket = |complexes: &[(u32, usize)]| {
            let slots: Vec<usize> = complexes
                .iter()
                .filter(|(length, _)| bucket.contains(*length))
                .map(|(_, slot)| *slot)
                .collect();
            sum_rows(trajectory, slots)
        };
        let homo = in_bucket(&homologous);
        let hetero = in_bucket(&heterologous);

        summary.insert(all_associations_channel(bucket), add(&homo, &hetero));
        summary.insert(family_channel(Family::Homologous, bucket), homo);
        summary.insert(family_channel(Family::Heterologous, bucket), hetero);
    }

    summary.insert(DLOOP_HOMOLOGIES, passthrough(Family::Homologous.dloop()));
    summary.insert(DLOOP_HETEROLOGIES, passthrough(Family::Heterologous.dloop()));
    summary.insert(RECOMBINED_CHANNEL, passthrough(RECOMBINED));

    summary
}

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{Config, Fingerprint};
use crate::error::ArchiveError;
use crate::summary::Summary;
use crate::trial::results::TrialResult;

/// Column holding the censored homologous D-loop series of a replicate.
pub const DLC_COLUMN: &str = "DLC homologous";

/// Where every artifact of one configuration lives: `<output>/<fingerprint>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    pub fn new(output: &Path, fingerprint: Fingerprint) -> Self {
        Self {
            root: output.join(fingerprint.to_string()),
        }
    }

    /// Creates the run directory and its `records/` subdirectory.
    pub fn create(&self) -> Result<(), ArchiveError> {
        std::fs::create_dir_all(self.records_dir())?;
        Ok(())
    }

    pub fn get_root(&self) -> &Path {
        &self.root
    }

    pub fn records_dir(&self) -> PathBuf {
        self.root.join("records")
    }

    pub fn replicate_path(&self, id: usize) -> PathBuf {
        self.records_dir().join(format!("simulation_{}.csv", id))
    }

    pub fn params_path(&self) -> PathBuf {
        self.root.join("params.yaml")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("run.yaml")
    }

    pub fn ensemble_path(&self) -> PathBuf {
        self.root.join("ensemble.csv")
    }

    pub fn curve_path(&self, window: usize) -> PathBuf {
        self.root.join(format!("dlc_window{}.csv", window))
    }
}

/// Bookkeeping written next to the parameters when a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub fingerprint: u32,
    pub replicates: usize,
    pub ranks: usize,
    pub windows: Vec<usize>,
    pub started_at: DateTime<Utc>,
}

pub fn write_params(layout: &RunLayout, config: &Config) -> Result<(), ArchiveError> {
    std::fs::write(layout.params_path(), serde_yaml::to_string(config)?)?;
    Ok(())
}

pub fn write_manifest(layout: &RunLayout, manifest: &RunManifest) -> Result<(), ArchiveError> {
    std::fs::write(layout.manifest_path(), serde_yaml::to_string(manifest)?)?;
    Ok(())
}

pub fn read_manifest(layout: &RunLayout) -> Result<RunManifest, ArchiveError> {
    let yaml = std::fs::read_to_string(layout.manifest_path())?;
    Ok(serde_yaml::from_str(&yaml)?)
}

/// Writes named columns of equal length, one sample per row.
fn write_columns(path: &Path, columns: &[(&str, &[f64])]) -> Result<(), ArchiveError> {
    let samples = columns.first().map(|(_, series)| series.len()).unwrap_or(0);
    if let Some((name, series)) = columns.iter().find(|(_, series)| series.len() != samples) {
        return Err(ArchiveError::Malformed {
            path: path.display().to_string(),
            reason: format!("column {:?} has {} samples, expected {}", name, series.len(), samples),
        });
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(columns.iter().map(|(name, _)| *name))?;
    for i in 0..samples {
        writer.write_record(columns.iter().map(|(_, series)| series[i].to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

fn read_columns(path: &Path) -> Result<Vec<(String, Vec<f64>)>, ArchiveError> {
    let malformed = |reason: String| ArchiveError::Malformed {
        path: path.display().to_string(),
        reason,
    };

    let mut reader = csv::Reader::from_path(path)?;
    let mut columns: Vec<(String, Vec<f64>)> = reader
        .headers()?
        .iter()
        .map(|name| (name.to_string(), Vec::new()))
        .collect();

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != columns.len() {
            return Err(malformed(format!(
                "row {} has {} fields, expected {}",
                line + 1,
                record.len(),
                columns.len()
            )));
        }
        for ((name, series), field) in columns.iter_mut().zip(record.iter()) {
            let value = field
                .parse::<f64>()
                .map_err(|e| malformed(format!("row {} column {:?}: {}", line + 1, name, e)))?;
            series.push(value);
        }
    }
    Ok(columns)
}

/// Archives one replicate under `records/simulation_<id>.csv`.
pub fn write_replicate(layout: &RunLayout, result: &TrialResult) -> Result<(), ArchiveError> {
    let mut columns: Vec<(&str, &[f64])> = result.summary.iter().collect();
    columns.push((DLC_COLUMN, result.dlc.as_slice()));
    write_columns(&layout.replicate_path(result.id), &columns)
}

/// Loads an archived replicate, or `None` when it was never written.
pub fn read_replicate(
    layout: &RunLayout,
    id: usize,
) -> Result<Option<(Summary, Vec<f64>)>, ArchiveError> {
    let path = layout.replicate_path(id);
    if !path.exists() {
        return Ok(None);
    }

    let mut dlc = None;
    let mut summary = Summary::new();
    for (name, series) in read_columns(&path)? {
        if name == DLC_COLUMN {
            dlc = Some(series);
        } else {
            summary.insert(name, series);
        }
    }
    let dlc = dlc.ok_or_else(|| ArchiveError::Malformed {
        path: path.display().to_string(),
        reason: format!("missing {:?} column", DLC_COLUMN),
    })?;
    Ok(Some((summary, dlc)))
}

pub fn write_ensemble(layout: &RunLayout, summary: &Summary) -> Result<(), ArchiveError> {
    let columns: Vec<(&str, &[f64])> = summary.iter().collect();
    write_columns(&layout.ensemble_path(), &columns)
}

pub fn read_ensemble(layout: &RunLayout) -> Result<Summary, ArchiveError> {
    Ok(read_columns(&layout.ensemble_path())?.into_iter().collect())
}

/// A smoothed DLC curve next to the time axis it was sampled on.
pub fn write_curve(
    layout: &RunLayout,
    window: usize,
    time: &[f64],
    curve: &[f64],
) -> Result<(), ArchiveError> {
    write_columns(
        &layout.curve_path(window),
        &[(crate::summary::TIME, time), (DLC_COLUMN, curve)],
    )
}

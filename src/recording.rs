// Recording files - JSON serialization of runs
//
// A recording holds one run: sample rate, channel labels, a samples ×
// channels matrix stored row by row, and event markers in sample units.
// Subject directories contain `offline/` and `online/` folders of recordings,
// read in file-name order.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::analysis::SubjectInput;
use crate::signal::{ChannelAxis, EventMarker, Run, Signal};
use crate::telemetry::{Diagnostics, SkipReason, SkipScope};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingFile {
    pub id: String,
    pub sample_rate: f64,
    pub channels: Vec<String>,
    /// One row per sample
    pub samples: Vec<Vec<f64>>,
    pub events: Vec<EventMarker>,
}

impl RecordingFile {
    pub fn from_run(run: &Run) -> Self {
        Self {
            id: run.id.clone(),
            sample_rate: run.signal.sample_rate,
            channels: run.signal.channels.labels().to_vec(),
            samples: run.signal.data.rows().into_iter().map(|r| r.to_vec()).collect(),
            events: run.events.clone(),
        }
    }

    pub fn into_run(self) -> Result<Run> {
        let n_channels = self.channels.len();
        let n_samples = self.samples.len();
        if let Some((i, row)) = self
            .samples
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != n_channels)
        {
            bail!(
                "sample row {} has {} values, expected {} channels",
                i,
                row.len(),
                n_channels
            );
        }
        if self.sample_rate <= 0.0 {
            bail!("sample rate must be positive, got {}", self.sample_rate);
        }

        let flat: Vec<f64> = self.samples.into_iter().flatten().collect();
        let data = Array2::from_shape_vec((n_samples, n_channels), flat)
            .context("sample matrix shape")?;

        Ok(Run {
            id: self.id,
            signal: Signal::new(data, self.sample_rate, ChannelAxis::new(self.channels)),
            events: self.events,
        })
    }
}

/// Read one run from a JSON recording
pub fn load_run<P: AsRef<Path>>(path: P) -> Result<Run> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read recording {}", path.display()))?;
    let file: RecordingFile = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse recording {}", path.display()))?;
    file.into_run()
        .with_context(|| format!("Invalid recording {}", path.display()))
}

/// Write one run as a JSON recording
pub fn save_run<P: AsRef<Path>>(run: &Run, path: P) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string(&RecordingFile::from_run(run))
        .context("Failed to serialize recording")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Load several recordings, skipping the ones that fail
///
/// Each failure is recorded with the file path as the run id.
pub fn load_runs(paths: &[PathBuf], diagnostics: &Diagnostics) -> Vec<Run> {
    paths
        .iter()
        .filter_map(|path| match load_run(path) {
            Ok(run) => Some(run),
            Err(err) => {
                diagnostics.record(
                    SkipScope::Run {
                        id: path.display().to_string(),
                    },
                    SkipReason::LoadFailed {
                        message: format!("{:#}", err),
                    },
                );
                None
            }
        })
        .collect()
}

/// JSON files of a directory in file-name order
pub fn recording_paths<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().map(|ext| ext == "json").unwrap_or(false))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Load a subject directory with `offline/` and `online/` recordings
///
/// The subject id is the directory name. Missing folders are an error;
/// unreadable files inside them are skipped and recorded.
pub fn load_subject<P: AsRef<Path>>(dir: P, diagnostics: &Diagnostics) -> Result<SubjectInput> {
    let dir = dir.as_ref();
    let id = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string());

    let offline = load_runs(&recording_paths(dir.join("offline"))?, diagnostics);
    let online = load_runs(&recording_paths(dir.join("online"))?, diagnostics);

    log::info!(
        "[Recording] subject {}: {} offline, {} online runs",
        id,
        offline.len(),
        online.len()
    );

    Ok(SubjectInput {
        id,
        offline,
        online,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    fn small_run() -> Run {
        Run {
            id: "r1".to_string(),
            signal: Signal::new(
                array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
                256.0,
                ChannelAxis::new(vec!["C3".into(), "C4".into()]),
            ),
            events: vec![EventMarker::new(786, 0, 2)],
        }
    }

    #[test]
    fn test_save_and_load_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r1.json");
        save_run(&small_run(), &path).unwrap();

        let loaded = load_run(&path).unwrap();
        assert_eq!(loaded.id, "r1");
        assert_eq!(loaded.signal.data, small_run().signal.data);
        assert_eq!(loaded.signal.channels.labels(), &["C3", "C4"]);
        assert_eq!(loaded.events, small_run().events);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let file = RecordingFile {
            id: "bad".into(),
            sample_rate: 256.0,
            channels: vec!["C3".into(), "C4".into()],
            samples: vec![vec![1.0, 2.0], vec![3.0]],
            events: Vec::new(),
        };
        let err = file.into_run().unwrap_err();
        assert!(err.to_string().contains("sample row 1"));
    }

    #[test]
    fn test_load_runs_skips_broken_files() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("a.json");
        let broken = dir.path().join("b.json");
        save_run(&small_run(), &good).unwrap();
        fs::write(&broken, "{ not json").unwrap();

        let diagnostics = Diagnostics::new();
        let runs = load_runs(&[good, broken.clone(), dir.path().join("missing.json")], &diagnostics);

        assert_eq!(runs.len(), 1);
        let skips = diagnostics.snapshot();
        assert_eq!(skips.len(), 2);
        assert_eq!(
            skips[0].scope,
            SkipScope::Run {
                id: broken.display().to_string()
            }
        );
        assert!(matches!(skips[0].reason, SkipReason::LoadFailed { .. }));
    }

    #[test]
    fn test_load_subject_directory() {
        let dir = tempdir().unwrap();
        let subject = dir.path().join("S07");
        fs::create_dir_all(subject.join("offline")).unwrap();
        fs::create_dir_all(subject.join("online")).unwrap();
        save_run(&small_run(), subject.join("offline").join("1.json")).unwrap();
        save_run(&small_run(), subject.join("offline").join("2.json")).unwrap();
        save_run(&small_run(), subject.join("online").join("1.json")).unwrap();
        fs::write(subject.join("online").join("notes.txt"), "ignored").unwrap();

        let input = load_subject(&subject, &Diagnostics::new()).unwrap();
        assert_eq!(input.id, "S07");
        assert_eq!(input.offline.len(), 2);
        assert_eq!(input.online.len(), 1);
    }

    #[test]
    fn test_missing_subject_folder_is_error() {
        let dir = tempdir().unwrap();
        assert!(load_subject(dir.path(), &Diagnostics::new()).is_err());
    }
}

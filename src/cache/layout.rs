//! Directory layout of an experiment cache
//!
//! ```text
//! <experiment_root>/
//!   LOCKFILE                      corpus stage record
//!   samples/<name>/LOCKFILE       sample stage record
//!   samples/<name>/Manifest.txt
//!   configuration/LOCKFILE        config stage record
//!   configuration/config_manifest.txt
//!   configuration/script.txt
//!   results/LOCKFILE              experiment stage record
//!   results/verify_out/
//!   results/no_verify_out/
//! ```
//!
//! The corpus data itself lives under `corpus_root`, which may be anywhere.

use crate::error::{LabError, LabResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const SAMPLES_DIR: &str = "samples";
pub const CONFIG_DIR: &str = "configuration";
pub const RESULTS_DIR: &str = "results";
pub const SAMPLE_MANIFEST_NAME: &str = "Manifest.txt";
pub const CONFIG_MANIFEST_NAME: &str = "config_manifest.txt";
pub const SCRIPT_NAME: &str = "script.txt";
pub const VERIFY_OUT_DIR: &str = "verify_out";
pub const NO_VERIFY_OUT_DIR: &str = "no_verify_out";

#[derive(Debug, Clone)]
pub struct CacheLayout {
    experiment_root: PathBuf,
    corpus_root: PathBuf,
    samples: BTreeMap<String, PathBuf>,
}

impl CacheLayout {
    pub fn new(
        experiment_root: impl Into<PathBuf>,
        corpus_root: impl Into<PathBuf>,
        sample_names: &[String],
    ) -> Self {
        let experiment_root = experiment_root.into();
        let sample_root = experiment_root.join(SAMPLES_DIR);
        let samples = sample_names
            .iter()
            .map(|name| (name.clone(), sample_root.join(name)))
            .collect();

        Self {
            experiment_root,
            corpus_root: corpus_root.into(),
            samples,
        }
    }

    /// Directory holding the corpus lock record
    pub fn experiment_root(&self) -> &Path {
        &self.experiment_root
    }

    pub fn corpus_root(&self) -> &Path {
        &self.corpus_root
    }

    pub fn sample_names(&self) -> impl Iterator<Item = &str> {
        self.samples.keys().map(String::as_str)
    }

    /// Sample names with their directories, sorted by name
    pub fn samples(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.samples
            .iter()
            .map(|(name, dir)| (name.as_str(), dir.as_path()))
    }

    pub fn sample_dir(&self, name: &str) -> LabResult<&Path> {
        self.samples
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| LabError::UnknownSample(name.to_string()))
    }

    /// Manifest listing the files of sample `name`, one path per line
    pub fn sample_manifest_path(&self, name: &str) -> LabResult<PathBuf> {
        Ok(self.sample_dir(name)?.join(SAMPLE_MANIFEST_NAME))
    }

    pub fn config_dir(&self) -> PathBuf {
        self.experiment_root.join(CONFIG_DIR)
    }

    /// Manifest of corpus files the samples are filtered from
    pub fn config_manifest_path(&self) -> PathBuf {
        self.config_dir().join(CONFIG_MANIFEST_NAME)
    }

    pub fn script_path(&self) -> PathBuf {
        self.config_dir().join(SCRIPT_NAME)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.experiment_root.join(RESULTS_DIR)
    }

    pub fn verify_out_dir(&self) -> PathBuf {
        self.results_dir().join(VERIFY_OUT_DIR)
    }

    pub fn no_verify_out_dir(&self) -> PathBuf {
        self.results_dir().join(NO_VERIFY_OUT_DIR)
    }
}

//! Configuration schema for labstage
//!
//! Configuration is stored at `~/.config/labstage/config.toml`

use crate::corpus::ArchiveFile;
use crate::signature::Signature;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Experiment and corpus locations
    pub paths: PathsConfig,

    /// Corpus archives
    pub corpus: CorpusConfig,

    /// Corpus samples
    pub samples: SamplesConfig,

    /// Query log used by the replay script
    pub query_log: QueryLogConfig,
}

impl Config {
    /// Check values serde cannot check on its own
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = BTreeSet::new();
        for name in &self.samples.names {
            // "." and ".." would resolve to another stage's directory
            if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
                return Err(format!("invalid sample name '{name}'"));
            }
            if !seen.insert(name.as_str()) {
                return Err(format!("sample '{name}' is listed twice"));
            }
        }

        if let Some(config_sample) = &self.samples.config_sample {
            if !seen.contains(config_sample.as_str()) {
                return Err(format!(
                    "config_sample '{config_sample}' is not one of samples.names"
                ));
            }
        }

        let mut archives = BTreeSet::new();
        for archive in &self.corpus.archives {
            if !archives.insert(archive.name.as_str()) {
                return Err(format!("corpus archive '{}' is listed twice", archive.name));
            }
            if archive.signature.is_empty() {
                return Err(format!("corpus archive '{}' has no signature", archive.name));
            }
        }

        if self.query_log.url.is_some() != self.query_log.signature.is_some() {
            return Err("query_log needs both url and signature".to_string());
        }

        Ok(())
    }

    /// Sample the configuration stage is built from
    pub fn config_sample(&self) -> Option<&str> {
        self.samples
            .config_sample
            .as_deref()
            .or_else(|| self.samples.names.first().map(String::as_str))
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Whether cache mutations are performed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Real,
    /// Log mutations without performing them
    Simulate,
}

/// Lock file backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockBackend {
    #[default]
    HardLink,
    ExclusiveCreate,
}

/// General application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: LogFormat,

    /// Run mode: "real" or "simulate"
    pub mode: RunMode,

    /// Lock backend: "hard-link" or "exclusive-create"
    pub lock_backend: LockBackend,
}

/// Experiment and corpus locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the stage cache
    pub experiment_root: PathBuf,

    /// Directory holding the corpus archives and their extracted data
    pub corpus_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            experiment_root: PathBuf::from("experiment"),
            corpus_root: PathBuf::from("corpus"),
        }
    }
}

/// Corpus archive list, in accumulation order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub archives: Vec<ArchiveFile>,
}

/// Corpus sample settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplesConfig {
    /// Sample names, each a directory under `samples/`
    pub names: Vec<String>,

    /// Sample the configuration is built from (defaults to the first name)
    pub config_sample: Option<String>,
}

/// Query log settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLogConfig {
    pub url: Option<String>,
    pub signature: Option<Signature>,
}

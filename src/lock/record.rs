//! Lock record and its on-disk YAML form

use crate::error::{LabError, LabResult};
use crate::lock::{Stage, CONFIG_KEY, CORPUS_KEY, SAMPLE_KEY};
use crate::signature::Signature;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Verified state of one cache stage
///
/// Only `dependency-signatures` and `signature` are persisted. `name` is the
/// path the record was read from and `locked` is set while the record is held
/// by an acquire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    #[serde(rename = "dependency-signatures", default)]
    dependency_signatures: BTreeMap<String, Signature>,

    #[serde(rename = "signature", default)]
    own_signature: Signature,

    #[serde(skip)]
    name: String,

    #[serde(skip)]
    locked: bool,
}

impl LockRecord {
    /// Create an unlocked record
    pub fn new(
        name: impl Into<String>,
        own_signature: Signature,
        dependency_signatures: BTreeMap<String, Signature>,
    ) -> Self {
        Self {
            dependency_signatures,
            own_signature,
            name: name.into(),
            locked: false,
        }
    }

    /// Record for a freshly decompressed corpus
    pub fn corpus(name: impl Into<String>, corpus_signature: Signature) -> Self {
        Self::new(name, corpus_signature, BTreeMap::new())
    }

    /// Record for a corpus sample built from the corpus with `corpus_signature`
    pub fn sample(
        name: impl Into<String>,
        sample_signature: Signature,
        corpus_signature: Signature,
    ) -> Self {
        Self::new(
            name,
            sample_signature,
            BTreeMap::from([(CORPUS_KEY.to_string(), corpus_signature)]),
        )
    }

    /// Record for a runtime configuration built from a sample
    pub fn config(
        name: impl Into<String>,
        config_signature: Signature,
        sample_signature: Signature,
    ) -> Self {
        Self::new(
            name,
            config_signature,
            BTreeMap::from([(SAMPLE_KEY.to_string(), sample_signature)]),
        )
    }

    /// Record for an experiment run against a sample and a configuration
    pub fn experiment(
        name: impl Into<String>,
        results_signature: Signature,
        sample_signature: Signature,
        config_signature: Signature,
    ) -> Self {
        Self::new(
            name,
            results_signature,
            BTreeMap::from([
                (SAMPLE_KEY.to_string(), sample_signature),
                (CONFIG_KEY.to_string(), config_signature),
            ]),
        )
    }

    pub fn own_signature(&self) -> &Signature {
        &self.own_signature
    }

    pub fn dependency_signatures(&self) -> &BTreeMap<String, Signature> {
        &self.dependency_signatures
    }

    pub fn dependency(&self, key: &str) -> Option<&Signature> {
        self.dependency_signatures.get(key)
    }

    /// Diagnostic label, usually the file path the record came from
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this record is currently held and may be overwritten
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn update_signature(&mut self, signature: Signature) {
        self.own_signature = signature;
    }

    pub fn set_dependency(&mut self, key: impl Into<String>, signature: Signature) {
        self.dependency_signatures.insert(key.into(), signature);
    }

    /// Whether the dependency keys have the shape `stage` expects
    pub fn matches_stage_shape(&self, stage: Stage) -> bool {
        let keys = stage.dependency_keys();
        self.dependency_signatures.len() == keys.len()
            && keys.iter().all(|k| self.dependency_signatures.contains_key(*k))
    }

    pub(crate) fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// Serialize to the YAML lock file format
    pub fn to_yaml(&self) -> LabResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parse a lock file, labelling the record with `name`
    pub fn from_yaml(content: &str, name: impl Into<String>) -> LabResult<Self> {
        let name = name.into();
        let mut record: LockRecord =
            serde_yaml::from_str(content).map_err(|e| LabError::LockRecordParse {
                path: name.clone().into(),
                source: e,
            })?;
        record.name = name;
        Ok(record)
    }

    /// Read and parse a lock file from disk
    pub fn read(path: &Path) -> LabResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LabError::io(format!("reading lock file {}", path.display()), e))?;
        Self::from_yaml(&content, path.display().to_string())
    }
}

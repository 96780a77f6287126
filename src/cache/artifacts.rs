//! Runtime configuration artifacts
//!
//! A configuration directory is complete when it holds at least one file for
//! each artifact pattern. The config stage signature covers all of them.

use crate::error::{LabError, LabResult};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};

/// File name patterns produced by the statistics and term table builders
pub const CONFIG_ARTIFACT_PATTERNS: &[&str] = &[
    "CumulativeTermCounts-*.csv",
    "DocFreqTable-*.csv",
    "IndexedIdfTable-*.bin",
    "TermTable-*.bin",
    "DocumentLengthHistogram.csv",
    "TermToText.bin",
];

fn artifact_set() -> LabResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in CONFIG_ARTIFACT_PATTERNS {
        let glob = Glob::new(pattern)
            .map_err(|e| LabError::Internal(format!("bad artifact pattern {pattern}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| LabError::Internal(format!("building artifact patterns: {e}")))
}

/// Artifact files in `config_dir`, grouped by pattern and sorted within each
/// group.
pub fn config_artifacts(config_dir: &Path) -> LabResult<Vec<PathBuf>> {
    let set = artifact_set()?;
    let mut groups: Vec<Vec<PathBuf>> = vec![Vec::new(); CONFIG_ARTIFACT_PATTERNS.len()];

    let entries = fs::read_dir(config_dir).map_err(|e| {
        LabError::io(
            format!("reading configuration directory {}", config_dir.display()),
            e,
        )
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| {
            LabError::io(format!("reading entry in {}", config_dir.display()), e)
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        for index in set.matches(entry.file_name()) {
            groups[index].push(path.clone());
        }
    }

    let missing: Vec<&str> = CONFIG_ARTIFACT_PATTERNS
        .iter()
        .zip(&groups)
        .filter(|(_, group)| group.is_empty())
        .map(|(pattern, _)| *pattern)
        .collect();
    if !missing.is_empty() {
        return Err(LabError::ConfigArtifactsMissing {
            path: config_dir.to_path_buf(),
            missing: missing.join(", "),
        });
    }

    Ok(groups
        .into_iter()
        .flat_map(|mut group| {
            group.sort();
            group
        })
        .collect())
}

//! Dependency validation between stage lock records
//!
//! A dependent stage records the signature of each upstream stage it was
//! built from. Validation checks those against the upstream records' current
//! signatures and never mutates anything.

use crate::error::{LabError, LabResult};
use crate::lock::record::LockRecord;
use crate::lock::{Stage, CONFIG_KEY, CORPUS_KEY, SAMPLE_KEY};
use tracing::debug;

/// Check that `dependent` records `key` as the signature of `upstream`
pub fn validate(dependent: &LockRecord, upstream: &LockRecord, key: &str) -> LabResult<()> {
    let recorded = dependent
        .dependency(key)
        .ok_or_else(|| LabError::MissingDependencyKey {
            name: dependent.name().to_string(),
            key: key.to_string(),
        })?;

    if recorded.is_empty() {
        return Err(LabError::EmptySignature {
            name: dependent.name().to_string(),
            key: key.to_string(),
        });
    }

    let actual = upstream.own_signature();
    if actual.is_empty() {
        return Err(LabError::EmptySignature {
            name: upstream.name().to_string(),
            key: "signature".to_string(),
        });
    }

    // Both sides are normalized on construction
    if recorded != actual {
        return Err(LabError::SignatureMismatch {
            name: dependent.name().to_string(),
            key: key.to_string(),
            upstream: upstream.name().to_string(),
            recorded: recorded.clone(),
            actual: actual.clone(),
        });
    }

    debug!(
        "{} matches {} for '{}'",
        dependent.name(),
        upstream.name(),
        key
    );
    Ok(())
}

fn check_dependency_count(stage: Stage, dependent: &LockRecord) -> LabResult<()> {
    let expected = stage.expected_dependency_count();
    let found = dependent.dependency_signatures().len();
    if found != expected {
        return Err(LabError::WrongDependencyCount {
            stage: stage.to_string(),
            name: dependent.name().to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Check that `record` carries exactly the dependency keys of `stage`
pub fn check_shape(stage: Stage, record: &LockRecord) -> LabResult<()> {
    if record.matches_stage_shape(stage) {
        return Ok(());
    }
    check_dependency_count(stage, record)?;
    let missing = stage
        .dependency_keys()
        .iter()
        .find(|key| record.dependency(key).is_none())
        .copied()
        .unwrap_or_default();
    Err(LabError::MissingDependencyKey {
        name: record.name().to_string(),
        key: missing.to_string(),
    })
}

/// Validate a stage that depends on exactly one upstream stage
pub fn validate_singleton(
    stage: Stage,
    dependent: &LockRecord,
    upstream: &LockRecord,
    key: &str,
) -> LabResult<()> {
    check_dependency_count(stage, dependent)?;
    validate(dependent, upstream, key)
}

/// Validate a stage that depends on exactly two upstream stages
pub fn validate_pair(
    stage: Stage,
    dependent: &LockRecord,
    first: (&LockRecord, &str),
    second: (&LockRecord, &str),
) -> LabResult<()> {
    check_dependency_count(stage, dependent)?;
    validate(dependent, first.0, first.1)?;
    validate(dependent, second.0, second.1)
}

/// Validate a sample record against the corpus record
pub fn validate_sample(corpus: &LockRecord, sample: &LockRecord) -> LabResult<()> {
    validate_singleton(Stage::Sample, sample, corpus, CORPUS_KEY)
}

/// Validate a configuration record against the sample record
pub fn validate_config(sample: &LockRecord, config: &LockRecord) -> LabResult<()> {
    validate_singleton(Stage::Config, config, sample, SAMPLE_KEY)
}

/// Validate an experiment record against its sample and configuration
pub fn validate_experiment(
    sample: &LockRecord,
    config: &LockRecord,
    experiment: &LockRecord,
) -> LabResult<()> {
    validate_pair(
        Stage::Experiment,
        experiment,
        (sample, SAMPLE_KEY),
        (config, CONFIG_KEY),
    )
}

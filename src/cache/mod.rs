//! Staged, content-addressed experiment cache
//!
//! Four stages build on each other: the decompressed corpus, samples filtered
//! from it, a runtime configuration built from one sample, and the results
//! of running the experiment. Each stage directory holds a lock record with
//! the signature of its contents and the signatures of the stages it was
//! built from.
//!
//! The cache never produces artifacts itself. Every flow takes an operation
//! closure that does the work, then hashes what the operation left behind
//! and records it.
//!
//! # Flows
//!
//! | Flow | Locks held | Writes |
//! |------|------------|--------|
//! | `init_*` | upstream stage | first record of the stage |
//! | `update_*` | upstream and the stage | updated record |
//! | `verify_*_cache` | upstream and the stage | nothing new |
//! | `verify_all` | none | nothing |
//!
//! `init_*` refuses to touch a stage that already has a lock file.

pub mod artifacts;
pub mod layout;
pub mod report;
pub mod script;

pub use artifacts::{config_artifacts, CONFIG_ARTIFACT_PATTERNS};
pub use layout::CacheLayout;
pub use report::{StageReport, Verdict};

use crate::context::{ExecContext, FsOperation};
use crate::error::{LabError, LabResult};
use crate::lock::protocol::published_path;
use crate::lock::{
    check_shape, inspect, validate_config, validate_experiment, validate_sample, with_lock, HardLinkLock,
    LockRecord, LockState, Stage, StageLock, CORPUS_KEY, SAMPLE_KEY,
};
use crate::signature::{sign_files, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Stage cache over one experiment directory
pub struct StageCache {
    ctx: ExecContext,
    lock: Box<dyn StageLock>,
    layout: CacheLayout,
}

impl StageCache {
    pub fn new(
        ctx: ExecContext,
        lock: Box<dyn StageLock>,
        experiment_root: impl Into<PathBuf>,
        corpus_root: impl Into<PathBuf>,
        sample_names: &[String],
    ) -> Self {
        Self {
            ctx,
            lock,
            layout: CacheLayout::new(experiment_root, corpus_root, sample_names),
        }
    }

    /// Stage cache guarded by hard-link locks
    pub fn with_hard_links(
        ctx: ExecContext,
        experiment_root: impl Into<PathBuf>,
        corpus_root: impl Into<PathBuf>,
        sample_names: &[String],
    ) -> Self {
        let lock = Box::new(HardLinkLock::new(ctx.clone()));
        Self::new(ctx, lock, experiment_root, corpus_root, sample_names)
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn lock_backend(&self) -> &'static str {
        self.lock.backend_name()
    }

    // Corpus stage

    /// Produce the corpus and publish its first record.
    ///
    /// `decompress` returns the corpus signature, usually from
    /// [`CorpusVerifier::decompress`](crate::corpus::CorpusVerifier::decompress).
    pub fn init_corpus_cache<F>(&self, decompress: F) -> LabResult<Signature>
    where
        F: FnOnce() -> LabResult<Signature>,
    {
        let root = self.layout.experiment_root();
        ensure_uninitialized(root)?;
        self.create_dir(root)?;

        let signature = decompress()?;
        let record = LockRecord::corpus(record_name(root), signature.clone());
        self.lock.publish(root, &record)?;

        info!("Initialized corpus cache ({})", signature.short());
        Ok(signature)
    }

    /// Re-produce the corpus under the corpus lock and record its new signature
    pub fn update_corpus_cache<F>(&self, decompress: F) -> LabResult<Signature>
    where
        F: FnOnce() -> LabResult<Signature>,
    {
        let root = self.layout.experiment_root();
        let signature = with_lock(&*self.lock, root, |corpus| {
            let signature = decompress()?;
            corpus.update_signature(signature.clone());
            Ok(signature)
        })?;

        info!("Updated corpus cache ({})", signature.short());
        Ok(signature)
    }

    // Sample stage

    /// Create sample `name` and publish its first record.
    ///
    /// `create_sample` receives the sample name, the configuration manifest
    /// listing the corpus files, and the sample directory. It must leave a
    /// `Manifest.txt` in the sample directory listing the sample's files.
    pub fn init_sample_cache<F>(&self, name: &str, create_sample: F) -> LabResult<Signature>
    where
        F: FnOnce(&str, &Path, &Path) -> LabResult<()>,
    {
        let sample_dir = self.layout.sample_dir(name)?;
        ensure_uninitialized(sample_dir)?;
        let config_manifest = self.layout.config_manifest_path();

        let signature = with_lock(&*self.lock, self.layout.experiment_root(), |corpus| {
            require_signed(corpus)?;
            self.create_dir(sample_dir)?;
            create_sample(name, &config_manifest, sample_dir)?;

            let signature = self.sign_sample(name)?;
            let record = LockRecord::sample(
                record_name(sample_dir),
                signature.clone(),
                corpus.own_signature().clone(),
            );
            self.lock.publish(sample_dir, &record)?;
            Ok(signature)
        })?;

        info!("Initialized sample '{}' ({})", name, signature.short());
        Ok(signature)
    }

    /// Re-create sample `name` against the current corpus
    pub fn update_sample_cache<F>(&self, name: &str, create_sample: F) -> LabResult<Signature>
    where
        F: FnOnce(&str, &Path, &Path) -> LabResult<()>,
    {
        let sample_dir = self.layout.sample_dir(name)?;
        let config_manifest = self.layout.config_manifest_path();

        let signature = with_lock(&*self.lock, self.layout.experiment_root(), |corpus| {
            require_signed(corpus)?;
            with_lock(&*self.lock, sample_dir, |sample| {
                create_sample(name, &config_manifest, sample_dir)?;
                let signature = self.sign_sample(name)?;
                sample.update_signature(signature.clone());
                sample.set_dependency(CORPUS_KEY, corpus.own_signature().clone());
                Ok(signature)
            })
        })?;

        info!("Updated sample '{}' ({})", name, signature.short());
        Ok(signature)
    }

    /// Check sample `name` against the corpus and re-sign its files
    pub fn verify_sample_cache(&self, name: &str) -> LabResult<()> {
        let sample_dir = self.layout.sample_dir(name)?;
        let manifest = self.layout.sample_manifest_path(name)?;

        with_lock(&*self.lock, self.layout.experiment_root(), |corpus| {
            with_lock(&*self.lock, sample_dir, |sample| {
                validate_sample(corpus, sample)?;
                check_contents(sample, self.sign_sample(name)?, &manifest)
            })
        })?;

        debug!("Sample '{}' is valid", name);
        Ok(())
    }

    // Config stage

    /// Write the manifest of corpus files that samples are filtered from
    pub fn write_config_manifest(&self, corpus_files: &[PathBuf]) -> LabResult<PathBuf> {
        let config_dir = self.layout.config_dir();
        self.create_dir(&config_dir)?;

        let path = self.layout.config_manifest_path();
        let content: String = corpus_files
            .iter()
            .map(|file| format!("{}\n", file.display()))
            .collect();
        self.write_file(&path, &content)?;

        debug!(
            "Wrote {} corpus files to {}",
            corpus_files.len(),
            path.display()
        );
        Ok(path)
    }

    /// Build the runtime configuration from `sample_name` and publish its
    /// first record.
    ///
    /// `configure` receives the configuration directory and the sample
    /// manifest.
    pub fn init_config_cache<F>(&self, sample_name: &str, configure: F) -> LabResult<Signature>
    where
        F: FnOnce(&Path, &Path) -> LabResult<()>,
    {
        let sample_dir = self.layout.sample_dir(sample_name)?;
        let sample_manifest = self.layout.sample_manifest_path(sample_name)?;
        let config_dir = self.layout.config_dir();
        ensure_uninitialized(&config_dir)?;

        let signature = with_lock(&*self.lock, sample_dir, |sample| {
            require_signed(sample)?;
            self.create_dir(&config_dir)?;
            configure(&config_dir, &sample_manifest)?;

            let signature = sign_files(&config_artifacts(&config_dir)?)?;
            let record = LockRecord::config(
                record_name(&config_dir),
                signature.clone(),
                sample.own_signature().clone(),
            );
            self.lock.publish(&config_dir, &record)?;
            Ok(signature)
        })?;

        info!(
            "Initialized configuration from sample '{}' ({})",
            sample_name,
            signature.short()
        );
        Ok(signature)
    }

    /// Rebuild the runtime configuration against the current sample
    pub fn update_config_cache<F>(&self, sample_name: &str, configure: F) -> LabResult<Signature>
    where
        F: FnOnce(&Path, &Path) -> LabResult<()>,
    {
        let sample_dir = self.layout.sample_dir(sample_name)?;
        let sample_manifest = self.layout.sample_manifest_path(sample_name)?;
        let config_dir = self.layout.config_dir();

        let signature = with_lock(&*self.lock, sample_dir, |sample| {
            require_signed(sample)?;
            with_lock(&*self.lock, &config_dir, |config| {
                configure(&config_dir, &sample_manifest)?;
                let signature = sign_files(&config_artifacts(&config_dir)?)?;
                config.update_signature(signature.clone());
                config.set_dependency(SAMPLE_KEY, sample.own_signature().clone());
                Ok(signature)
            })
        })?;

        info!(
            "Updated configuration from sample '{}' ({})",
            sample_name,
            signature.short()
        );
        Ok(signature)
    }

    /// Check the configuration against `sample_name` and re-sign its artifacts
    pub fn verify_config_cache(&self, sample_name: &str) -> LabResult<()> {
        let sample_dir = self.layout.sample_dir(sample_name)?;
        let config_dir = self.layout.config_dir();

        with_lock(&*self.lock, sample_dir, |sample| {
            with_lock(&*self.lock, &config_dir, |config| {
                validate_config(sample, config)?;
                let actual = sign_files(&config_artifacts(&config_dir)?)?;
                check_contents(config, actual, &config_dir)
            })
        })?;

        debug!("Configuration is valid for sample '{}'", sample_name);
        Ok(())
    }

    // Experiment stage

    /// Run the experiment and publish the first results record.
    ///
    /// `run` receives the results directory, with `verify_out` and
    /// `no_verify_out` already created, and returns the output files to sign.
    pub fn init_experiment_cache<F>(&self, sample_name: &str, run: F) -> LabResult<Signature>
    where
        F: FnOnce(&Path) -> LabResult<Vec<PathBuf>>,
    {
        let sample_dir = self.layout.sample_dir(sample_name)?;
        let config_dir = self.layout.config_dir();
        let results_dir = self.layout.results_dir();
        ensure_uninitialized(&results_dir)?;

        let signature = with_lock(&*self.lock, sample_dir, |sample| {
            with_lock(&*self.lock, &config_dir, |config| {
                validate_config(sample, config)?;
                self.create_output_dirs()?;

                let outputs = run(&results_dir)?;
                let signature = sign_files(&outputs)?;
                let record = LockRecord::experiment(
                    record_name(&results_dir),
                    signature.clone(),
                    sample.own_signature().clone(),
                    config.own_signature().clone(),
                );
                self.lock.publish(&results_dir, &record)?;
                Ok(signature)
            })
        })?;

        info!("Recorded experiment results ({})", signature.short());
        Ok(signature)
    }

    /// Check the published sample, configuration and results records.
    ///
    /// Takes no locks and changes nothing.
    pub fn verify_experiment_cache(&self, sample_name: &str) -> LabResult<()> {
        let sample = read_published(self.layout.sample_dir(sample_name)?)?;
        let config = read_published(&self.layout.config_dir())?;
        let experiment = read_published(&self.layout.results_dir())?;
        validate_experiment(&sample, &config, &experiment)
    }

    /// Check every stage whose record is published, without taking locks.
    ///
    /// The configuration and experiment are checked against `config_sample`,
    /// or the first sample by name when not given.
    pub fn verify_all(&self, config_sample: Option<&str>) -> Vec<StageReport> {
        let mut reports = Vec::new();

        let (mut corpus_report, corpus) = load(
            Stage::Corpus,
            "corpus".to_string(),
            self.layout.experiment_root(),
        );
        if let Some(record) = &corpus {
            if let Err(e) = require_signed(record) {
                corpus_report.fail(e);
            }
        }
        let corpus = corpus.filter(|_| corpus_report.is_valid());
        reports.push(corpus_report);

        let config_sample = config_sample.or_else(|| self.layout.sample_names().next());
        let mut upstream_sample = None;
        for (name, dir) in self.layout.samples() {
            let (mut report, sample) = load(Stage::Sample, format!("sample '{name}'"), dir);
            if let Some(sample) = &sample {
                report.check(corpus.as_ref(), |corpus| validate_sample(corpus, sample));
            }
            if Some(name) == config_sample && report.is_valid() {
                upstream_sample = sample;
            }
            reports.push(report);
        }

        let (mut config_report, config) = load(
            Stage::Config,
            "configuration".to_string(),
            &self.layout.config_dir(),
        );
        if let Some(config) = &config {
            config_report.check(upstream_sample.as_ref(), |sample| {
                validate_config(sample, config)
            });
        }
        let config = config.filter(|_| config_report.is_valid());
        reports.push(config_report);

        let (mut experiment_report, experiment) = load(
            Stage::Experiment,
            "results".to_string(),
            &self.layout.results_dir(),
        );
        if let Some(experiment) = &experiment {
            let upstream = upstream_sample.as_ref().zip(config.as_ref());
            experiment_report.check(upstream, |(sample, config)| {
                validate_experiment(sample, config, experiment)
            });
        }
        reports.push(experiment_report);

        reports
    }

    // Replay script

    /// Write the replay script for `sample_name` running `queries`
    pub fn write_replay_script(&self, sample_name: &str, queries: &[String]) -> LabResult<PathBuf> {
        let manifest = self.layout.sample_manifest_path(sample_name)?;
        let chunks = read_lines(&manifest)?;

        self.create_dir(&self.layout.config_dir())?;
        self.create_output_dirs()?;

        let script = script::render_script(
            &chunks,
            queries,
            &self.layout.verify_out_dir(),
            &self.layout.no_verify_out_dir(),
        );
        let path = self.layout.script_path();
        script::write_script(&self.ctx, &path, &script)?;

        info!(
            "Wrote replay script with {} chunks and {} queries to {}",
            chunks.len(),
            queries.len(),
            path.display()
        );
        Ok(path)
    }

    /// Fetch the query log, check its signature and write the replay script
    pub fn fetch_and_write_replay_script(
        &self,
        sample_name: &str,
        query_log_url: &str,
        query_log_signature: &Signature,
    ) -> LabResult<PathBuf> {
        // Fail on an unknown sample before going to the network
        self.layout.sample_dir(sample_name)?;
        let queries = script::fetch_query_log(query_log_url, query_log_signature)?;
        self.write_replay_script(sample_name, &queries)
    }

    // Helpers

    fn sign_sample(&self, name: &str) -> LabResult<Signature> {
        let manifest = self.layout.sample_manifest_path(name)?;
        let files: Vec<PathBuf> = read_lines(&manifest)?
            .into_iter()
            .map(PathBuf::from)
            .collect();
        sign_files(&files)
    }

    fn create_output_dirs(&self) -> LabResult<()> {
        self.create_dir(&self.layout.results_dir())?;
        self.create_dir(&self.layout.verify_out_dir())?;
        self.create_dir(&self.layout.no_verify_out_dir())
    }

    fn create_dir(&self, path: &Path) -> LabResult<()> {
        self.ctx
            .run(
                FsOperation::CreateDir {
                    path: path.to_path_buf(),
                },
                || fs::create_dir_all(path),
            )
            .map_err(|e| LabError::io(format!("creating directory {}", path.display()), e))
    }

    fn write_file(&self, path: &Path, content: &str) -> LabResult<()> {
        self.ctx
            .run(
                FsOperation::Write {
                    path: path.to_path_buf(),
                },
                || fs::write(path, content),
            )
            .map_err(|e| LabError::io(format!("writing {}", path.display()), e))
    }
}

fn record_name(directory: &Path) -> String {
    published_path(directory).display().to_string()
}

fn ensure_uninitialized(directory: &Path) -> LabResult<()> {
    match inspect(directory) {
        LockState::Uninitialized => Ok(()),
        _ => Err(LabError::AlreadyInitialized {
            path: directory.to_path_buf(),
        }),
    }
}

/// Dependents must never record an empty upstream signature
fn require_signed(record: &LockRecord) -> LabResult<()> {
    if record.own_signature().is_empty() {
        return Err(LabError::EmptySignature {
            name: record.name().to_string(),
            key: "signature".to_string(),
        });
    }
    Ok(())
}

/// Compare a record's own signature with a fresh signature of its contents
fn check_contents(record: &LockRecord, actual: Signature, source: &Path) -> LabResult<()> {
    if record.own_signature() != &actual {
        return Err(LabError::SignatureMismatch {
            name: record.name().to_string(),
            key: "signature".to_string(),
            upstream: source.display().to_string(),
            recorded: record.own_signature().clone(),
            actual,
        });
    }
    Ok(())
}

fn read_published(directory: &Path) -> LabResult<LockRecord> {
    let path = published_path(directory);
    if !path.exists() {
        return Err(LabError::SourceDoesNotExist { path });
    }
    LockRecord::read(&path)
}

/// Inspect and, when published, read a stage directory
fn load(stage: Stage, label: String, directory: &Path) -> (StageReport, Option<LockRecord>) {
    let state = inspect(directory);
    let mut report = StageReport::new(stage, label, directory.to_path_buf(), state);
    if state != LockState::Published {
        return (report, None);
    }
    match LockRecord::read(&published_path(directory))
        .and_then(|record| check_shape(stage, &record).map(|()| record))
    {
        Ok(record) => (report, Some(record)),
        Err(e) => {
            report.fail(e);
            (report, None)
        }
    }
}

fn read_lines(path: &Path) -> LabResult<Vec<String>> {
    let content = fs::read_to_string(path)
        .map_err(|e| LabError::io(format!("reading manifest {}", path.display()), e))?;
    Ok(script::non_empty_lines(&content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::ExclusiveCreateLock;
    use crate::lock::STAGING_LOCK_FILE_NAME;
    use crate::signature::sign_bytes;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        cache: StageCache,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_lock(|ctx| Box::new(HardLinkLock::new(ctx)))
        }

        fn with_lock(make_lock: impl FnOnce(ExecContext) -> Box<dyn StageLock>) -> Self {
            let dir = TempDir::new().unwrap();
            let ctx = ExecContext::test();
            let cache = StageCache::new(
                ctx.clone(),
                make_lock(ctx),
                dir.path().join("experiment"),
                dir.path().join("corpus"),
                &["small".to_string(), "large".to_string()],
            );
            fs::create_dir_all(dir.path().join("corpus")).unwrap();
            Self { dir, cache }
        }

        fn corpus_file(&self, name: &str) -> PathBuf {
            self.dir.path().join("corpus").join(name)
        }

        fn init_corpus(&self, content: &[u8]) -> Signature {
            self.cache
                .init_corpus_cache(|| Ok(sign_bytes(content)))
                .unwrap()
        }

        /// Sample op: copy two corpus documents into the sample and list them
        fn init_sample(&self, name: &str) -> Signature {
            let one = self.corpus_file("one");
            let two = self.corpus_file("two");
            fs::write(&one, b"one").unwrap();
            fs::write(&two, b"two").unwrap();
            self.cache
                .init_sample_cache(name, |_, _, sample_dir| write_manifest(sample_dir, &[one, two]))
                .unwrap()
        }

        fn init_config(&self, sample: &str) -> Signature {
            self.cache
                .init_config_cache(sample, |config_dir, _| write_artifacts(config_dir))
                .unwrap()
        }

        fn init_experiment(&self, sample: &str) -> Signature {
            self.cache
                .init_experiment_cache(sample, |results| {
                    let output = results.join("verify_out").join("summary.csv");
                    fs::write(&output, b"query,matches\n")
                        .map_err(|e| LabError::io("writing results", e))?;
                    Ok(vec![output])
                })
                .unwrap()
        }

        fn init_chain(&self) {
            self.init_corpus(b"corpus");
            self.init_sample("small");
            self.init_config("small");
            self.init_experiment("small");
        }
    }

    fn write_manifest(sample_dir: &Path, files: &[PathBuf]) -> LabResult<()> {
        let content: String = files
            .iter()
            .map(|f| format!("{}\n", f.display()))
            .collect();
        fs::write(sample_dir.join("Manifest.txt"), content)
            .map_err(|e| LabError::io("writing manifest", e))
    }

    fn write_artifacts(config_dir: &Path) -> LabResult<()> {
        for name in [
            "CumulativeTermCounts-0.csv",
            "DocFreqTable-0.csv",
            "IndexedIdfTable-0.bin",
            "TermTable-0.bin",
            "DocumentLengthHistogram.csv",
            "TermToText.bin",
        ] {
            fs::write(config_dir.join(name), name).map_err(|e| LabError::io("writing artifact", e))?;
        }
        Ok(())
    }

    #[test]
    fn chain_verifies() {
        let fixture = Fixture::new();
        fixture.init_chain();

        let cache = &fixture.cache;
        cache.verify_sample_cache("small").unwrap();
        cache.verify_config_cache("small").unwrap();
        cache.verify_experiment_cache("small").unwrap();

        let reports = cache.verify_all(Some("small"));
        assert_eq!(reports.len(), 5);
        assert!(reports[0].is_valid());
        // "large" was never initialized
        assert!(matches!(reports[1].verdict, Verdict::Skipped(_)));
        assert_eq!(reports[1].state, LockState::Uninitialized);
        assert!(reports[2].is_valid(), "{:?}", reports[2]);
        assert!(reports[3].is_valid(), "{:?}", reports[3]);
        assert!(reports[4].is_valid(), "{:?}", reports[4]);
    }

    #[test]
    fn chain_verifies_with_exclusive_create_lock() {
        let fixture = Fixture::with_lock(|ctx| Box::new(ExclusiveCreateLock::new(ctx)));
        fixture.init_chain();
        fixture.cache.verify_sample_cache("small").unwrap();
        fixture.cache.verify_config_cache("small").unwrap();
        assert!(fixture
            .cache
            .verify_all(Some("small"))
            .iter()
            .all(|r| !r.is_invalid()));
    }

    #[test]
    fn sample_signature_covers_manifest_files() {
        let fixture = Fixture::new();
        fixture.init_corpus(b"corpus");
        assert_eq!(fixture.init_sample("small"), sign_bytes(b"onetwo"));

        let sample_dir = fixture.cache.layout().sample_dir("small").unwrap();
        let record = LockRecord::read(&published_path(sample_dir)).unwrap();
        assert_eq!(record.dependency(CORPUS_KEY), Some(&sign_bytes(b"corpus")));
        assert_eq!(inspect(fixture.cache.layout().experiment_root()), LockState::Published);
    }

    #[test]
    fn init_twice_fails() {
        let fixture = Fixture::new();
        fixture.init_corpus(b"corpus");
        let err = fixture
            .cache
            .init_corpus_cache(|| panic!("must not run"))
            .unwrap_err();
        assert!(matches!(err, LabError::AlreadyInitialized { .. }));
    }

    #[test]
    fn corpus_update_makes_sample_stale() {
        let fixture = Fixture::new();
        fixture.init_corpus(b"corpus");
        fixture.init_sample("small");

        fixture
            .cache
            .update_corpus_cache(|| Ok(sign_bytes(b"new corpus")))
            .unwrap();

        let err = fixture.cache.verify_sample_cache("small").unwrap_err();
        assert!(err.is_stale_cache());
        // Both locks were put back
        assert_eq!(inspect(fixture.cache.layout().experiment_root()), LockState::Published);
        let sample_dir = fixture.cache.layout().sample_dir("small").unwrap();
        assert_eq!(inspect(sample_dir), LockState::Published);

        let reports = fixture.cache.verify_all(Some("small"));
        assert!(reports[2].is_invalid());

        // Regenerating the sample fixes it
        let one = fixture.corpus_file("one");
        fixture
            .cache
            .update_sample_cache("small", |_, _, dir| write_manifest(dir, &[one]))
            .unwrap();
        fixture.cache.verify_sample_cache("small").unwrap();
    }

    #[test]
    fn changed_sample_file_is_detected() {
        let fixture = Fixture::new();
        fixture.init_corpus(b"corpus");
        fixture.init_sample("small");

        fs::write(fixture.corpus_file("two"), b"TWO").unwrap();

        let err = fixture.cache.verify_sample_cache("small").unwrap_err();
        assert!(matches!(err, LabError::SignatureMismatch { ref key, .. } if key == "signature"));
    }

    #[test]
    fn failed_update_keeps_record() {
        let fixture = Fixture::new();
        let original = fixture.init_corpus(b"corpus");

        let err = fixture
            .cache
            .update_corpus_cache(|| Err(LabError::Internal("decompress failed".to_string())))
            .unwrap_err();
        assert!(matches!(err, LabError::Internal(_)));

        let root = fixture.cache.layout().experiment_root();
        assert_eq!(inspect(root), LockState::Published);
        assert_eq!(
            LockRecord::read(&published_path(root)).unwrap().own_signature(),
            &original
        );
    }

    #[test]
    fn failed_sample_update_keeps_record() {
        let fixture = Fixture::new();
        fixture.init_corpus(b"corpus");
        let original = fixture.init_sample("small");
        let sample_dir = fixture.cache.layout().sample_dir("small").unwrap();
        let before = fs::read(published_path(sample_dir)).unwrap();

        // The new manifest names a file that does not exist, so signing fails
        let missing = fixture.corpus_file("missing");
        let err = fixture
            .cache
            .update_sample_cache("small", |_, _, dir| write_manifest(dir, &[missing]))
            .unwrap_err();
        assert!(matches!(err, LabError::Io { .. }), "{err}");

        assert_eq!(inspect(sample_dir), LockState::Published);
        assert_eq!(fs::read(published_path(sample_dir)).unwrap(), before);
        let record = LockRecord::read(&published_path(sample_dir)).unwrap();
        assert_eq!(record.own_signature(), &original);
        assert_eq!(
            inspect(fixture.cache.layout().experiment_root()),
            LockState::Published
        );
    }

    #[test]
    fn verify_all_flags_interrupted_stages() {
        let fixture = Fixture::new();
        fixture.init_chain();

        // A crashed run leaves only the staging copy of the corpus record
        let root = fixture.cache.layout().experiment_root();
        fs::rename(published_path(root), root.join(STAGING_LOCK_FILE_NAME)).unwrap();

        let reports = fixture.cache.verify_all(Some("small"));
        assert_eq!(reports[0].state, LockState::InTransit);
        assert!(matches!(
            reports[0].verdict,
            Verdict::Invalid(LabError::DestinationExists { .. })
        ));
        assert!(reports.iter().all(|r| !r.is_valid()));

        // Both files present on the configuration stage
        fs::rename(root.join(STAGING_LOCK_FILE_NAME), published_path(root)).unwrap();
        let config_dir = fixture.cache.layout().config_dir();
        fs::copy(
            published_path(&config_dir),
            config_dir.join(STAGING_LOCK_FILE_NAME),
        )
        .unwrap();

        let reports = fixture.cache.verify_all(Some("small"));
        assert!(reports[0].is_valid());
        assert!(matches!(
            reports[3].verdict,
            Verdict::Invalid(LabError::CouldNotRemoveSource { .. })
        ));
        assert!(!reports[4].is_valid());
    }

    #[test]
    fn missing_artifacts_leave_config_uninitialized() {
        let fixture = Fixture::new();
        fixture.init_corpus(b"corpus");
        fixture.init_sample("small");

        let err = fixture
            .cache
            .init_config_cache("small", |config_dir, _| {
                fs::write(config_dir.join("TermToText.bin"), b"x")
                    .map_err(|e| LabError::io("writing artifact", e))
            })
            .unwrap_err();

        assert!(matches!(err, LabError::ConfigArtifactsMissing { .. }));
        assert_eq!(inspect(&fixture.cache.layout().config_dir()), LockState::Uninitialized);
        let sample_dir = fixture.cache.layout().sample_dir("small").unwrap();
        assert_eq!(inspect(sample_dir), LockState::Published);
    }

    #[test]
    fn config_update_tracks_sample() {
        let fixture = Fixture::new();
        fixture.init_corpus(b"corpus");
        fixture.init_sample("small");
        fixture.init_config("small");

        let one = fixture.corpus_file("one");
        fixture
            .cache
            .update_sample_cache("small", |_, _, dir| write_manifest(dir, &[one]))
            .unwrap();
        assert!(fixture.cache.verify_config_cache("small").is_err());

        fixture
            .cache
            .update_config_cache("small", |config_dir, _| write_artifacts(config_dir))
            .unwrap();
        fixture.cache.verify_config_cache("small").unwrap();
    }

    #[test]
    fn unknown_sample_is_rejected() {
        let fixture = Fixture::new();
        fixture.init_corpus(b"corpus");
        let err = fixture
            .cache
            .init_sample_cache("medium", |_, _, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, LabError::UnknownSample(_)));
    }

    #[test]
    fn contended_corpus_blocks_sample_init() {
        let fixture = Fixture::new();
        fixture.init_corpus(b"corpus");
        let root = fixture.cache.layout().experiment_root();
        // Another holder's staging copy next to the published record
        fs::copy(published_path(root), root.join(STAGING_LOCK_FILE_NAME)).unwrap();

        let err = fixture
            .cache
            .init_sample_cache("small", |_, _, _| panic!("must not run"))
            .unwrap_err();
        assert!(matches!(err, LabError::DestinationExists { .. }));
        assert!(err.requires_operator());
    }

    #[test]
    fn experiment_requires_consistent_config() {
        let fixture = Fixture::new();
        fixture.init_corpus(b"corpus");
        fixture.init_sample("small");
        fixture.init_config("small");

        let one = fixture.corpus_file("one");
        fixture
            .cache
            .update_sample_cache("small", |_, _, dir| write_manifest(dir, &[one]))
            .unwrap();

        let err = fixture
            .cache
            .init_experiment_cache("small", |_| panic!("must not run"))
            .unwrap_err();
        assert!(err.is_stale_cache());
        assert_eq!(inspect(&fixture.cache.layout().results_dir()), LockState::Uninitialized);
    }

    #[test]
    fn verify_all_rejects_misshapen_record() {
        let fixture = Fixture::new();
        fixture.init_corpus(b"corpus");
        let root = fixture.cache.layout().experiment_root();
        let foreign = LockRecord::sample("sample", sign_bytes(b"s"), sign_bytes(b"c"));
        fs::write(published_path(root), foreign.to_yaml().unwrap()).unwrap();

        let reports = fixture.cache.verify_all(None);
        assert!(matches!(
            reports[0].verdict,
            Verdict::Invalid(LabError::WrongDependencyCount { .. })
        ));
    }

    #[test]
    fn verify_all_on_empty_directory() {
        let fixture = Fixture::new();
        let reports = fixture.cache.verify_all(None);
        assert_eq!(reports.len(), 5);
        assert!(reports
            .iter()
            .all(|r| r.state == LockState::Uninitialized && matches!(r.verdict, Verdict::Skipped(_))));
    }

    #[test]
    fn config_manifest_lists_files() {
        let fixture = Fixture::new();
        let files = vec![PathBuf::from("/c/a"), PathBuf::from("/c/b")];
        let path = fixture.cache.write_config_manifest(&files).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "/c/a\n/c/b\n");
    }

    #[test]
    fn replay_script_uses_sample_manifest() {
        let fixture = Fixture::new();
        fixture.init_corpus(b"corpus");
        fixture.init_sample("small");

        let path = fixture
            .cache
            .write_replay_script("small", &["dogs".to_string()])
            .unwrap();
        let script = fs::read_to_string(path).unwrap();
        let layout = fixture.cache.layout();

        assert!(script.starts_with(&format!("cache chunk {}\n", fixture.corpus_file("one").display())));
        assert!(script.contains(&format!("cd {}\nverify one dogs\nanalyze\n", layout.verify_out_dir().display())));
        assert!(script.ends_with(&format!(
            "cd {}\nquery one dogs\nanalyze\n",
            layout.no_verify_out_dir().display()
        )));
        assert!(layout.no_verify_out_dir().is_dir());
    }

    #[test]
    fn simulated_init_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let experiment = dir.path().join("experiment");
        fs::create_dir_all(&experiment).unwrap();
        let ctx = ExecContext::simulate();
        let cache = StageCache::with_hard_links(ctx.clone(), &experiment, dir.path(), &[]);

        let signature = cache.init_corpus_cache(|| Ok(sign_bytes(b"corpus"))).unwrap();

        assert_eq!(signature, sign_bytes(b"corpus"));
        assert_eq!(inspect(&experiment), LockState::Uninitialized);
        assert!(ctx
            .operations()
            .iter()
            .any(|op| matches!(op, FsOperation::Link { .. })));
    }
}

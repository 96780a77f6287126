//! Integration tests for labstage

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn labstage() -> Command {
        cargo_bin_cmd!("labstage")
    }

    #[test]
    fn help_displays() {
        labstage()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("content-addressed experiment cache"));
    }

    #[test]
    fn version_displays() {
        labstage()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("labstage"));
    }

    #[test]
    fn sign_prints_sha512() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("abc.txt");
        fs::write(&file, b"abc").unwrap();

        labstage()
            .arg("sign")
            .arg(&file)
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
                 2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f",
            ))
            .stdout(predicate::str::contains("(cumulative)").not());
    }

    #[test]
    fn sign_several_files_adds_cumulative_line() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, b"one").unwrap();
        fs::write(&b, b"two").unwrap();

        labstage()
            .arg("sign")
            .arg(&a)
            .arg(&b)
            .assert()
            .success()
            .stdout(predicate::str::contains("(cumulative)"));
    }

    #[test]
    fn sign_missing_file_fails() {
        labstage()
            .args(["sign", "/nonexistent/labstage/file"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn sign_requires_a_file() {
        labstage().arg("sign").assert().failure();
    }

    #[test]
    fn status_of_fresh_directory() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");

        labstage()
            .arg("--config")
            .arg(&config)
            .args(["status", "--format", "plain"])
            .arg(temp.path())
            .assert()
            .success()
            .stdout(predicate::str::starts_with("uninitialized\t"));
    }

    #[test]
    fn status_reports_in_transit() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        fs::write(temp.path().join(".LOCKFILE"), "signature: ab\n").unwrap();

        labstage()
            .arg("--config")
            .arg(&config)
            .args(["status", "--format", "json"])
            .arg(temp.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("\"in_transit\""));
    }

    #[test]
    fn config_path_follows_flag() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("custom.toml");

        labstage()
            .arg("--config")
            .arg(&config)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("custom.toml"));
    }

    #[test]
    fn config_init_then_show() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");

        labstage()
            .arg("--config")
            .arg(&config)
            .args(["config", "init"])
            .assert()
            .success();
        assert!(config.exists());

        labstage()
            .arg("--config")
            .arg(&config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[paths]"));
    }

    #[test]
    fn broken_config_is_reported() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        fs::write(&config, "[general]\nmode = \"sometimes\"\n").unwrap();

        labstage()
            .arg("--config")
            .arg(&config)
            .arg("verify")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));

        // Path lookup does not need a valid file
        labstage()
            .arg("--config")
            .arg(&config)
            .args(["config", "path"])
            .assert()
            .success();
    }

    #[test]
    fn decompress_without_archives_fails() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        fs::write(&config, "").unwrap();

        labstage()
            .arg("--config")
            .arg(&config)
            .arg("decompress")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No corpus archives configured"));
    }
}

mod workflow_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use flate2::{write::GzEncoder, Compression};
    use labstage::signature::{sign_bytes, Signature};
    use predicates::prelude::*;
    use std::fs;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct Experiment {
        _temp: TempDir,
        config: PathBuf,
        experiment_root: PathBuf,
        corpus_root: PathBuf,
    }

    impl Experiment {
        /// Corpus root with one archive; `expected` overrides its signature
        fn new(expected: Option<Signature>) -> Self {
            let temp = TempDir::new().unwrap();
            let experiment_root = temp.path().join("experiment");
            let corpus_root = temp.path().join("corpus");
            fs::create_dir_all(&corpus_root).unwrap();

            let archive = tar_gz(&[("chunk/doc-1", b"first"), ("chunk/doc-2", b"second")]);
            fs::write(corpus_root.join("chunk.tar.gz"), &archive).unwrap();
            let signature = expected.unwrap_or_else(|| sign_bytes(&archive));

            let config = temp.path().join("config.toml");
            fs::write(
                &config,
                format!(
                    "[paths]\nexperiment_root = {:?}\ncorpus_root = {:?}\n\n\
                     [[corpus.archives]]\nname = \"chunk.tar.gz\"\nsignature = \"{}\"\n",
                    experiment_root.display().to_string(),
                    corpus_root.display().to_string(),
                    signature
                ),
            )
            .unwrap();

            Self {
                _temp: temp,
                config,
                experiment_root,
                corpus_root,
            }
        }

        fn run(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("labstage");
            cmd.arg("--config").arg(&self.config);
            cmd
        }
    }

    fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append_data(&mut header, path, *contents).unwrap();
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&builder.into_inner().unwrap()).unwrap();
        encoder.finish().unwrap()
    }

    fn lock_file(dir: &Path) -> PathBuf {
        dir.join("LOCKFILE")
    }

    #[test]
    fn decompress_list_verify() {
        let experiment = Experiment::new(None);

        experiment
            .run()
            .arg("decompress")
            .assert()
            .success()
            .stdout(predicate::str::contains("2 corpus files"));

        assert!(lock_file(&experiment.experiment_root).exists());
        assert_eq!(
            fs::read(experiment.corpus_root.join("chunk").join("doc-1")).unwrap(),
            b"first"
        );
        let manifest = fs::read_to_string(
            experiment
                .experiment_root
                .join("configuration")
                .join("config_manifest.txt"),
        )
        .unwrap();
        assert_eq!(manifest.lines().count(), 2);

        experiment
            .run()
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("doc-1").and(predicate::str::contains("doc-2")));

        experiment
            .run()
            .args(["verify", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("valid\tcorpus"));

        // Second run updates the published record in place
        experiment.run().arg("decompress").assert().success();
        assert!(lock_file(&experiment.experiment_root).exists());
        assert!(!experiment.experiment_root.join(".LOCKFILE").exists());
    }

    #[test]
    fn verify_fails_after_interrupted_run() {
        let experiment = Experiment::new(None);
        experiment.run().arg("decompress").assert().success();

        // Only the staging copy is left, as after a crash mid-update
        let root = &experiment.experiment_root;
        fs::rename(lock_file(root), root.join(".LOCKFILE")).unwrap();

        experiment
            .run()
            .args(["verify", "--format", "plain"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("invalid\tcorpus"))
            .stderr(predicate::str::contains("failed verification"));
    }

    #[test]
    fn wrong_archive_signature_fails() {
        let experiment = Experiment::new(Some(sign_bytes(b"some other archive")));

        experiment
            .run()
            .arg("decompress")
            .assert()
            .failure()
            .stderr(predicate::str::contains("experiment definition"));

        assert!(!lock_file(&experiment.experiment_root).exists());
        assert!(!experiment.corpus_root.join("chunk").exists());
    }

    #[test]
    fn dry_run_changes_nothing() {
        let experiment = Experiment::new(None);
        fs::create_dir_all(&experiment.experiment_root).unwrap();

        experiment
            .run()
            .args(["--dry-run", "decompress"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Dry run"));

        assert!(!lock_file(&experiment.experiment_root).exists());
        assert!(!experiment.corpus_root.join("chunk").exists());
    }

    #[test]
    fn list_before_decompress_fails() {
        let experiment = Experiment::new(None);

        experiment
            .run()
            .arg("list")
            .assert()
            .failure()
            .stderr(predicate::str::contains("has not been decompressed"));
    }

    #[test]
    fn verify_fresh_experiment_skips_everything() {
        let experiment = Experiment::new(None);

        experiment
            .run()
            .args(["verify", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("skipped\tcorpus"));
    }
}

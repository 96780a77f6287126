//! Corpus verification and decompression
//!
//! A corpus arrives as a list of `.tar.gz` archives sitting at the top of the
//! corpus root. Each archive is hashed before it is extracted and must match
//! the signature the experiment expects. The same pass accumulates a signature
//! for the whole corpus, which becomes the corpus stage's own signature.
//!
//! After decompression the corpus root contains the original archives as
//! top-level files and the extracted data in top-level directories. Only the
//! latter count as corpus files.

pub mod extract;

pub use extract::{Extractor, TarGzExtractor};

use crate::context::{ExecContext, FsOperation};
use crate::error::{LabError, LabResult};
use crate::signature::{Accumulator, Signature};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Suffix every corpus archive must carry
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// A compressed shard of the corpus and its expected signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveFile {
    /// File name relative to the corpus root
    pub name: String,
    /// Expected SHA-512 of the archive bytes
    #[serde(alias = "file-signature")]
    pub signature: Signature,
}

impl ArchiveFile {
    pub fn new(name: impl Into<String>, signature: Signature) -> Self {
        Self {
            name: name.into(),
            signature,
        }
    }
}

/// Verifies and decompresses one corpus directory
pub struct CorpusVerifier<E: Extractor = TarGzExtractor> {
    ctx: ExecContext,
    corpus_root: PathBuf,
    extractor: E,
    decompressed: bool,
}

impl CorpusVerifier<TarGzExtractor> {
    /// Verifier that extracts with the built-in tar.gz extractor
    pub fn with_tar_gz(ctx: ExecContext, corpus_root: impl Into<PathBuf>) -> Self {
        Self::new(ctx, corpus_root, TarGzExtractor)
    }
}

impl<E: Extractor> CorpusVerifier<E> {
    pub fn new(ctx: ExecContext, corpus_root: impl Into<PathBuf>, extractor: E) -> Self {
        Self {
            ctx,
            corpus_root: corpus_root.into(),
            extractor,
            decompressed: false,
        }
    }

    pub fn corpus_root(&self) -> &Path {
        &self.corpus_root
    }

    pub fn is_decompressed(&self) -> bool {
        self.decompressed
    }

    /// Verify and extract `archives` in order, returning the corpus signature.
    ///
    /// Stops at the first archive that is missing, unreadable or does not
    /// match its expected signature. Archives before it stay extracted.
    pub fn decompress(&mut self, archives: &[ArchiveFile]) -> LabResult<Signature> {
        if self.decompressed {
            return Err(LabError::AlreadyDecompressed(self.corpus_root.clone()));
        }

        for archive in archives {
            if !archive.name.ends_with(ARCHIVE_SUFFIX) {
                return Err(LabError::ArchiveFormat(self.corpus_root.join(&archive.name)));
            }
        }

        let mut accumulator = Accumulator::new();
        for archive in archives {
            let path = self.corpus_root.join(&archive.name);
            let data = read_archive(&path)?;

            let actual = accumulator.add(&data);
            if actual != archive.signature {
                return Err(LabError::ArchiveSignatureMismatch {
                    path,
                    expected: archive.signature.clone(),
                    actual,
                });
            }
            debug!("Verified {} ({})", archive.name, actual.short());

            let extractor = &self.extractor;
            let corpus_root = &self.corpus_root;
            self.ctx
                .run(
                    FsOperation::Extract {
                        archive: path.clone(),
                        into: corpus_root.clone(),
                    },
                    || extractor.extract(&data, corpus_root),
                )
                .map_err(|e| LabError::Extract {
                    path: path.clone(),
                    source: e,
                })?;
        }

        let signature = accumulator.finalize()?;
        self.decompressed = true;
        info!(
            "Decompressed {} archive(s) into {} ({})",
            archives.len(),
            self.corpus_root.display(),
            signature.short()
        );
        Ok(signature)
    }

    /// Every file inside the top-level directories of the corpus root, sorted.
    ///
    /// Top-level files are the archives themselves and are skipped.
    pub fn list_corpus_files(&self) -> LabResult<Vec<PathBuf>> {
        if !self.decompressed {
            return Err(LabError::NotDecompressed(self.corpus_root.clone()));
        }
        list_files_under_directories(&self.corpus_root)
    }
}

fn read_archive(path: &Path) -> LabResult<Vec<u8>> {
    fs::read(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            LabError::ArchiveMissing(path.to_path_buf())
        } else {
            LabError::ArchiveRead {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })
}

/// Collect non-directory entries beneath each top-level directory of `root`
pub fn list_files_under_directories(root: &Path) -> LabResult<Vec<PathBuf>> {
    let entries = fs::read_dir(root)
        .map_err(|e| LabError::io(format!("reading corpus root {}", root.display()), e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| LabError::io(format!("reading entry in {}", root.display()), e))?;
        let is_dir = entry
            .file_type()
            .map_err(|e| LabError::io(format!("inspecting {}", entry.path().display()), e))?
            .is_dir();
        if !is_dir {
            continue;
        }

        for item in WalkDir::new(entry.path()) {
            let item = item.map_err(|e| {
                let path = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                LabError::io(
                    format!("walking corpus directory {}", path),
                    std::io::Error::other(e),
                )
            })?;
            if !item.file_type().is_dir() {
                files.push(item.into_path());
            }
        }
    }

    files.sort();
    debug!("Found {} corpus files under {}", files.len(), root.display());
    Ok(files)
}

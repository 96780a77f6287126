//! Archive extraction backends

use flate2::read::GzDecoder;
use std::path::Path;

/// Unpacks verified archive bytes into a directory
pub trait Extractor {
    fn extract(&self, data: &[u8], destination: &Path) -> std::io::Result<()>;
}

/// Extracts gzip-compressed tarballs in-process
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzExtractor;

impl Extractor for TarGzExtractor {
    fn extract(&self, data: &[u8], destination: &Path) -> std::io::Result<()> {
        let decoder = GzDecoder::new(data);
        let mut archive = tar::Archive::new(decoder);
        archive.set_preserve_permissions(false);
        archive.unpack(destination)
    }
}

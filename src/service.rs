//! Request handlers built once from explicit configuration

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::bundle;
use crate::codec::HeifDecoder;
use crate::config::ServiceConfig;
use crate::container::UploadedFile;
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{Error, Result};

/// Stateless embed/extract entry points.
///
/// Holds only immutable configuration, so one instance can serve any number
/// of independent requests.
pub struct Service {
    config: ServiceConfig,
    encoder: Encoder,
    decoder: Decoder,
}

impl Service {
    pub fn new(config: ServiceConfig) -> Self {
        let encoder = Encoder::with_config(config.embed.clone());
        let decoder = Decoder::new().with_mode(config.decode_mode);
        Self {
            config,
            encoder,
            decoder,
        }
    }

    pub fn with_heif_decoder(mut self, decoder: Arc<dyn HeifDecoder>) -> Self {
        self.encoder = self.encoder.with_heif_decoder(decoder);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Embed `files` and return the container text
    pub fn embed(&self, files: &[UploadedFile], output_name: &str) -> Result<String> {
        if output_name.trim().is_empty() {
            return Err(Error::Validation("output file name is required".to_string()));
        }
        Ok(self.encoder.encode(files, output_name)?.render())
    }

    /// Embed `files` and persist the container as `{output_name}.txt` inside `dir`
    pub fn embed_to_dir(&self, files: &[UploadedFile], output_name: &str, dir: &Path) -> Result<PathBuf> {
        if output_name.trim().is_empty() {
            return Err(Error::Validation("output file name is required".to_string()));
        }
        let container = self.encoder.encode(files, output_name)?;
        fs::create_dir_all(dir)?;
        let path = dir.join(container.file_name());
        fs::write(&path, container.render())?;
        info!(path = %path.display(), "container written");
        Ok(path)
    }

    /// Extract every image from container bytes into zip archive bytes
    pub fn extract(&self, container: &[u8]) -> Result<Vec<u8>> {
        let files = self.decoder.decode_bytes(container)?;
        let archive = bundle::bundle(&files, self.config.work_root.as_deref())?;
        info!(files = files.len(), size = archive.len(), "images extracted");
        Ok(archive)
    }
}

impl Default for Service {
    fn default() -> Self {
        Self::new(ServiceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::{heic_bytes, png_bytes};
    use crate::error::ErrorKind;

    #[test]
    fn test_embed_requires_output_name() {
        let err = Service::default().embed(&[], "  ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadInput);
    }

    #[test]
    fn test_embed_to_dir_writes_named_container() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![UploadedFile::new("a.heic", "image/heic", heic_bytes())];

        let path = Service::default().embed_to_dir(&files, "trip", dir.path()).unwrap();
        assert_eq!(path, dir.path().join("trip.txt"));
        assert!(fs::read_to_string(&path).unwrap().starts_with("Filename: trip\n\n"));
    }

    #[test]
    fn test_failed_embed_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![UploadedFile::new("bad.png", "image/png", b"nope".to_vec())];

        assert!(Service::default().embed_to_dir(&files, "trip", dir.path()).is_err());
        assert!(!dir.path().join("trip.txt").exists());
    }

    #[test]
    fn test_extract_uses_configured_work_root() {
        let root = tempfile::tempdir().unwrap();
        let service = Service::new(ServiceConfig {
            work_root: Some(root.path().to_path_buf()),
            ..ServiceConfig::default()
        });
        let text = service
            .embed(&[UploadedFile::new("a.png", "image/png", png_bytes(3, 3))], "x")
            .unwrap();

        let archive = service.extract(text.as_bytes()).unwrap();
        assert!(!archive.is_empty());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_extract_rejects_non_utf8() {
        let err = Service::default().extract(&[0xC3, 0x28]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadInput);
    }
}

//! Extracted Image Storage
//!
//! Persists decoded figures under deterministic names so a record's path
//! can be served later. Extraction writes each figure to a unique staging
//! file; it only replaces the file at its final name once the batch has
//! committed. A batch that fails removes its staging files and leaves the
//! files of earlier records alone.

use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use ulid::Ulid;

/// Subdirectory of the image root holding uncommitted files
pub const STAGING_DIR: &str = ".staging";

#[derive(Error, Debug)]
pub enum ImageStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid document name: {0}")]
    InvalidName(String),
}

impl Serialize for ImageStoreError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Image written under a staging name, waiting to be promoted to `target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    pub staging: PathBuf,
    pub target: PathBuf,
}

/// Directory-backed store for extracted images
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{document}_p{page}_img{index}.{ext}`
    pub fn file_name(document: &str, page: u32, index: u32, ext: &str) -> Result<String, ImageStoreError> {
        let base = Path::new(document)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty() && n != "..")
            .ok_or_else(|| ImageStoreError::InvalidName(document.to_string()))?;
        Ok(format!("{}_p{}_img{}.{}", base, page, index, ext))
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Write image bytes to a fresh staging file. Nothing at the final
    /// name is touched until [`ImageStore::promote`].
    pub fn stage(
        &self,
        document: &str,
        page: u32,
        index: u32,
        ext: &str,
        bytes: &[u8],
    ) -> Result<StagedImage, ImageStoreError> {
        let name = Self::file_name(document, page, index, ext)?;
        let staging_dir = self.staging_dir();
        fs::create_dir_all(&staging_dir)?;

        let staging = staging_dir.join(format!("{}_{}", Ulid::new(), name));
        fs::write(&staging, bytes)?;
        debug!(path = %staging.display(), bytes = bytes.len(), "Staged extracted image");
        Ok(StagedImage {
            staging,
            target: self.root.join(name),
        })
    }

    /// Move staged files to their final names.
    pub fn promote(&self, images: &[StagedImage]) -> Result<(), ImageStoreError> {
        for image in images {
            fs::rename(&image.staging, &image.target)?;
            debug!(path = %image.target.display(), "Stored extracted image");
        }
        Ok(())
    }

    /// Best-effort removal of staging files from an abandoned batch.
    /// Files already promoted are not touched.
    pub fn discard(&self, images: &[StagedImage]) {
        for image in images {
            match fs::remove_file(&image.staging) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %image.staging.display(), error = %e, "Failed to remove staged image")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_format() {
        assert_eq!(
            ImageStore::file_name("notes.pdf", 3, 2, "png").unwrap(),
            "notes.pdf_p3_img2.png"
        );
    }

    #[test]
    fn test_file_name_strips_directories() {
        assert_eq!(
            ImageStore::file_name("../../etc/notes.pdf", 1, 1, "jpeg").unwrap(),
            "notes.pdf_p1_img1.jpeg"
        );
        assert!(ImageStore::file_name("..", 1, 1, "png").is_err());
    }

    #[test]
    fn test_stage_then_promote() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("images"));

        let staged = store.stage("a.pdf", 1, 1, "png", b"data").unwrap();
        assert_eq!(staged.target, dir.path().join("images").join("a.pdf_p1_img1.png"));
        assert!(!staged.target.exists());
        assert_eq!(fs::read(&staged.staging).unwrap(), b"data");

        store.promote(&[staged.clone()]).unwrap();
        assert_eq!(fs::read(&staged.target).unwrap(), b"data");
        assert!(!staged.staging.exists());
    }

    #[test]
    fn test_discard_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());

        let first = store.stage("a.pdf", 1, 1, "png", b"old").unwrap();
        store.promote(&[first.clone()]).unwrap();

        let second = store.stage("a.pdf", 1, 1, "png", b"new").unwrap();
        assert_ne!(first.staging, second.staging);
        assert_eq!(second.target, first.target);

        store.discard(&[second.clone()]);
        assert!(!second.staging.exists());
        assert_eq!(fs::read(&first.target).unwrap(), b"old");

        // promoted files are left alone
        store.discard(&[first.clone()]);
        assert!(first.target.exists());
    }
}

//! On-disk package storage.
//!
//! Uploads stream into `upload-<uuid>.part` inside the package directory and
//! are renamed to their generated storage name only once complete, so a
//! listing of the directory never shows half-written packages.
use chrono::Utc;
use rand::Rng;
use std::{io, path::{Path, PathBuf}};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;
use crate::config::ServerConfig;

pub const PACKAGE_EXTENSION: &str = ".zip";
const ZIP_SIGNATURES: [[u8; 4]; 3] = [*b"PK\x03\x04", *b"PK\x05\x06", *b"PK\x07\x08"];
const MAX_ORIGINAL_NAME_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("only {PACKAGE_EXTENSION} files are accepted")]
    InvalidExtension,
    #[error("file content is not a ZIP archive")]
    NotZip,
    #[error("package exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Suffix check on the client supplied name, case-insensitive.
pub fn check_file_name(name: &str) -> Result<(), PackageError> {
    if name.to_ascii_lowercase().ends_with(PACKAGE_EXTENSION) && name.len() > PACKAGE_EXTENSION.len() { Ok(()) } else { Err(PackageError::InvalidExtension) }
}

fn sanitize_original(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let skip = cleaned.chars().count().saturating_sub(MAX_ORIGINAL_NAME_CHARS);
    let tail: String = cleaned.chars().skip(skip).collect();
    if tail.is_empty() { "package.zip".into() } else { tail }
}

/// `<unix millis>-<9 random digits>-<sanitized original name>`
pub fn storage_name(original: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{}-{:09}-{}", Utc::now().timestamp_millis(), suffix, sanitize_original(original))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPackage { pub file_name: String, pub size: u64 }

#[derive(Debug)]
pub struct OpenPackage { pub file: fs::File, pub size: u64 }

#[derive(Debug, Clone)]
pub struct PackageStore { dir: PathBuf, max_bytes: u64, verify_magic: bool }

impl PackageStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64, verify_magic: bool) -> Self {
        Self { dir: dir.into(), max_bytes, verify_magic }
    }

    pub fn from_config(cfg: &ServerConfig) -> Self { Self::new(cfg.package_dir.clone(), cfg.max_upload_bytes, cfg.verify_zip_magic) }

    pub fn dir(&self) -> &Path { &self.dir }
    pub fn max_bytes(&self) -> u64 { self.max_bytes }

    /// Create the package directory. Idempotent; run once before serving.
    pub async fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        debug!(dir=?self.dir, "package_dir.ready");
        Ok(())
    }

    /// Validate the name and open a temporary file for the body.
    pub async fn begin(&self, original_name: &str) -> Result<PendingUpload, PackageError> {
        check_file_name(original_name)?;
        let tmp_path = self.dir.join(format!("upload-{}.part", Uuid::new_v4()));
        let file = fs::File::create(&tmp_path).await?;
        Ok(PendingUpload {
            dir: self.dir.clone(),
            tmp_path,
            file: Some(file),
            original_name: original_name.to_string(),
            written: 0,
            max_bytes: self.max_bytes,
            verify_magic: self.verify_magic,
            head: Vec::with_capacity(4),
            committed: false,
        })
    }

    /// Resolve a stored name. Names that could escape the directory are treated as absent.
    fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        let plain = !file_name.is_empty() && !file_name.contains(['/', '\\']) && file_name != "." && file_name != "..";
        plain.then(|| self.dir.join(file_name))
    }

    /// `Ok(None)` when the record points at a file that is not on disk.
    pub async fn open(&self, file_name: &str) -> Result<Option<OpenPackage>, PackageError> {
        let Some(path) = self.resolve(file_name) else { return Ok(None) };
        let meta = match fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file = fs::File::open(&path).await?;
        Ok(Some(OpenPackage { file, size: meta.len() }))
    }

    pub async fn remove(&self, file_name: &str) -> Result<(), PackageError> {
        let Some(path) = self.resolve(file_name) else { return Ok(()) };
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// An upload in progress. Dropping it without [`PendingUpload::finish`] deletes the partial file.
#[derive(Debug)]
pub struct PendingUpload {
    dir: PathBuf,
    tmp_path: PathBuf,
    file: Option<fs::File>,
    original_name: String,
    written: u64,
    max_bytes: u64,
    verify_magic: bool,
    head: Vec<u8>,
    committed: bool,
}

impl PendingUpload {
    pub fn written(&self) -> u64 { self.written }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), PackageError> {
        let total = self.written + chunk.len() as u64;
        if total > self.max_bytes { return Err(PackageError::TooLarge { limit: self.max_bytes }); }
        if self.verify_magic && self.head.len() < 4 {
            let take = (4 - self.head.len()).min(chunk.len());
            self.head.extend_from_slice(&chunk[..take]);
            if self.head.len() == 4 && !ZIP_SIGNATURES.iter().any(|sig| sig[..] == self.head[..]) {
                return Err(PackageError::NotZip);
            }
        }
        let file = self.file.as_mut().ok_or_else(|| io::Error::new(io::ErrorKind::Other, "upload already finished"))?;
        file.write_all(chunk).await?;
        self.written = total;
        Ok(())
    }

    /// Flush and move the body to its generated storage name.
    pub async fn finish(mut self) -> Result<StoredPackage, PackageError> {
        if self.verify_magic && self.head.len() < 4 { return Err(PackageError::NotZip); }
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        let file_name = storage_name(&self.original_name);
        let final_path = self.dir.join(&file_name);
        let mut temp_left = false;
        if let Err(e) = fs::rename(&self.tmp_path, &final_path).await {
            warn!(error=%e, "rename_failed_fallback_copy");
            fs::copy(&self.tmp_path, &final_path).await?;
            temp_left = !discard_temp(&self.tmp_path).await;
        }
        // a leftover temp file gets one more removal attempt in Drop
        self.committed = !temp_left;
        Ok(StoredPackage { file_name, size: self.written })
    }
}

/// Remove a temp file, logging anything but NotFound. Returns whether it is gone.
async fn discard_temp(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(error=%e, path=?path, "temp_upload_cleanup_failed");
            false
        }
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if self.committed { return; }
        drop(self.file.take());
        if let Err(e) = std::fs::remove_file(&self.tmp_path) {
            if e.kind() != io::ErrorKind::NotFound { warn!(error=%e, path=?self.tmp_path, "partial_upload_cleanup_failed"); }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    const ZIP_BYTES: &[u8] = b"PK\x03\x04rest-of-archive";

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir).unwrap().map(|e| e.unwrap().file_name().to_string_lossy().into_owned()).collect();
        names.sort();
        names
    }

    #[test]
    fn extension_check_is_suffix_based() {
        assert!(check_file_name("tool.zip").is_ok());
        assert!(check_file_name("TOOL.ZIP").is_ok());
        assert!(matches!(check_file_name("tool.txt"), Err(PackageError::InvalidExtension)));
        assert!(matches!(check_file_name("tool.zip.exe"), Err(PackageError::InvalidExtension)));
        assert!(matches!(check_file_name(".zip"), Err(PackageError::InvalidExtension)));
    }

    #[test]
    fn storage_names_are_unique_and_flat() {
        let a = storage_name("../../etc/my tool.zip");
        let b = storage_name("../../etc/my tool.zip");
        assert_ne!(a, b);
        assert!(a.ends_with("-my_tool.zip"), "{a}");
        assert!(!a.contains('/'));
        let parts: Vec<&str> = a.splitn(3, '-').collect();
        assert!(parts[0].parse::<i64>().is_ok());
        assert_eq!(parts[1].len(), 9);
    }

    #[tokio::test]
    async fn finished_upload_lands_under_generated_name() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PackageStore::new(tmp.path().join("pkgs"), 1024, true);
        store.init().await.unwrap();
        store.init().await.unwrap();
        let mut up = store.begin("tool.zip").await.unwrap();
        up.write_chunk(&ZIP_BYTES[..2]).await.unwrap();
        up.write_chunk(&ZIP_BYTES[2..]).await.unwrap();
        let stored = up.finish().await.unwrap();
        assert_eq!(stored.size, ZIP_BYTES.len() as u64);
        assert_eq!(entries(store.dir()), vec![stored.file_name.clone()]);

        let mut opened = store.open(&stored.file_name).await.unwrap().unwrap();
        assert_eq!(opened.size, ZIP_BYTES.len() as u64);
        let mut buf = Vec::new();
        opened.file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, ZIP_BYTES);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_and_cleaned() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PackageStore::new(tmp.path(), 8, false);
        let mut up = store.begin("big.zip").await.unwrap();
        up.write_chunk(b"12345678").await.unwrap();
        assert!(matches!(up.write_chunk(b"9").await, Err(PackageError::TooLarge { limit: 8 })));
        drop(up);
        assert!(entries(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn non_zip_content_is_rejected_when_verifying() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PackageStore::new(tmp.path(), 1024, true);
        let mut up = store.begin("fake.zip").await.unwrap();
        assert!(matches!(up.write_chunk(b"#!/bin/sh\n").await, Err(PackageError::NotZip)));
        drop(up);
        let tiny = store.begin("tiny.zip").await.unwrap();
        assert!(matches!(tiny.finish().await, Err(PackageError::NotZip)));
        assert!(entries(tmp.path()).is_empty());

        let lenient = PackageStore::new(tmp.path(), 1024, false);
        let mut up = lenient.begin("plain.zip").await.unwrap();
        up.write_chunk(b"not a zip").await.unwrap();
        assert!(up.finish().await.is_ok());
    }

    #[tokio::test]
    async fn missing_or_escaping_names_resolve_to_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PackageStore::new(tmp.path().join("pkgs"), 1024, true);
        store.init().await.unwrap();
        std::fs::write(tmp.path().join("secret.zip"), b"PK\x03\x04").unwrap();
        assert!(store.open("gone.zip").await.unwrap().is_none());
        assert!(store.open("../secret.zip").await.unwrap().is_none());
        assert!(store.open("").await.unwrap().is_none());
        store.remove("gone.zip").await.unwrap();
    }

    #[tokio::test]
    async fn temp_cleanup_reports_what_it_could_not_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let part = tmp.path().join("upload-1.part");
        std::fs::write(&part, b"PK\x03\x04").unwrap();
        assert!(discard_temp(&part).await);
        assert!(!part.exists());
        assert!(discard_temp(&part).await, "already gone counts as removed");
        // a directory cannot be removed as a file
        let stuck = tmp.path().join("upload-2.part");
        std::fs::create_dir(&stuck).unwrap();
        assert!(!discard_temp(&stuck).await);
    }
}

//! Image Vault - Legacy Format Migration
//!
//! Before the single-file container, each image was two files:
//! ```text
//! <id>.enc   [IV 16B][CIPHERTEXT]
//! <id>.json  metadata object
//! ```
//! Migration folds the sidecar into the container. Without a passphrase the
//! existing IV and ciphertext are reframed as-is; with one, the payload is
//! decrypted and encoded again under a fresh IV.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::container::{self, CONTAINER_EXTENSION};
use crate::crypto::{decrypt_cbc, derive_key, IV_LEN};
use crate::error::{VaultError, VaultResult};
use crate::metadata::ImageMeta;
use crate::secure_fs;
use crate::storage::ImageStore;

const SIDECAR_EXTENSION: &str = "json";

/// An entry left as it was, and why
#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    pub id: String,
    pub album: String,
    pub reason: String,
}

/// Outcome of a migration run
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub migrated: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Migrate every legacy pair in the root and in every album
pub fn migrate_store(store: &ImageStore, passphrase: Option<&str>) -> VaultResult<MigrationReport> {
    let mut report = MigrationReport::default();
    for album in store.albums()? {
        let dir = store.album_dir(&album.name)?;
        migrate_dir(&dir, &album.name, passphrase, &mut report)?;
    }

    tracing::info!(
        migrated = report.migrated.len(),
        skipped = report.skipped.len(),
        "legacy migration finished"
    );
    Ok(report)
}

fn migrate_dir(
    dir: &Path,
    album: &str,
    passphrase: Option<&str>,
    report: &mut MigrationReport,
) -> VaultResult<()> {
    let mut sidecars = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(SIDECAR_EXTENSION) && path.is_file() {
            sidecars.push(path);
        }
    }
    sidecars.sort();

    for sidecar in sidecars {
        let Some(id) = sidecar.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };

        match migrate_pair(dir, &id, &sidecar, passphrase) {
            Ok(()) => {
                tracing::info!(id = %id, album = %album, "migrated legacy image");
                report.migrated.push(id);
            }
            Err(e) => {
                tracing::warn!(id = %id, album = %album, error = %e, "skipped legacy image");
                report.skipped.push(SkippedEntry {
                    id,
                    album: album.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn migrate_pair(dir: &Path, id: &str, sidecar: &Path, passphrase: Option<&str>) -> VaultResult<()> {
    let enc_path = dir.join(format!("{}.{}", id, CONTAINER_EXTENSION));
    if !enc_path.is_file() {
        return Err(VaultError::NotFound(format!("{}.{} for sidecar", id, CONTAINER_EXTENSION)));
    }

    let legacy = secure_fs::read_file(&enc_path)?;
    if is_container_for(&legacy, id) {
        return Err(VaultError::InvalidInput("already in container format".into()));
    }

    let mut meta: ImageMeta = serde_json::from_slice(&fs::read(sidecar)?)
        .map_err(|e| VaultError::MalformedContainer(format!("sidecar metadata: {}", e)))?;
    if meta.id().is_empty() {
        meta.set_id(id);
    }

    let data = upgrade(&legacy, &meta, passphrase)?;
    secure_fs::write_atomic(&enc_path, &data)?;
    fs::remove_file(sidecar)?;
    Ok(())
}

/// Build a container from a legacy `[IV][CIPHERTEXT]` payload
pub fn upgrade(legacy: &[u8], meta: &ImageMeta, passphrase: Option<&str>) -> VaultResult<Vec<u8>> {
    if legacy.len() < IV_LEN {
        return Err(VaultError::MalformedContainer(format!(
            "legacy file of {} bytes has no IV",
            legacy.len()
        )));
    }
    let (iv_bytes, ciphertext) = legacy.split_at(IV_LEN);
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(iv_bytes);

    match passphrase {
        Some(passphrase) => {
            let plaintext = decrypt_cbc(&derive_key(passphrase.as_bytes()), &iv, ciphertext)?;
            container::encode(&plaintext, passphrase.as_bytes(), meta)
        }
        None => container::frame(meta, &iv, ciphertext),
    }
}

/// A file that already parses as a container for this id
fn is_container_for(data: &[u8], id: &str) -> bool {
    container::peek_metadata(data).is_ok_and(|meta| meta.id() == id)
}

//! Image Vault - Batch Import / Export
//!
//! Bulk encryption of a directory of images into the store, and bulk
//! decryption of the store back to plain files. A failing file is recorded
//! in the report and the batch carries on.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::container;
use crate::error::{VaultError, VaultResult};
use crate::media::{extension_of, is_image_file, mime_for_extension, output_file_name};
use crate::secure_fs;
use crate::storage::{container_files, ImageStore, NewImage};

/// Options for [`encrypt_directory`]
#[derive(Debug, Clone, Default)]
pub struct EncryptOptions {
    /// Descend into subdirectories
    pub recursive: bool,
    /// Name images `"<prefix> <n><ext>"` instead of keeping file names
    pub name_prefix: Option<String>,
    /// Target album (`None` = default)
    pub album: Option<String>,
    pub tags: Vec<String>,
}

/// One file's outcome
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub source: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a batch run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub timestamp: DateTime<Utc>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BatchItem>,
}

impl BatchReport {
    fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            total: 0,
            succeeded: 0,
            failed: 0,
            results: Vec::new(),
        }
    }

    fn record(&mut self, source: String, outcome: VaultResult<String>) {
        self.total += 1;
        let item = match outcome {
            Ok(output) => {
                self.succeeded += 1;
                BatchItem { source, success: true, output: Some(output), error: None }
            }
            Err(e) => {
                self.failed += 1;
                tracing::warn!(source = %source, error = %e, "batch item failed");
                BatchItem { source, success: false, output: None, error: Some(e.to_string()) }
            }
        };
        self.results.push(item);
    }

    /// Write the report as pretty JSON
    pub fn save(&self, path: &Path) -> VaultResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        secure_fs::write_atomic(path, &json)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ENCRYPT
// ═══════════════════════════════════════════════════════════════════════════

/// Image files under `source`, sorted by path
pub fn find_images(source: &Path, recursive: bool) -> VaultResult<Vec<PathBuf>> {
    if !source.is_dir() {
        return Err(VaultError::NotFound(format!("directory {}", source.display())));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut images = Vec::new();
    for entry in WalkDir::new(source).min_depth(1).max_depth(max_depth).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() && is_image_file(entry.path()) => {
                images.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "cannot scan entry"),
        }
    }
    Ok(images)
}

/// Encrypt every image under `source` into the store
pub fn encrypt_directory(
    store: &ImageStore,
    source: &Path,
    passphrase: &str,
    options: &EncryptOptions,
) -> VaultResult<BatchReport> {
    let images = find_images(source, options.recursive)?;
    let mut report = BatchReport::new();

    for (index, path) in images.iter().enumerate() {
        let relative = path.strip_prefix(source).unwrap_or(path).to_string_lossy().into_owned();
        let outcome = encrypt_one(store, path, &relative, index, passphrase, options);
        report.record(relative, outcome);
    }

    tracing::info!(total = report.total, failed = report.failed, "batch encryption finished");
    Ok(report)
}

fn encrypt_one(
    store: &ImageStore,
    path: &Path,
    relative: &str,
    index: usize,
    passphrase: &str,
    options: &EncryptOptions,
) -> VaultResult<String> {
    let ext = extension_of(path).unwrap_or_default();
    let plaintext = fs::read(path)?;

    let prefix = options.name_prefix.as_deref().map(str::trim).filter(|p| !p.is_empty());
    let original_name = match prefix {
        Some(prefix) => format!("{} {}.{}", prefix, index + 1, ext),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| relative.to_string()),
    };

    let mut extra = Map::new();
    extra.insert("sourcePath".into(), Value::from(relative));

    let meta = store.store(
        &plaintext,
        passphrase,
        NewImage {
            original_name,
            mime_type: mime_for_extension(&ext).to_string(),
            tags: options.tags.clone(),
            album: options.album.clone(),
            extra,
        },
    )?;
    Ok(meta.id())
}

// ═══════════════════════════════════════════════════════════════════════════
// DECRYPT
// ═══════════════════════════════════════════════════════════════════════════

/// Decrypt the store (or one album) into `output/<album>/`
pub fn decrypt_all(
    store: &ImageStore,
    passphrase: &str,
    output: &Path,
    album: Option<&str>,
) -> VaultResult<BatchReport> {
    let albums = match album {
        Some(name) => {
            let dir = store.album_dir(name)?;
            if !dir.is_dir() {
                return Err(VaultError::NotFound(format!("album {}", name)));
            }
            vec![name.to_string()]
        }
        None => store.albums()?.into_iter().map(|a| a.name).collect(),
    };

    let mut report = BatchReport::new();
    for album in albums {
        let files = container_files(&store.album_dir(&album)?)?;
        if files.is_empty() {
            continue;
        }
        let target_dir = output.join(&album);
        fs::create_dir_all(&target_dir)?;

        for path in files {
            let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            let source = format!("{}/{}", album, file_name);
            let outcome = decrypt_one(&path, &target_dir, passphrase);
            report.record(source, outcome);
        }
    }

    tracing::info!(total = report.total, failed = report.failed, "batch decryption finished");
    Ok(report)
}

fn decrypt_one(path: &Path, target_dir: &Path, passphrase: &str) -> VaultResult<String> {
    let data = secure_fs::read_file(path)?;
    let (plaintext, meta) = container::decode(&data, passphrase.as_bytes())?;

    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match meta.original_name() {
        "" => stem.clone(),
        name => name.to_string(),
    };
    let mut file_name = output_file_name(&name, meta.mime_or_default());

    if target_dir.join(&file_name).exists() {
        let short_id: String = stem.chars().take(8).collect();
        file_name = format!("{}-{}", short_id, file_name);
    }

    let target = target_dir.join(&file_name);
    fs::write(&target, &plaintext)?;
    Ok(target.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::fixtures;
    use crate::metadata::ImageMeta;
    use tempfile::tempdir;

    fn fixture_source(dir: &Path) {
        fs::write(dir.join("a.jpg"), b"jpeg one").unwrap();
        fs::write(dir.join("b.PNG"), b"png two").unwrap();
        fs::write(dir.join("readme.txt"), b"not an image").unwrap();
        fs::create_dir(dir.join("nested")).unwrap();
        fs::write(dir.join("nested/c.gif"), b"gif three").unwrap();
    }

    #[test]
    fn test_find_images_respects_recursion() {
        let src = tempdir().unwrap();
        fixture_source(src.path());

        assert_eq!(find_images(src.path(), false).unwrap().len(), 2);
        assert_eq!(find_images(src.path(), true).unwrap().len(), 3);
        assert!(matches!(
            find_images(&src.path().join("missing"), false),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn test_encrypt_directory() {
        let src = tempdir().unwrap();
        let vault = tempdir().unwrap();
        fixture_source(src.path());
        let store = ImageStore::open(vault.path()).unwrap();

        let options = EncryptOptions {
            recursive: true,
            name_prefix: Some("Trip".into()),
            album: Some("imports".into()),
            tags: vec!["Batch".into()],
        };
        let report = encrypt_directory(&store, src.path(), "pass1234", &options).unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 3);

        let mut names: Vec<String> = store
            .list(Some("imports"))
            .unwrap()
            .into_iter()
            .map(|s| s.original_name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["Trip 1.jpg", "Trip 2.png", "Trip 3.gif"]);

        let id = &report.results[2].output.clone().unwrap();
        let opened = store.open_image(id, "pass1234").unwrap();
        assert_eq!(opened.plaintext, b"gif three");
        assert_eq!(opened.metadata.mime_type(), Some("image/gif"));
        assert_eq!(opened.metadata.tags(), vec!["batch"]);
        assert!(opened.metadata.get("sourcePath").is_some());
    }

    #[test]
    fn test_decrypt_all_round_trip() {
        let src = tempdir().unwrap();
        let vault = tempdir().unwrap();
        let out = tempdir().unwrap();
        fixture_source(src.path());
        let store = ImageStore::open(vault.path()).unwrap();
        encrypt_directory(&store, src.path(), "pass1234", &EncryptOptions::default()).unwrap();

        let report = decrypt_all(&store, "pass1234", out.path(), None).unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(fs::read(out.path().join("default/a.jpg")).unwrap(), b"jpeg one");
        assert_eq!(fs::read(out.path().join("default/b.png")).unwrap(), b"png two");
    }

    #[test]
    fn test_decrypt_all_with_wrong_key_fails_every_file() {
        let vault = tempdir().unwrap();
        for id in ["one", "two", "three"] {
            let meta = ImageMeta::new(id, format!("{}.jpg", id), "image/jpeg", 3);
            let path = vault.path().join(format!("{}.enc", id));
            fs::write(path, fixtures::container(&meta)).unwrap();
        }
        let store = ImageStore::open(vault.path()).unwrap();

        let out = tempdir().unwrap();
        let wrong = decrypt_all(&store, fixtures::WRONG_PASSPHRASE, out.path(), None).unwrap();
        assert_eq!(wrong.total, 3);
        assert_eq!(wrong.failed, 3);
        assert_eq!(wrong.succeeded, 0);
        assert!(!out.path().join("default/one.jpg").exists());

        let right = decrypt_all(&store, fixtures::PASSPHRASE, out.path(), None).unwrap();
        assert_eq!(right.succeeded, 3);
        assert_eq!(fs::read(out.path().join("default/one.jpg")).unwrap(), fixtures::PLAINTEXT);
    }

    #[test]
    fn test_report_serializes() {
        let mut report = BatchReport::new();
        report.record("x.jpg".into(), Ok("id".into()));
        report.record("y.jpg".into(), Err(VaultError::InvalidKey));

        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.save(&path).unwrap();
        let json: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["results"][1]["error"], "Invalid decryption key");
    }
}

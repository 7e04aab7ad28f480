//! Image Vault - Storage Directory
//!
//! One `<id>.enc` container per image. The root directory is the
//! `default` album; each subdirectory is another album. Listing and search
//! only ever read metadata blocks, so they never need a passphrase.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::container::{self, CONTAINER_EXTENSION, LENGTH_PREFIX_LEN};
use crate::error::{VaultError, VaultResult};
use crate::metadata::{keys, normalize_tags, ImageMeta};
use crate::secure_fs;

/// Album name of the root directory
pub const DEFAULT_ALBUM: &str = "default";

/// Minimum passphrase length accepted for new images
pub const MIN_PASSPHRASE_LEN: usize = 4;

/// Default and maximum page sizes for [`ImageStore::query`]
pub const DEFAULT_PER_PAGE: usize = 50;
pub const MAX_PER_PAGE: usize = 500;

// ═══════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// Where a container lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: PathBuf,
    pub album: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumInfo {
    pub name: String,
    pub image_count: usize,
}

/// Listing entry built from metadata alone
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub id: String,
    pub original_name: String,
    pub encrypted_at: Option<DateTime<Utc>>,
    /// Container size on disk
    pub size: u64,
    pub tags: Vec<String>,
    pub album: String,
}

/// Filter and pagination for listings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageQuery {
    pub album: Option<String>,
    /// Exact tag, case-insensitive
    pub tag: Option<String>,
    /// Substring of the name or any tag, case-insensitive
    pub q: Option<String>,
    /// 1-based
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

/// Descriptive fields for a new upload
#[derive(Debug, Clone, Default)]
pub struct NewImage {
    pub original_name: String,
    pub mime_type: String,
    pub tags: Vec<String>,
    /// `None` or `"default"` stores in the root
    pub album: Option<String>,
    /// Extra metadata fields (e.g. `sourcePath`)
    pub extra: Map<String, Value>,
}

/// A decrypted image
#[derive(Debug, Clone)]
pub struct OpenedImage {
    pub plaintext: Vec<u8>,
    pub metadata: ImageMeta,
    pub album: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// PER-ID LOCKS
// ═══════════════════════════════════════════════════════════════════════════

/// Serializes read-modify-write cycles on the same identifier
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    fn with<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let lock = Arc::clone(self.locks.lock().entry(key.to_string()).or_default());
        let result = {
            let _guard = lock.lock();
            f()
        };

        let mut locks = self.locks.lock();
        // map + this handle: nobody else is waiting
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
        result
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// IMAGE STORE
// ═══════════════════════════════════════════════════════════════════════════

/// Image store rooted at a storage directory
pub struct ImageStore {
    root: PathBuf,
    locks: KeyedLocks,
}

impl ImageStore {
    /// Open a store, creating the root directory if needed
    pub fn open<P: AsRef<Path>>(root: P) -> VaultResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: KeyedLocks::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ───────────────────────────────────────────────────────────────────────
    // Lookup
    // ───────────────────────────────────────────────────────────────────────

    /// Find a container: root first, then albums in name order
    pub fn locate(&self, id: &str) -> VaultResult<Location> {
        validate_name("image id", id)?;
        let file_name = container_file_name(id);

        let root_path = self.root.join(&file_name);
        if root_path.is_file() {
            return Ok(Location {
                path: root_path,
                album: DEFAULT_ALBUM.to_string(),
            });
        }

        for album in self.album_names()? {
            let path = self.root.join(&album).join(&file_name);
            if path.is_file() {
                return Ok(Location { path, album });
            }
        }

        Err(VaultError::NotFound(format!("image {}", id)))
    }

    /// Directory backing an album
    pub fn album_dir(&self, album: &str) -> VaultResult<PathBuf> {
        if album == DEFAULT_ALBUM {
            return Ok(self.root.clone());
        }
        validate_name("album", album)?;
        Ok(self.root.join(album))
    }

    /// Subdirectory album names, sorted
    ///
    /// A subdirectory called `default` would shadow the root album and is
    /// not an album.
    fn album_names(&self) -> VaultResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if name == DEFAULT_ALBUM {
                tracing::warn!(
                    path = %entry.path().display(),
                    "ignoring subdirectory named after the root album"
                );
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// `default` first, then every album directory
    pub fn albums(&self) -> VaultResult<Vec<AlbumInfo>> {
        let mut albums = vec![AlbumInfo {
            name: DEFAULT_ALBUM.to_string(),
            image_count: container_files(&self.root)?.len(),
        }];
        for name in self.album_names()? {
            let image_count = container_files(&self.root.join(&name))?.len();
            albums.push(AlbumInfo { name, image_count });
        }
        Ok(albums)
    }

    // ───────────────────────────────────────────────────────────────────────
    // Listing
    // ───────────────────────────────────────────────────────────────────────

    /// Summaries for one album, or all albums, newest first
    ///
    /// Containers whose metadata cannot be read are skipped.
    pub fn list(&self, album: Option<&str>) -> VaultResult<Vec<ImageSummary>> {
        let albums = match album {
            Some(name) => {
                let dir = self.album_dir(name)?;
                if !dir.is_dir() {
                    return Err(VaultError::NotFound(format!("album {}", name)));
                }
                vec![(name.to_string(), dir)]
            }
            None => {
                let mut all = vec![(DEFAULT_ALBUM.to_string(), self.root.clone())];
                for name in self.album_names()? {
                    let dir = self.root.join(&name);
                    all.push((name, dir));
                }
                all
            }
        };

        let mut images = Vec::new();
        for (album, dir) in albums {
            for path in container_files(&dir)? {
                match summarize(&path, &album) {
                    Ok(summary) => images.push(summary),
                    Err(e) => tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable container"
                    ),
                }
            }
        }

        images.sort_by(|a, b| b.encrypted_at.cmp(&a.encrypted_at).then_with(|| a.id.cmp(&b.id)));
        Ok(images)
    }

    /// Filtered, paginated listing
    pub fn query(&self, query: &ImageQuery) -> VaultResult<Page<ImageSummary>> {
        let tag = query.tag.as_deref().map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty());
        let needle = query.q.as_deref().map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty());

        let matches: Vec<ImageSummary> = self
            .list(query.album.as_deref())?
            .into_iter()
            .filter(|image| match &tag {
                Some(tag) => image.tags.iter().any(|t| t.to_lowercase() == *tag),
                None => true,
            })
            .filter(|image| match &needle {
                Some(needle) => {
                    image.original_name.to_lowercase().contains(needle.as_str())
                        || image.tags.iter().any(|t| t.to_lowercase().contains(needle.as_str()))
                }
                None => true,
            })
            .collect();

        let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        let page = query.page.unwrap_or(1).max(1);
        let total = matches.len();
        let items = matches
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        Ok(Page { items, total, page, per_page })
    }

    // ───────────────────────────────────────────────────────────────────────
    // Image operations
    // ───────────────────────────────────────────────────────────────────────

    /// Encrypt and persist a new image; returns its metadata
    pub fn store(
        &self,
        plaintext: &[u8],
        passphrase: &str,
        image: NewImage,
    ) -> VaultResult<ImageMeta> {
        let album = image.album.as_deref().filter(|a| !a.is_empty()).unwrap_or(DEFAULT_ALBUM);
        let dir = self.album_dir(album)?;

        let id = Uuid::new_v4().to_string();
        let size = plaintext.len() as u64;
        let mut meta = ImageMeta::new(&id, image.original_name, image.mime_type, size);
        meta.insert(keys::TAGS, normalize_tags(image.tags));
        for (key, value) in image.extra {
            meta.insert(key, value);
        }

        let data = container::encode(plaintext, passphrase.as_bytes(), &meta)?;
        secure_fs::write_atomic(&dir.join(container_file_name(&id)), &data)?;

        tracing::info!(id = %id, album = %album, size = plaintext.len(), "stored image");
        Ok(meta)
    }

    /// Decrypt an image
    pub fn open_image(&self, id: &str, passphrase: &str) -> VaultResult<OpenedImage> {
        let location = self.locate(id)?;
        let data = secure_fs::read_file(&location.path)?;
        let (plaintext, metadata) = container::decode(&data, passphrase.as_bytes())?;
        tracing::debug!(id = %id, album = %location.album, "decrypted image");
        Ok(OpenedImage {
            plaintext,
            metadata,
            album: location.album,
        })
    }

    /// Metadata only, no passphrase
    pub fn metadata(&self, id: &str) -> VaultResult<ImageMeta> {
        let location = self.locate(id)?;
        read_metadata(&location.path)
    }

    /// Replace an image's tags
    ///
    /// Requires the passphrase. The file is only replaced after the new
    /// container has been fully built.
    pub fn update_tags<I, S>(&self, id: &str, passphrase: &str, tags: I) -> VaultResult<ImageMeta>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags = normalize_tags(tags);
        self.locks.with(id, || {
            let location = self.locate(id)?;
            let data = secure_fs::read_file(&location.path)?;

            let mut updated = None;
            let rewritten = container::rewrite_metadata(&data, passphrase.as_bytes(), |meta| {
                meta.retag(&tags);
                updated = Some(meta.clone());
            })?;

            secure_fs::write_atomic(&location.path, &rewritten)?;
            tracing::info!(id = %id, tags = tags.len(), "updated tags");

            updated.ok_or_else(|| {
                VaultError::Serialization("metadata rewrite produced nothing".into())
            })
        })
    }

    /// Remove an image
    pub fn delete(&self, id: &str) -> VaultResult<()> {
        self.locks.with(id, || {
            let location = self.locate(id)?;
            secure_fs::delete_file(&location.path)?;
            tracing::info!(id = %id, album = %location.album, "deleted image");
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════

/// Reject ids and album names that could escape the storage root
pub fn validate_name(kind: &str, name: &str) -> VaultResult<()> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0'])
        || name.len() > 255;
    if bad {
        return Err(VaultError::InvalidInput(format!("invalid {}: {:?}", kind, name)));
    }
    Ok(())
}

/// Upload policy for passphrases
pub fn check_passphrase(passphrase: &str, min_len: usize) -> VaultResult<()> {
    if passphrase.chars().count() < min_len {
        return Err(VaultError::InvalidInput(format!(
            "Encryption key must be at least {} characters",
            min_len
        )));
    }
    Ok(())
}

fn container_file_name(id: &str) -> String {
    format!("{}.{}", id, CONTAINER_EXTENSION)
}

/// `*.enc` regular files directly inside `dir`
pub fn container_files(dir: &Path) -> VaultResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_container = path.extension().and_then(|e| e.to_str()) == Some(CONTAINER_EXTENSION);
        if is_container && entry.file_type()?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read only the length prefix and metadata block of a container file
pub fn read_metadata(path: &Path) -> VaultResult<ImageMeta> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VaultError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut head = Vec::new();
    (&mut file).take(LENGTH_PREFIX_LEN as u64).read_to_end(&mut head)?;
    if head.len() == LENGTH_PREFIX_LEN {
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&head);
        let declared = u32::from_be_bytes(prefix) as u64;
        file.take(declared).read_to_end(&mut head)?;
    }

    container::peek_metadata(&head)
}

fn summarize(path: &Path, album: &str) -> VaultResult<ImageSummary> {
    let meta = read_metadata(path)?;
    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| meta.id());
    let size = fs::metadata(path)?.len();

    Ok(ImageSummary {
        id,
        encrypted_at: meta.created(),
        original_name: meta.original_name().to_string(),
        size,
        tags: meta.tags(),
        album: album.to_string(),
    })
}

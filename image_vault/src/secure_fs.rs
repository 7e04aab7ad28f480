//! Image Vault - Secure Filesystem Operations
//!
//! Containers are only ever replaced whole: readers see the old file or the
//! new one, never a partial write.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{VaultError, VaultResult};

/// Write `data` to `path` atomically
///
/// The bytes go to a hidden temp file in the same directory, are synced,
/// then renamed over `path`. The temp file is removed if any step fails.
pub fn write_atomic(path: &Path, data: &[u8]) -> VaultResult<()> {
    let parent = path.parent().ok_or_else(|| {
        VaultError::InvalidInput(format!("no parent directory: {}", path.display()))
    })?;
    fs::create_dir_all(parent)?;

    let temp_path = temp_path_for(path);
    let result = write_and_rename(&temp_path, path, data);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_and_rename(temp_path: &Path, path: &Path, data: &[u8]) -> VaultResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)?;

    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    // Rename to final path (atomic on the same filesystem)
    fs::rename(temp_path, path)?;
    Ok(())
}

/// `.name.<uuid>.tmp` beside the target
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

/// Read a whole file, mapping a missing file to `NotFound`
pub fn read_file(path: &Path) -> VaultResult<Vec<u8>> {
    match fs::read(path) {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(VaultError::NotFound(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Overwrite with zeros, then unlink
pub fn delete_file(path: &Path) -> VaultResult<()> {
    let size = match fs::metadata(path) {
        Ok(metadata) => metadata.len() as usize,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VaultError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    if size > 0 {
        if let Ok(mut file) = OpenOptions::new().write(true).open(path) {
            let zeros = vec![0u8; size.min(1024 * 1024)]; // Max 1MB chunks
            let mut remaining = size;
            while remaining > 0 {
                let to_write = remaining.min(zeros.len());
                if file.write_all(&zeros[..to_write]).is_err() {
                    break;
                }
                remaining -= to_write;
            }
            let _ = file.sync_all();
        }
    }

    fs::remove_file(path)?;
    Ok(())
}

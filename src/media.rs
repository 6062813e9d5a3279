//! Image storage: pixel-art payloads kept one file per image.
//!
//! Images live under `<data-dir>/images/<name>.img`. A file holds the
//! concatenated `RRGGBB` hex values of the image, row-major. The store
//! also reports how much of the storage budget is in use.
//!
//! ## Rust concepts
//! - `fs::read_dir()` for directory traversal
//! - `Path` and `PathBuf` for cross-platform file paths
//! - A small error enum with `From` conversions so `?` works on `io::Error`

use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Directory (under the data dir) holding stored images.
pub const IMAGE_DIR: &str = "images";

/// File extension of stored images.
pub const IMAGE_EXT: &str = "img";

// ── Errors ───────────────────────────────────────────────────────────

/// Errors from the image and config stores.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying filesystem failure.
    Io(io::Error),
    /// The requested entry does not exist.
    NotFound(String),
    /// The name contains path separators or is empty.
    InvalidName(String),
    /// A stored document could not be (de)serialized.
    Json(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "storage error: {e}"),
            StoreError::NotFound(name) => write!(f, "not found: {name}"),
            StoreError::InvalidName(name) => write!(f, "invalid name: {name:?}"),
            StoreError::Json(e) => write!(f, "invalid document: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Json(e)
    }
}

// ── Store ────────────────────────────────────────────────────────────

/// Bytes used versus the storage budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct StorageUsage {
    #[serde(rename = "TotalBytes")]
    pub total_bytes: u64,
    #[serde(rename = "UsedBytes")]
    pub used_bytes: u64,
}

/// Directory-backed image store.
#[derive(Clone, Debug)]
pub struct ImageStore {
    data_dir: PathBuf,
    capacity: u64,
}

impl ImageStore {
    /// `capacity` is the storage budget reported as `TotalBytes`.
    pub fn new(data_dir: impl Into<PathBuf>, capacity: u64) -> Self {
        Self {
            data_dir: data_dir.into(),
            capacity,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn image_dir(&self) -> PathBuf {
        self.data_dir.join(IMAGE_DIR)
    }

    fn image_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_image_name(name)?;
        Ok(self.image_dir().join(format!("{name}.{IMAGE_EXT}")))
    }

    /// Names of stored images (no directory, no extension), sorted.
    ///
    /// A missing image directory is an empty list.
    pub fn list_images(&self) -> Vec<String> {
        let mut names = Vec::new();

        let read_dir = match fs::read_dir(self.image_dir()) {
            Ok(rd) => rd,
            Err(_) => return names,
        };

        for entry in read_dir.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == IMAGE_EXT);

            if is_image {
                if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        names
    }

    /// Read a stored image payload.
    pub fn read_image(&self, name: &str) -> Result<String, StoreError> {
        let path = self.image_path(name)?;
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(name.to_string()),
            _ => StoreError::Io(e),
        })
    }

    /// Resolve an image by its position in [`list_images`](Self::list_images).
    ///
    /// Returns `Ok(None)` when `index` is past the end.
    pub fn image_by_index(&self, index: usize) -> Result<Option<(String, String)>, StoreError> {
        let Some(name) = self.list_images().into_iter().nth(index) else {
            return Ok(None);
        };
        let payload = self.read_image(&name)?;
        Ok(Some((name, payload)))
    }

    /// Store (or replace) an image. Returns the number of bytes written.
    pub fn write_image(&self, name: &str, payload: &str) -> Result<usize, StoreError> {
        let path = self.image_path(name)?;
        fs::create_dir_all(self.image_dir())?;
        fs::write(&path, payload)?;
        tracing::info!("Stored image {} ({} bytes)", name, payload.len());
        Ok(payload.len())
    }

    /// Delete an image. Deleting a missing image succeeds.
    pub fn delete_image(&self, name: &str) -> Result<(), StoreError> {
        let path = self.image_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Deleted image {}", name);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Bytes used by everything under the data dir.
    pub fn usage(&self) -> StorageUsage {
        StorageUsage {
            total_bytes: self.capacity,
            used_bytes: dir_size(&self.data_dir),
        }
    }
}

/// Reject names that would escape the image directory.
///
/// Names are used as file stems, so path separators, `..` and empty names
/// are refused.
pub fn validate_image_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

fn dir_size(dir: &Path) -> u64 {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(_) => return 0,
    };

    read_dir
        .flatten()
        .map(|entry| match entry.metadata() {
            Ok(meta) if meta.is_dir() => dir_size(&entry.path()),
            Ok(meta) => meta.len(),
            Err(_) => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    fn store_with_images(names: &[&str]) -> (TempDir, ImageStore) {
        let tmp = TempDir::new().unwrap();
        let store = ImageStore::new(tmp.path(), 1_000_000);
        for name in names {
            store.write_image(name, &format!("payload-{name}")).unwrap();
        }
        (tmp, store)
    }

    #[test]
    fn list_images_only_returns_image_extension() {
        let (tmp, store) = store_with_images(&["heart"]);
        let images_dir = tmp.path().join(IMAGE_DIR);
        create_file(&images_dir, "notes.txt", "x");
        create_file(&images_dir, "photo.png", "x");
        std::fs::create_dir(images_dir.join("nested.img")).unwrap();

        assert_eq!(store.list_images(), vec!["heart"]);
    }

    #[test]
    fn list_images_returns_empty_when_no_dir() {
        let tmp = TempDir::new().unwrap();
        let store = ImageStore::new(tmp.path(), 0);
        assert!(store.list_images().is_empty());
    }

    #[test]
    fn list_images_sorted_alphabetically() {
        let (_tmp, store) = store_with_images(&["zebra", "apple", "mango"]);
        assert_eq!(store.list_images(), vec!["apple", "mango", "zebra"]);
    }

    #[test]
    fn write_then_read_image() {
        let (_tmp, store) = store_with_images(&[]);
        assert_eq!(store.write_image("tree", "00FF00").unwrap(), 6);
        assert_eq!(store.read_image("tree").unwrap(), "00FF00");

        store.write_image("tree", "FF0000").unwrap();
        assert_eq!(store.read_image("tree").unwrap(), "FF0000");
    }

    #[test]
    fn read_missing_image_is_not_found() {
        let (_tmp, store) = store_with_images(&["a"]);
        assert!(matches!(store.read_image("b"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn delete_image_is_idempotent() {
        let (_tmp, store) = store_with_images(&["a", "b"]);
        store.delete_image("a").unwrap();
        store.delete_image("a").unwrap();
        assert_eq!(store.list_images(), vec!["b"]);
    }

    #[test]
    fn image_by_index_follows_sorted_order() {
        let (_tmp, store) = store_with_images(&["b", "a"]);
        assert_eq!(
            store.image_by_index(1).unwrap(),
            Some(("b".to_string(), "payload-b".to_string()))
        );
        assert_eq!(store.image_by_index(2).unwrap(), None);
    }

    #[rstest]
    #[case("")]
    #[case("..")]
    #[case("../config")]
    #[case("a/b")]
    #[case("a\\b")]
    fn invalid_names_are_rejected(#[case] name: &str) {
        let (_tmp, store) = store_with_images(&[]);
        assert!(matches!(
            store.write_image(name, "00"),
            Err(StoreError::InvalidName(_))
        ));
        assert!(matches!(store.read_image(name), Err(StoreError::InvalidName(_))));
    }

    #[test]
    fn usage_counts_all_files() {
        let (tmp, store) = store_with_images(&["a"]);
        create_file(tmp.path(), "config.json", "{}");

        let usage = store.usage();
        assert_eq!(usage.total_bytes, 1_000_000);
        assert_eq!(usage.used_bytes, "payload-a".len() as u64 + 2);
    }

    #[test]
    fn usage_serializes_with_wire_names() {
        let usage = StorageUsage {
            total_bytes: 10,
            used_bytes: 4,
        };
        assert_eq!(
            serde_json::to_string(&usage).unwrap(),
            r#"{"TotalBytes":10,"UsedBytes":4}"#
        );
    }
}

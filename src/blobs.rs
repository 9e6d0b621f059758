//! File-backed blob store for intake-form and artwork photos.
//!
//! Images live flat under the configured directory, keyed by a stored name
//! derived from the image role and a content hash. Handing the store the
//! same bytes twice therefore lands on the same name (replace semantics).
//! Deletion failures are logged and swallowed so a stale file on disk never
//! fails the caller's request.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::models::MatchType;

/// Handle over the image directory. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist image bytes for the given role and return the stored name.
    ///
    /// Rejects anything that is not decodable JPEG/PNG/WebP up front so a
    /// corrupt upload is caught at intake rather than at search time.
    pub fn save(&self, bytes: &[u8], role: MatchType) -> Result<String> {
        if bytes.is_empty() {
            bail!("image is empty");
        }

        let format = image::guess_format(bytes)
            .map_err(|_| anyhow::anyhow!("unrecognized image format"))?;
        let ext = match format {
            image::ImageFormat::Jpeg => "jpg",
            image::ImageFormat::Png => "png",
            image::ImageFormat::WebP => "webp",
            other => bail!("unsupported image format: {:?} (use JPEG, PNG, or WebP)", other),
        };

        // Full decode catches truncated files that pass the magic-byte check
        image::load_from_memory(bytes).with_context(|| "image failed to decode")?;

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let hash = format!("{:x}", hasher.finalize());

        let name = format!("{}-{}.{}", role.as_str(), &hash[..16], ext);

        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(&name);
        std::fs::write(&path, bytes)
            .with_context(|| format!("failed to write image: {}", path.display()))?;

        Ok(name)
    }

    /// Absolute path for a stored name. Rejects names that would escape the
    /// image directory.
    pub fn resolve(&self, stored_name: &str) -> Result<PathBuf> {
        if stored_name.is_empty()
            || stored_name.contains('/')
            || stored_name.contains('\\')
            || stored_name.contains("..")
        {
            bail!("invalid image name: {}", stored_name);
        }
        Ok(self.dir.join(stored_name))
    }

    pub fn load(&self, stored_name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(stored_name)?;
        std::fs::read(&path).with_context(|| format!("image not found: {}", stored_name))
    }

    /// Delete a stored image, logging and continuing on failure. A missing
    /// file is not an error.
    pub fn delete_quiet(&self, stored_name: &str) {
        let path = match self.resolve(stored_name) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("warning: refusing to delete image: {}", e);
                return;
            }
        };
        if !path.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_file(&path) {
            eprintln!("warning: failed to delete image {}: {}", stored_name, e);
        }
    }

    /// All stored image names, sorted, for the ZIP export.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(r: u8, g: u8, b: u8) -> Vec<u8> {
        let img = RgbaImage::from_pixel(16, 16, Rgba([r, g, b, 255]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BlobStore::new(tmp.path());

        let bytes = png_bytes(200, 30, 30);
        let name = store.save(&bytes, MatchType::Work).unwrap();
        assert!(name.starts_with("work-"));
        assert!(name.ends_with(".png"));
        assert_eq!(store.load(&name).unwrap(), bytes);
    }

    #[test]
    fn test_same_bytes_same_name() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BlobStore::new(tmp.path());

        let bytes = png_bytes(10, 20, 30);
        let first = store.save(&bytes, MatchType::Customer).unwrap();
        let second = store.save(&bytes, MatchType::Customer).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_rejects_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BlobStore::new(tmp.path());

        assert!(store.save(b"", MatchType::Work).is_err());
        assert!(store.save(b"not an image at all", MatchType::Work).is_err());
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let store = BlobStore::new("/tmp/does-not-matter");
        assert!(store.resolve("../etc/passwd").is_err());
        assert!(store.resolve("a/b.png").is_err());
        assert!(store.resolve("").is_err());
    }

    #[test]
    fn test_delete_quiet_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BlobStore::new(tmp.path());
        // Must not panic or error
        store.delete_quiet("work-0000000000000000.png");
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::Gallery;
use crate::error::PersistenceError;
use crate::models::Signature;

pub const FORMAT_VERSION: u32 = 1;

/// On-disk layout of a saved gallery.
#[derive(Debug, Serialize, Deserialize)]
pub struct GalleryRecord {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub identities: Vec<IdentityRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub name: String,
    pub signatures: Vec<Signature>,
}

impl GalleryRecord {
    pub fn from_gallery(gallery: &Gallery) -> Self {
        Self {
            version: FORMAT_VERSION,
            saved_at: Utc::now(),
            identities: gallery
                .iter()
                .map(|(name, sigs)| IdentityRecord {
                    name: name.to_string(),
                    signatures: sigs.iter().cloned().collect(),
                })
                .collect(),
        }
    }

    /// Rebuilds a gallery, re-applying the per-identity cap. Blank names and
    /// identities without signatures are skipped.
    pub fn into_gallery(self, cap: usize) -> Result<Gallery, PersistenceError> {
        if self.version != FORMAT_VERSION {
            return Err(PersistenceError::UnsupportedVersion(self.version));
        }

        let mut gallery = Gallery::new();
        for identity in self.identities {
            let name = identity.name.trim();
            if name.is_empty() {
                continue;
            }
            for signature in identity.signatures {
                gallery.push(name, signature, cap);
            }
        }
        Ok(gallery)
    }
}

/// Location of the persisted gallery.
#[derive(Debug, Clone)]
pub struct GalleryFile {
    path: PathBuf,
}

impl GalleryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the saved gallery. A missing file is an empty gallery.
    pub fn load(&self, cap: usize) -> Result<Gallery, PersistenceError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No gallery file at {}, starting empty", self.path.display());
                return Ok(Gallery::new());
            }
            Err(e) => return Err(e.into()),
        };

        let record: GalleryRecord = serde_json::from_reader(BufReader::new(file))?;
        record.into_gallery(cap)
    }

    /// Writes the whole gallery to a sibling temp file and renames it over
    /// the target, so readers see either the old or the new file.
    pub fn save(&self, gallery: &Gallery) -> Result<(), PersistenceError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let record = GalleryRecord::from_gallery(gallery);
        let mut tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, &record)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| PersistenceError::Io(e.error))?;

        debug!(
            "Saved gallery to {}: {} identities, {} signatures",
            self.path.display(),
            gallery.len(),
            gallery.signature_count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sig(v: f64) -> Signature {
        Signature::new(vec![v, 0.5, -v])
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let file = GalleryFile::new(dir.path().join("gallery.json"));
        assert!(file.load(10).unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load_preserves_order_and_counts() {
        let dir = tempdir().unwrap();
        let file = GalleryFile::new(dir.path().join("nested").join("gallery.json"));

        let mut gallery = Gallery::new();
        gallery.push("alice", sig(0.1), 10);
        gallery.push("alice", sig(0.2), 10);
        gallery.push("bob", sig(0.3), 10);
        file.save(&gallery).unwrap();

        let loaded = file.load(10).unwrap();
        assert_eq!(loaded, gallery);
        let alice: Vec<_> = loaded.signatures("alice").unwrap().iter().cloned().collect();
        assert_eq!(alice, vec![sig(0.1), sig(0.2)]);
    }

    #[test]
    fn test_save_leaves_no_temp_files_behind() {
        let dir = tempdir().unwrap();
        let file = GalleryFile::new(dir.path().join("gallery.json"));
        file.save(&Gallery::new()).unwrap();
        file.save(&Gallery::new()).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_a_decode_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        fs::write(&path, b"\x80\x04not json").unwrap();

        let err = GalleryFile::new(&path).load(10).unwrap_err();
        assert!(matches!(err, PersistenceError::Decode(_)));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        fs::write(&path, r#"{"version":99,"saved_at":"2024-01-01T00:00:00Z","identities":[]}"#).unwrap();

        let err = GalleryFile::new(&path).load(10).unwrap_err();
        assert!(matches!(err, PersistenceError::UnsupportedVersion(99)));
    }

    #[test]
    fn test_load_reapplies_invariants() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        fs::write(
            &path,
            r#"{"version":1,"saved_at":"2024-01-01T00:00:00Z","identities":[
                {"name":"  ","signatures":[[1.0]]},
                {"name":"empty","signatures":[]},
                {"name":"dave","signatures":[[1.0],[2.0],[3.0]]}
            ]}"#,
        )
        .unwrap();

        let gallery = GalleryFile::new(&path).load(2).unwrap();
        assert_eq!(gallery.len(), 1);
        let dave: Vec<_> = gallery.signatures("dave").unwrap().iter().cloned().collect();
        assert_eq!(dave, vec![Signature::new(vec![2.0]), Signature::new(vec![3.0])]);
    }
}

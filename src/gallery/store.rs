use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{info, warn};

use super::{Gallery, GalleryFile};
use crate::error::{GalleryError, PersistenceError};
use crate::models::{Deletion, GalleryStats, IdentitySummary, Registration, ResetSummary, Signature};

/// Shared, persisted gallery.
///
/// Readers clone the published `Arc` and never wait on a save. Writers are
/// serialized; each one builds the next gallery on a copy, saves it, and only
/// then publishes it. A failed save publishes nothing.
///
/// A write runs to completion on the blocking pool once started, so dropping
/// the caller's future cannot leave memory and disk apart.
pub struct GalleryStore {
    inner: Arc<Inner>,
}

struct Inner {
    current: RwLock<Arc<Gallery>>,
    writer: Mutex<()>,
    file: GalleryFile,
    max_photos_per_identity: usize,
}

impl Inner {
    fn commit<T>(
        &self,
        mutate: impl FnOnce(&mut Gallery) -> Result<T, GalleryError>,
    ) -> Result<T, GalleryError> {
        let _writer = self.writer.lock();
        let mut next = Gallery::clone(&self.current.read());
        let out = mutate(&mut next)?;
        self.file.save(&next)?;
        *self.current.write() = Arc::new(next);
        Ok(out)
    }
}

impl GalleryStore {
    /// Loads the gallery from `file`. An unreadable file is logged and
    /// replaced by an empty gallery on the next save.
    pub async fn open(file: GalleryFile, max_photos_per_identity: usize) -> Self {
        let loader = file.clone();
        let loaded = tokio::task::spawn_blocking(move || loader.load(max_photos_per_identity))
            .await
            .map_err(|e| PersistenceError::Task(e.to_string()))
            .and_then(|result| result);

        let gallery = match loaded {
            Ok(gallery) => {
                info!(
                    "Loaded {} identities with {} signatures from {}",
                    gallery.len(),
                    gallery.signature_count(),
                    file.path().display()
                );
                for (name, sigs) in gallery.iter() {
                    info!("  - {}: {} photos", name, sigs.len());
                }
                gallery
            }
            Err(e) => {
                warn!(
                    "Failed to load gallery from {}, starting empty: {}",
                    file.path().display(),
                    e
                );
                Gallery::new()
            }
        };

        Self {
            inner: Arc::new(Inner {
                current: RwLock::new(Arc::new(gallery)),
                writer: Mutex::new(()),
                file,
                max_photos_per_identity,
            }),
        }
    }

    pub fn max_photos_per_identity(&self) -> usize {
        self.inner.max_photos_per_identity
    }

    /// Immutable view of the last committed gallery.
    pub fn snapshot(&self) -> Arc<Gallery> {
        self.inner.current.read().clone()
    }

    pub fn list(&self) -> Vec<IdentitySummary> {
        self.snapshot().summaries()
    }

    pub fn stats(&self) -> GalleryStats {
        self.snapshot().stats()
    }

    pub async fn register(
        &self,
        name: &str,
        signature: Signature,
    ) -> Result<Registration, GalleryError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(GalleryError::Validation("Name must not be empty".to_string()));
        }

        let cap = self.inner.max_photos_per_identity;
        let registration = self
            .write(move |gallery| {
                let photo_count = gallery.push(&name, signature, cap);
                Ok(Registration {
                    total_identities: gallery.len(),
                    name,
                    photo_count,
                })
            })
            .await?;

        info!(
            "Registered face for {} ({} photos)",
            registration.name, registration.photo_count
        );
        Ok(registration)
    }

    /// Removes an identity. The remaining count is taken inside the same
    /// write.
    pub async fn delete(&self, name: &str) -> Result<Deletion, GalleryError> {
        let name = name.to_string();
        let deletion = self
            .write(move |gallery| {
                let removed_signatures = gallery
                    .remove(&name)
                    .ok_or_else(|| GalleryError::NotFound(name.clone()))?;
                Ok(Deletion {
                    remaining_identities: gallery.len(),
                    name,
                    removed_signatures,
                })
            })
            .await?;

        info!("Deleted {} ({} photos)", deletion.name, deletion.removed_signatures);
        Ok(deletion)
    }

    pub async fn reset(&self) -> Result<ResetSummary, GalleryError> {
        let summary = self.write(|gallery| Ok(gallery.clear())).await?;

        info!(
            "Reset gallery: removed {} identities, {} photos",
            summary.identities, summary.signatures
        );
        Ok(summary)
    }

    async fn write<T, F>(&self, mutate: F) -> Result<T, GalleryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Gallery) -> Result<T, GalleryError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        match tokio::task::spawn_blocking(move || inner.commit(mutate)).await {
            Ok(result) => result,
            Err(e) => Err(PersistenceError::Task(e.to_string()).into()),
        }
    }
}

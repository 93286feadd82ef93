//! Registered identities and their stored face signatures.
//!
//! [`Gallery`] is the plain in-memory value; [`GalleryStore`] wraps it with
//! locking and durable persistence and is what request handlers share.

pub mod persistence;
pub mod store;

use std::collections::{BTreeMap, VecDeque};

use crate::models::{GalleryStats, IdentitySummary, ResetSummary, Signature};

pub use persistence::GalleryFile;
pub use store::GalleryStore;

/// Default number of signatures retained per identity.
pub const DEFAULT_MAX_PHOTOS_PER_IDENTITY: usize = 10;

/// Identity name to signatures, oldest first.
///
/// Every identity present holds at least one signature. Iteration is ordered
/// by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gallery {
    identities: BTreeMap<String, VecDeque<Signature>>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Number of identities.
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn signature_count(&self) -> usize {
        self.identities.values().map(VecDeque::len).sum()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.identities.contains_key(name)
    }

    pub fn signatures(&self, name: &str) -> Option<&VecDeque<Signature>> {
        self.identities.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VecDeque<Signature>)> {
        self.identities.iter().map(|(name, sigs)| (name.as_str(), sigs))
    }

    /// Appends `signature` under `name`, then drops the oldest entries until
    /// at most `cap` remain. Returns the resulting count for `name`.
    pub(crate) fn push(&mut self, name: &str, signature: Signature, cap: usize) -> usize {
        let cap = cap.max(1);
        let signatures = self.identities.entry(name.to_string()).or_default();
        signatures.push_back(signature);
        while signatures.len() > cap {
            signatures.pop_front();
        }
        signatures.len()
    }

    /// Removes `name`, returning how many signatures it held.
    pub(crate) fn remove(&mut self, name: &str) -> Option<usize> {
        self.identities.remove(name).map(|sigs| sigs.len())
    }

    pub(crate) fn clear(&mut self) -> ResetSummary {
        let summary = ResetSummary {
            identities: self.len(),
            signatures: self.signature_count(),
        };
        self.identities.clear();
        summary
    }

    pub fn summaries(&self) -> Vec<IdentitySummary> {
        self.iter()
            .map(|(name, sigs)| IdentitySummary {
                name: name.to_string(),
                photo_count: sigs.len(),
            })
            .collect()
    }

    pub fn stats(&self) -> GalleryStats {
        GalleryStats {
            identities: self.len(),
            signatures: self.signature_count(),
        }
    }
}

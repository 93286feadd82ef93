use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Name reported for a face that matched no registered identity.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Face embedding produced by an encoder for one detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(Vec<f64>);

impl Signature {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean distance to `other`.
    ///
    /// Signatures of different lengths come from different encoders and are
    /// reported as infinitely far apart.
    pub fn distance(&self, other: &Signature) -> f64 {
        if self.len() != other.len() {
            return f64::INFINITY;
        }
        let a = ArrayView1::from(self.values());
        let b = ArrayView1::from(other.values());
        (&a - &b).mapv(|d| d * d).sum().sqrt()
    }
}

impl From<Vec<f64>> for Signature {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Pixel-space rectangle around a detected face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub signature: Signature,
}

/// Decision for a single probe signature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub identity: String,
    pub confidence: f64,
    pub recognized: bool,
}

impl MatchResult {
    pub fn recognized(identity: impl Into<String>, confidence: f64) -> Self {
        Self {
            identity: identity.into(),
            confidence,
            recognized: true,
        }
    }

    pub fn unknown() -> Self {
        Self {
            identity: UNKNOWN_IDENTITY.to_string(),
            confidence: 0.0,
            recognized: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Nothing is registered, so no decision could be made.
    EmptyGallery,
    Decided(MatchResult),
}

impl MatchOutcome {
    /// Collapses the outcome into a result; an empty gallery reads as unknown.
    pub fn into_result(self) -> MatchResult {
        match self {
            MatchOutcome::EmptyGallery => MatchResult::unknown(),
            MatchOutcome::Decided(result) => result,
        }
    }
}

/// Per-identity metrics computed while scoring a probe.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityScore {
    pub name: String,
    pub score: f64,
    pub min_distance: f64,
    pub avg_distance: f64,
    pub matches: usize,
    pub total: usize,
    pub match_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    pub name: String,
    pub photo_count: usize,
    pub total_identities: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentitySummary {
    pub name: String,
    pub photo_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deletion {
    pub name: String,
    pub removed_signatures: usize,
    pub remaining_identities: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResetSummary {
    pub identities: usize,
    pub signatures: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GalleryStats {
    pub identities: usize,
    pub signatures: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_self_is_zero() {
        let a = Signature::new(vec![0.3, -1.2, 4.0]);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = Signature::new(vec![0.0, 0.0]);
        let b = Signature::new(vec![3.0, 4.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-12);
        assert_eq!(a.distance(&b), b.distance(&a));
    }

    #[test]
    fn test_mismatched_lengths_are_infinitely_far() {
        let a = Signature::new(vec![1.0, 2.0]);
        let b = Signature::new(vec![1.0, 2.0, 3.0]);
        assert!(a.distance(&b).is_infinite());
    }

    #[test]
    fn test_empty_gallery_outcome_reads_as_unknown() {
        let result = MatchOutcome::EmptyGallery.into_result();
        assert_eq!(result.identity, UNKNOWN_IDENTITY);
        assert_eq!(result.confidence, 0.0);
        assert!(!result.recognized);
    }
}

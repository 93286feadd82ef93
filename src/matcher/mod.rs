//! Multi-sample identity matching.
//!
//! Each identity is scored from all of its stored signatures at once: the
//! closest sample, the mean distance, and the share of samples within the
//! threshold all contribute. The lowest score wins, and is then accepted only
//! if its closest sample is within the threshold and enough of its samples
//! agree.

use std::collections::VecDeque;
use tracing::debug;

use crate::gallery::Gallery;
use crate::models::{IdentityScore, MatchOutcome, MatchResult, Signature};

pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Share of an identity's samples that must fall under the threshold.
pub const MIN_MATCH_RATIO: f64 = 0.3;

const MIN_DISTANCE_WEIGHT: f64 = 0.4;
const AVG_DISTANCE_WEIGHT: f64 = 0.3;
const MISS_RATIO_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    /// Distance below which a sample counts as matching. Lower is stricter.
    pub threshold: f64,
    pub min_match_ratio: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }
}

impl MatchPolicy {
    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            threshold,
            min_match_ratio: MIN_MATCH_RATIO,
        }
    }

    pub fn accepts(&self, score: &IdentityScore) -> bool {
        score.min_distance < self.threshold && score.match_ratio > self.min_match_ratio
    }
}

/// Scores one identity from precomputed probe distances.
///
/// Returns `None` for an empty distance list.
pub fn score_distances(name: &str, distances: &[f64], threshold: f64) -> Option<IdentityScore> {
    if distances.is_empty() {
        return None;
    }

    let total = distances.len();
    let min_distance = distances.iter().copied().fold(f64::INFINITY, f64::min);
    let avg_distance = distances.iter().sum::<f64>() / total as f64;
    let matches = distances.iter().filter(|&&d| d < threshold).count();
    let match_ratio = matches as f64 / total as f64;

    let score = MIN_DISTANCE_WEIGHT * min_distance
        + AVG_DISTANCE_WEIGHT * avg_distance
        + MISS_RATIO_WEIGHT * (1.0 - match_ratio);

    Some(IdentityScore {
        name: name.to_string(),
        score,
        min_distance,
        avg_distance,
        matches,
        total,
        match_ratio,
    })
}

pub fn score_identity(
    name: &str,
    samples: &VecDeque<Signature>,
    probe: &Signature,
    threshold: f64,
) -> Option<IdentityScore> {
    let distances: Vec<f64> = samples.iter().map(|s| s.distance(probe)).collect();
    score_distances(name, &distances, threshold)
}

/// Lowest-scoring identity; ties go to the earliest in gallery order.
/// Identities with a non-finite score are skipped.
pub fn best_candidate(gallery: &Gallery, probe: &Signature, threshold: f64) -> Option<IdentityScore> {
    let mut best: Option<IdentityScore> = None;
    for (name, samples) in gallery.iter() {
        let Some(candidate) = score_identity(name, samples, probe, threshold) else {
            continue;
        };
        if !candidate.score.is_finite() {
            debug!("Skipping {}: score is not finite", candidate.name);
            continue;
        }
        debug!(
            "Score for {}: {:.4} (min {:.4}, avg {:.4}, {}/{} within threshold)",
            candidate.name,
            candidate.score,
            candidate.min_distance,
            candidate.avg_distance,
            candidate.matches,
            candidate.total
        );
        match &best {
            Some(current) if candidate.score >= current.score => {}
            _ => best = Some(candidate),
        }
    }
    best
}

/// `(1 - distance)` as a percentage with two decimals, held to `[0, 100]`.
pub fn confidence_from_distance(distance: f64) -> f64 {
    let percent = ((1.0 - distance) * 100.0 * 100.0).round() / 100.0;
    percent.clamp(0.0, 100.0)
}

/// Classifies one probe signature against a gallery snapshot.
pub fn classify(gallery: &Gallery, probe: &Signature, policy: &MatchPolicy) -> MatchOutcome {
    if gallery.is_empty() {
        return MatchOutcome::EmptyGallery;
    }

    let result = match best_candidate(gallery, probe, policy.threshold) {
        Some(best) if policy.accepts(&best) => {
            MatchResult::recognized(best.name, confidence_from_distance(best.min_distance))
        }
        _ => MatchResult::unknown(),
    };
    MatchOutcome::Decided(result)
}

/// Picks the most confident recognized result among several faces from one
/// image, or an unknown result when none was recognized.
pub fn best_of<I>(results: I) -> MatchResult
where
    I: IntoIterator<Item = MatchResult>,
{
    let mut best: Option<MatchResult> = None;
    for result in results.into_iter().filter(|r| r.recognized) {
        match &best {
            Some(current) if result.confidence <= current.confidence => {}
            _ => best = Some(result),
        }
    }
    best.unwrap_or_else(MatchResult::unknown)
}

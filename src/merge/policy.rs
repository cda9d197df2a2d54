//! Merge policies.
//!
//! Strategies for deciding when and which segments to merge. Segments are
//! grouped into size tiers (log scale over live doc counts); a tier with too
//! many members produces a size-based candidate, and segments carrying many
//! deletions produce a compaction candidate regardless of tier.

use std::collections::HashMap;

/// Lightweight per-segment statistics the policy decides over.
#[derive(Debug, Clone)]
pub struct SegmentStats {
    /// Segment name.
    pub name: String,
    /// Documents, live or deleted.
    pub max_doc: u32,
    /// Live documents.
    pub num_docs: u32,
    /// Whether a merge involving this segment is already running.
    pub is_merging: bool,
}

impl SegmentStats {
    /// Fraction of deleted documents.
    pub fn deletion_ratio(&self) -> f64 {
        if self.max_doc == 0 {
            0.0
        } else {
            1.0 - (self.num_docs as f64 / self.max_doc as f64)
        }
    }

    /// Log-scale tier by live doc count.
    fn tier(&self) -> u8 {
        (64 - u64::from(self.num_docs.max(1)).leading_zeros() as u8) / 2
    }
}

/// A set of segments the policy wants merged together.
#[derive(Debug, Clone)]
pub struct MergeCandidate {
    /// Names of the segments to merge.
    pub segments: Vec<String>,
    /// Urgency, higher first.
    pub priority: f64,
    /// Estimated live docs of the merged result.
    pub estimated_docs: u64,
}

/// Trait for defining merge policies.
pub trait MergePolicy: Send + Sync + std::fmt::Debug {
    /// Select segment sets worth merging, most urgent first.
    fn select_merges(&self, segments: &[SegmentStats]) -> Vec<MergeCandidate>;

    /// Whether any merge should be triggered right now.
    fn should_merge(&self, segments: &[SegmentStats]) -> bool {
        !self.select_merges(segments).is_empty()
    }
}

/// Tiered merge policy inspired by LSM-trees.
#[derive(Debug, Clone)]
pub struct TieredMergePolicy {
    /// Maximum number of segments per tier before a merge triggers.
    pub max_segments_per_tier: usize,
    /// Number of segments to merge at once.
    pub segments_per_merge: usize,
    /// Minimum segment count for any merge.
    pub min_merge_segments: usize,
    /// Deletion ratio that makes a segment a compaction candidate.
    pub deletion_threshold: f64,
}

impl Default for TieredMergePolicy {
    fn default() -> Self {
        TieredMergePolicy {
            max_segments_per_tier: 4,
            segments_per_merge: 3,
            min_merge_segments: 2,
            deletion_threshold: 0.2,
        }
    }
}

impl MergePolicy for TieredMergePolicy {
    fn select_merges(&self, segments: &[SegmentStats]) -> Vec<MergeCandidate> {
        let mut tiers: HashMap<u8, Vec<&SegmentStats>> = HashMap::new();
        for segment in segments {
            if !segment.is_merging {
                tiers.entry(segment.tier()).or_default().push(segment);
            }
        }

        let mut candidates = Vec::new();

        for tier_segments in tiers.values_mut() {
            tier_segments.sort_by_key(|s| s.num_docs);

            // Too many segments in one tier: merge the smallest ones
            if tier_segments.len() > self.max_segments_per_tier
                && tier_segments.len() >= self.min_merge_segments
            {
                let picked: Vec<&&SegmentStats> =
                    tier_segments.iter().take(self.segments_per_merge).collect();
                candidates.push(MergeCandidate {
                    segments: picked.iter().map(|s| s.name.clone()).collect(),
                    priority: 10.0
                        + (tier_segments.len() as f64 - self.max_segments_per_tier as f64),
                    estimated_docs: picked.iter().map(|s| s.num_docs as u64).sum(),
                });
            }
        }

        // Deletion-heavy segments: compact them together
        let mut deletion_heavy: Vec<&SegmentStats> = segments
            .iter()
            .filter(|s| !s.is_merging && s.deletion_ratio() > self.deletion_threshold)
            .collect();
        deletion_heavy.sort_by(|a, b| {
            b.deletion_ratio()
                .partial_cmp(&a.deletion_ratio())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if deletion_heavy.len() >= self.min_merge_segments {
            let picked: Vec<&&SegmentStats> =
                deletion_heavy.iter().take(self.segments_per_merge).collect();
            let avg_ratio = picked.iter().map(|s| s.deletion_ratio()).sum::<f64>()
                / picked.len() as f64;
            candidates.push(MergeCandidate {
                segments: picked.iter().map(|s| s.name.clone()).collect(),
                priority: 5.0 + avg_ratio * 10.0,
                estimated_docs: picked.iter().map(|s| s.num_docs as u64).sum(),
            });
        }

        candidates.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates
    }
}

/// A policy used by `force_merge`: everything into at most `max_segments`.
#[derive(Debug, Clone)]
pub struct ForceMergePolicy {
    /// Upper bound on segments after the merge.
    pub max_segments: usize,
}

impl MergePolicy for ForceMergePolicy {
    fn select_merges(&self, segments: &[SegmentStats]) -> Vec<MergeCandidate> {
        let eligible: Vec<&SegmentStats> =
            segments.iter().filter(|s| !s.is_merging).collect();

        // Over the bound: merge everything into one; repeated application
        // converges below the bound
        if eligible.len() > self.max_segments.max(1) {
            return vec![MergeCandidate {
                segments: eligible.iter().map(|s| s.name.clone()).collect(),
                priority: f64::MAX,
                estimated_docs: eligible.iter().map(|s| s.num_docs as u64).sum(),
            }];
        }

        // Within the bound, force-merge still expunges deletions by
        // rewriting the segments that carry them
        let with_deletions: Vec<&&SegmentStats> = eligible
            .iter()
            .filter(|s| s.num_docs < s.max_doc)
            .collect();
        if with_deletions.is_empty() {
            return Vec::new();
        }

        vec![MergeCandidate {
            segments: with_deletions.iter().map(|s| s.name.clone()).collect(),
            priority: f64::MAX,
            estimated_docs: with_deletions.iter().map(|s| s.num_docs as u64).sum(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(name: &str, max_doc: u32, num_docs: u32) -> SegmentStats {
        SegmentStats {
            name: name.to_string(),
            max_doc,
            num_docs,
            is_merging: false,
        }
    }

    #[test]
    fn test_deletion_ratio() {
        assert_eq!(stats("s", 10, 10).deletion_ratio(), 0.0);
        assert_eq!(stats("s", 10, 5).deletion_ratio(), 0.5);
        assert_eq!(stats("s", 0, 0).deletion_ratio(), 0.0);
    }

    #[test]
    fn test_no_merge_for_few_segments() {
        let policy = TieredMergePolicy::default();
        let segments = vec![stats("a", 10, 10), stats("b", 12, 12)];
        assert!(!policy.should_merge(&segments));
    }

    #[test]
    fn test_tier_overflow_triggers_merge() {
        let policy = TieredMergePolicy::default();
        // Six same-sized segments overflow the tier of 4
        let segments: Vec<SegmentStats> =
            (0..6).map(|i| stats(&format!("seg_{i}"), 10, 10)).collect();

        let candidates = policy.select_merges(&segments);
        assert!(!candidates.is_empty());
        assert_eq!(candidates[0].segments.len(), 3);
    }

    #[test]
    fn test_deletion_heavy_compaction() {
        let policy = TieredMergePolicy::default();
        let segments = vec![
            stats("a", 100, 40),
            stats("b", 100, 50),
            stats("c", 100, 100),
        ];

        let candidates = policy.select_merges(&segments);
        assert!(!candidates.is_empty());
        let names = &candidates[0].segments;
        assert!(names.contains(&"a".to_string()));
        assert!(names.contains(&"b".to_string()));
        assert!(!names.contains(&"c".to_string()));
    }

    #[test]
    fn test_merging_segments_excluded() {
        let policy = TieredMergePolicy::default();
        let mut segments: Vec<SegmentStats> =
            (0..6).map(|i| stats(&format!("seg_{i}"), 10, 10)).collect();
        for s in segments.iter_mut() {
            s.is_merging = true;
        }
        assert!(policy.select_merges(&segments).is_empty());
    }

    #[test]
    fn test_force_merge_policy() {
        let policy = ForceMergePolicy { max_segments: 1 };
        let segments = vec![stats("a", 5, 5), stats("b", 5, 5), stats("c", 5, 5)];

        let candidates = policy.select_merges(&segments);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].segments.len(), 3);

        let one = vec![stats("a", 5, 5)];
        assert!(policy.select_merges(&one).is_empty());
    }

    #[test]
    fn test_force_merge_rewrites_deletions_within_bound() {
        let policy = ForceMergePolicy { max_segments: 1 };

        // One segment, under the bound, but carrying deletions
        let dirty = vec![stats("a", 5, 3)];
        let candidates = policy.select_merges(&dirty);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].segments, vec!["a".to_string()]);

        // Clean single segment: nothing to do
        let clean = vec![stats("a", 5, 5)];
        assert!(policy.select_merges(&clean).is_empty());
    }
}

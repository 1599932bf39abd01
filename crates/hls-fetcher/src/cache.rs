// Ordered cache of downloaded segments.

use m3u8_playlist::Segment;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A segment that has been downloaded and stored locally.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSegment {
    pub sequence_number: u64,
    pub local_path: PathBuf,
    pub segment: Segment,
}

/// What `get_segment` hands back to the consumer.
///
/// `sequence_number` may be larger than the one requested when the requested
/// segment was evicted or skipped; callers should compare.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadySegment {
    pub path: PathBuf,
    pub sequence_number: u64,
    pub segment: Segment,
}

impl From<&CachedSegment> for ReadySegment {
    fn from(cached: &CachedSegment) -> Self {
        Self {
            path: cached.local_path.clone(),
            sequence_number: cached.sequence_number,
            segment: cached.segment.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct SegmentCache {
    entries: BTreeMap<u64, CachedSegment>,
}

impl SegmentCache {
    pub fn insert(&mut self, cached: CachedSegment) {
        self.entries.insert(cached.sequence_number, cached);
    }

    pub fn contains(&self, sequence: u64) -> bool {
        self.entries.contains_key(&sequence)
    }

    /// Exact match, otherwise the smallest cached sequence above `sequence`.
    pub fn lookup(&self, sequence: u64) -> Option<&CachedSegment> {
        self.entries.range(sequence..).next().map(|(_, cached)| cached)
    }

    /// Removes and returns every entry at or below `sequence`.
    pub fn evict_through(&mut self, sequence: u64) -> Vec<CachedSegment> {
        let kept = match sequence.checked_add(1) {
            Some(bound) => self.entries.split_off(&bound),
            None => BTreeMap::new(),
        };
        std::mem::replace(&mut self.entries, kept)
            .into_values()
            .collect()
    }

    /// Number of entries strictly above `sequence`, or all of them for `None`.
    pub fn count_after(&self, sequence: Option<u64>) -> usize {
        match sequence {
            Some(seq) => self
                .entries
                .range((std::ops::Bound::Excluded(seq), std::ops::Bound::Unbounded))
                .count(),
            None => self.entries.len(),
        }
    }

    pub fn drain(&mut self) -> Vec<CachedSegment> {
        std::mem::take(&mut self.entries).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

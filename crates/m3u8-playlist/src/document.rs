// Playlist document: accumulated state of one playlist URL across reloads.

use crate::cursor::{SegmentCursor, Segments};
use crate::error::{ParseError, PlaylistError};
use crate::parser::{ParsedPlaylist, parse};
use crate::types::{Segment, VariantRef};
use bytes::Bytes;
use std::collections::BTreeMap;
use tracing::{debug, info, trace};

/// Lower bound applied to every computed reload delay, in seconds.
pub const MIN_RELOAD_DELAY_SECS: f64 = 1.0;

/// How a variant is picked from a master playlist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VariantSelection {
    /// Smallest absolute bandwidth difference; ties go to the first listed.
    #[default]
    Closest,
    /// Highest bandwidth not above the preference. Falls back to the lowest
    /// bandwidth when every variant exceeds it.
    ClosestNotExceeding,
}

/// In-memory model of a master or media playlist.
///
/// A document is created empty for a playlist URL and fed with successive
/// [`update`](Self::update) calls. Segments accumulate across reloads and are
/// never renumbered; evicting them is the caller's job.
#[derive(Debug, Clone, Default)]
pub struct PlaylistDocument {
    variants: Vec<VariantRef>,
    segments: BTreeMap<u64, Segment>,
    first_sequence: Option<u64>,
    last_sequence: Option<u64>,
    target_duration: Option<u64>,
    end_of_stream: bool,
    reload_attempts: u32,
    last_reload_delay: Option<f64>,
    last_raw_content: Option<Bytes>,
}

impl PlaylistDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor: an empty document updated once with `content`.
    pub fn parse(content: impl Into<Bytes>) -> Result<Self, ParseError> {
        let mut document = Self::new();
        document.update(content)?;
        Ok(document)
    }

    /// Applies freshly fetched playlist content.
    ///
    /// Returns `Ok(false)` without touching the model when `content` is
    /// byte-identical to the previous content; this bumps the reload attempt
    /// counter that drives [`compute_reload_delay`](Self::compute_reload_delay).
    /// On a parse failure the document is left exactly as it was.
    pub fn update(&mut self, content: impl Into<Bytes>) -> Result<bool, ParseError> {
        let content = content.into();
        if self.last_raw_content.as_ref() == Some(&content) {
            self.reload_attempts += 1;
            debug!(attempts = self.reload_attempts, "Playlist content did not change");
            return Ok(false);
        }

        let parsed = parse(&content)?;
        self.reload_attempts = 0;
        self.last_raw_content = Some(content);
        self.apply(parsed);
        Ok(true)
    }

    fn apply(&mut self, parsed: ParsedPlaylist) {
        let ParsedPlaylist {
            variants,
            segments,
            target_duration,
            end_list,
        } = parsed;

        self.variants = variants;
        self.target_duration = target_duration;

        let mut new_sequences = Vec::new();
        let mut end_marked = false;
        for segment in segments {
            end_marked |= segment.is_last_in_stream;
            let sequence = segment.sequence_number;
            if self.set_segment(segment) {
                new_sequences.push(sequence);
            }
        }

        if end_list {
            if !end_marked
                && let Some(last) = self.last_sequence
                && let Some(segment) = self.segments.get_mut(&last)
            {
                segment.is_last_in_stream = true;
            }
            if !self.end_of_stream {
                info!(last_sequence = ?self.last_sequence, "Playlist reached end of stream");
            }
            self.end_of_stream = true;
        }

        if !new_sequences.is_empty() {
            debug!(
                count = new_sequences.len(),
                first = new_sequences.first(),
                last = new_sequences.last(),
                "New segments in playlist"
            );
        }
    }

    /// Inserts or overwrites a segment. Returns whether the sequence is new.
    fn set_segment(&mut self, segment: Segment) -> bool {
        let sequence = segment.sequence_number;
        self.first_sequence = Some(self.first_sequence.map_or(sequence, |f| f.min(sequence)));
        self.last_sequence = Some(self.last_sequence.map_or(sequence, |l| l.max(sequence)));
        let is_new = self.segments.insert(sequence, segment).is_none();
        if !is_new {
            trace!(sequence, "Segment overwritten by reload");
        }
        is_new
    }

    pub fn is_master(&self) -> bool {
        !self.variants.is_empty()
    }

    pub fn is_media(&self) -> bool {
        !self.segments.is_empty()
    }

    pub fn variants(&self) -> &[VariantRef] {
        &self.variants
    }

    pub fn segment(&self, sequence: u64) -> Option<&Segment> {
        self.segments.get(&sequence)
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    /// Drops segments below `sequence`. `first_sequence` and `last_sequence`
    /// keep their values; a later reload may insert dropped sequences again.
    pub fn discard_before(&mut self, sequence: u64) -> usize {
        let kept = self.segments.split_off(&sequence);
        let dropped = std::mem::replace(&mut self.segments, kept).len();
        if dropped > 0 {
            trace!(below = sequence, dropped, "Discarded consumed segments");
        }
        dropped
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn first_sequence(&self) -> Option<u64> {
        self.first_sequence
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn target_duration(&self) -> Option<u64> {
        self.target_duration
    }

    pub fn end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    pub fn reload_attempts(&self) -> u32 {
        self.reload_attempts
    }

    pub fn last_reload_delay(&self) -> Option<f64> {
        self.last_reload_delay
    }

    /// Picks the variant closest to `preferred_bps` by absolute difference.
    pub fn select_variant(&self, preferred_bps: u64) -> Result<&VariantRef, PlaylistError> {
        self.select_variant_with(preferred_bps, VariantSelection::Closest)
    }

    pub fn select_variant_with(
        &self,
        preferred_bps: u64,
        selection: VariantSelection,
    ) -> Result<&VariantRef, PlaylistError> {
        // `min_by_key` keeps the first of equal keys, which gives the tie-break.
        let selected = match selection {
            VariantSelection::Closest => self
                .variants
                .iter()
                .min_by_key(|v| v.bandwidth.abs_diff(preferred_bps)),
            VariantSelection::ClosestNotExceeding => self
                .variants
                .iter()
                .filter(|v| v.bandwidth <= preferred_bps)
                .min_by_key(|v| preferred_bps - v.bandwidth)
                .or_else(|| self.variants.iter().min_by_key(|v| v.bandwidth)),
        };
        selected.ok_or(PlaylistError::NoVariants)
    }

    /// Seconds to wait before re-fetching this playlist.
    ///
    /// The first poll after a content change waits
    /// `min(target_duration * 3, last segment duration)`. The first unchanged
    /// poll halves that delay; later unchanged polls wait 1.5 and then 3.0
    /// times the halved value. The result never drops below
    /// [`MIN_RELOAD_DELAY_SECS`].
    pub fn compute_reload_delay(&mut self) -> Result<f64, PlaylistError> {
        if self.end_of_stream {
            return Err(PlaylistError::NotReloadable {
                reason: "playlist has ended",
            });
        }
        let Some(last_sequence) = self.last_sequence else {
            return Err(PlaylistError::NotReloadable {
                reason: "playlist has no segments",
            });
        };

        let last_duration = self
            .segments
            .get(&last_sequence)
            .map(|s| s.duration_seconds)
            .unwrap_or_default();
        let fresh = match self.target_duration {
            Some(target) => (target as f64 * 3.0).min(last_duration),
            None => last_duration,
        };

        if self.reload_attempts == 0 {
            self.last_reload_delay = Some(fresh);
        }
        let base = self.last_reload_delay.unwrap_or(fresh);
        let halved = base * 0.5;
        let delay = match self.reload_attempts {
            0 => base,
            1 => halved,
            2 => halved * 1.5,
            _ => halved * 3.0,
        };

        let delay = delay.max(MIN_RELOAD_DELAY_SECS);
        debug!(
            delay_secs = delay,
            attempts = self.reload_attempts,
            "Computed playlist reload delay"
        );
        Ok(delay)
    }

    /// A fresh cursor over the segments, see [`SegmentCursor`].
    pub fn iter_segments(&self) -> Segments<'_> {
        Segments::new(self, SegmentCursor::new())
    }
}

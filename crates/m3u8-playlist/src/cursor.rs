// Segment cursor: walks a document's sequence numbers in order across reloads.

use crate::document::PlaylistDocument;
use crate::types::Segment;

/// Number of segments behind the live edge where a live cursor starts.
const LIVE_EDGE_OFFSET: u64 = 3;

/// Outcome of advancing a [`SegmentCursor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CursorStep<'a> {
    /// The next segment in sequence order. The cursor moved past it.
    Segment(&'a Segment),
    /// The next sequence number is not known yet. The cursor did not move;
    /// step again after the document has been reloaded.
    Gap,
    /// The segment marked last in stream has already been returned.
    Finished,
}

/// Position in a [`PlaylistDocument`] that survives document reloads.
///
/// The cursor anchors itself on the first step that sees segments: a live
/// playlist starts at `max(first_sequence, last_sequence - 3)`, an ended one
/// at `first_sequence`. After that it only ever moves forward by one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentCursor {
    next_sequence: Option<u64>,
    finished: bool,
}

impl SegmentCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cursor that starts at `sequence` instead of anchoring itself.
    pub fn starting_at(sequence: u64) -> Self {
        Self {
            next_sequence: Some(sequence),
            finished: false,
        }
    }

    /// The sequence number the next [`step`](Self::step) will look for, once
    /// anchored.
    pub fn next_sequence(&self) -> Option<u64> {
        self.next_sequence
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Moves the cursor to `sequence`. Only forward moves are honoured.
    pub fn seek(&mut self, sequence: u64) {
        if self.next_sequence.is_none_or(|next| sequence > next) {
            self.next_sequence = Some(sequence);
        }
    }

    pub fn step<'a>(&mut self, document: &'a PlaylistDocument) -> CursorStep<'a> {
        if self.finished {
            return CursorStep::Finished;
        }

        let next = match self.next_sequence {
            Some(next) => next,
            None => {
                let (Some(first), Some(last)) =
                    (document.first_sequence(), document.last_sequence())
                else {
                    return CursorStep::Gap;
                };
                let start = if document.end_of_stream() {
                    first
                } else {
                    first.max(last.saturating_sub(LIVE_EDGE_OFFSET))
                };
                self.next_sequence = Some(start);
                start
            }
        };

        match document.segment(next) {
            Some(segment) => {
                match next.checked_add(1) {
                    Some(following) => self.next_sequence = Some(following),
                    None => self.finished = true,
                }
                if segment.is_last_in_stream {
                    self.finished = true;
                }
                CursorStep::Segment(segment)
            }
            None => CursorStep::Gap,
        }
    }
}

/// Iterator form of [`SegmentCursor`] over a single document snapshot.
///
/// Yields `Some(segment)` for each available segment and `None` for a gap.
/// Gaps repeat until the end of the stream is reached, so a caller that does
/// not reload the document should stop at the first `None`. Iteration ends
/// immediately on a document without segments.
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    document: &'a PlaylistDocument,
    cursor: SegmentCursor,
}

impl<'a> Segments<'a> {
    pub(crate) fn new(document: &'a PlaylistDocument, cursor: SegmentCursor) -> Self {
        Self { document, cursor }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Option<&'a Segment>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.document.is_media() {
            return None;
        }
        match self.cursor.step(self.document) {
            CursorStep::Segment(segment) => Some(Some(segment)),
            CursorStep::Gap => Some(None),
            CursorStep::Finished => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(sequence: u64, count: u64) -> String {
        let mut out = format!("#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXT-X-MEDIA-SEQUENCE:{sequence}\n");
        for n in sequence..sequence + count {
            out.push_str(&format!("#EXTINF:4,\nseg{n}.ts\n"));
        }
        out
    }

    fn sequence_of(step: CursorStep<'_>) -> Option<u64> {
        match step {
            CursorStep::Segment(s) => Some(s.sequence_number),
            _ => None,
        }
    }

    #[test]
    fn live_cursor_starts_near_the_edge() {
        let doc = PlaylistDocument::parse(live(5, 10)).unwrap();
        let mut cursor = SegmentCursor::new();
        assert_eq!(sequence_of(cursor.step(&doc)), Some(11));
        assert_eq!(sequence_of(cursor.step(&doc)), Some(12));
    }

    #[test]
    fn short_live_playlist_starts_at_first() {
        let doc = PlaylistDocument::parse(live(7, 2)).unwrap();
        let mut cursor = SegmentCursor::new();
        assert_eq!(sequence_of(cursor.step(&doc)), Some(7));
    }

    #[test]
    fn ended_playlist_starts_at_first() {
        let mut content = live(0, 6);
        content.push_str("#EXT-X-ENDLIST\n");
        let doc = PlaylistDocument::parse(content).unwrap();
        let all: Vec<u64> = doc
            .iter_segments()
            .map(|s| s.unwrap().sequence_number)
            .collect();
        assert_eq!(all, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn gap_does_not_advance_and_resumes_after_reload() {
        let mut doc = PlaylistDocument::parse(live(0, 2)).unwrap();
        let mut cursor = SegmentCursor::new();
        assert_eq!(sequence_of(cursor.step(&doc)), Some(0));
        assert_eq!(sequence_of(cursor.step(&doc)), Some(1));
        assert_eq!(cursor.step(&doc), CursorStep::Gap);
        assert_eq!(cursor.step(&doc), CursorStep::Gap);
        assert_eq!(cursor.next_sequence(), Some(2));

        doc.update(live(1, 3)).unwrap();
        assert_eq!(sequence_of(cursor.step(&doc)), Some(2));
        assert_eq!(sequence_of(cursor.step(&doc)), Some(3));
        assert_eq!(cursor.step(&doc), CursorStep::Gap);
        assert_eq!(cursor.next_sequence(), Some(4));
    }

    #[test]
    fn cursor_finishes_after_last_in_stream() {
        let mut doc = PlaylistDocument::parse(live(0, 1)).unwrap();
        let mut cursor = SegmentCursor::new();
        assert_eq!(sequence_of(cursor.step(&doc)), Some(0));

        let mut ended = live(0, 2);
        ended.push_str("#EXT-X-ENDLIST\n");
        doc.update(ended).unwrap();
        assert_eq!(sequence_of(cursor.step(&doc)), Some(1));
        assert!(cursor.is_finished());
        assert_eq!(cursor.step(&doc), CursorStep::Finished);
    }

    #[test]
    fn cursor_finishes_at_maximum_sequence() {
        let doc = PlaylistDocument::parse(
            "#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXT-X-MEDIA-SEQUENCE:18446744073709551615\n#EXTINF:4,\nlast.ts\n",
        )
        .unwrap();
        let mut cursor = SegmentCursor::new();
        assert_eq!(sequence_of(cursor.step(&doc)), Some(u64::MAX));
        assert!(cursor.is_finished());
        assert_eq!(cursor.step(&doc), CursorStep::Finished);
    }

    #[test]
    fn cursor_waits_for_first_segments() {
        let mut doc = PlaylistDocument::parse("#EXTM3U\n#EXT-X-TARGETDURATION:4\n").unwrap();
        let mut cursor = SegmentCursor::new();
        assert_eq!(cursor.step(&doc), CursorStep::Gap);
        assert_eq!(cursor.next_sequence(), None);

        doc.update(live(20, 1)).unwrap();
        assert_eq!(sequence_of(cursor.step(&doc)), Some(20));
    }

    #[test]
    fn iterator_yields_gap_for_live_tail() {
        let doc = PlaylistDocument::parse(live(0, 2)).unwrap();
        let mut iter = doc.iter_segments();
        assert_eq!(iter.next().unwrap().unwrap().sequence_number, 0);
        assert_eq!(iter.next().unwrap().unwrap().sequence_number, 1);
        assert_eq!(iter.next(), Some(None));
    }

    #[test]
    fn iterator_over_master_is_empty() {
        let doc =
            PlaylistDocument::parse("#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\na.m3u8\n").unwrap();
        assert_eq!(doc.iter_segments().count(), 0);
    }

    #[test]
    fn seek_only_moves_forward() {
        let doc = PlaylistDocument::parse(live(0, 10)).unwrap();
        let mut cursor = SegmentCursor::starting_at(4);
        cursor.seek(2);
        assert_eq!(cursor.next_sequence(), Some(4));
        cursor.seek(8);
        assert_eq!(sequence_of(cursor.step(&doc)), Some(8));
    }

    #[test]
    fn explicit_start_skips_anchoring() {
        let doc = PlaylistDocument::parse(live(0, 10)).unwrap();
        let mut cursor = SegmentCursor::starting_at(2);
        assert_eq!(sequence_of(cursor.step(&doc)), Some(2));
    }
}

// Timing decisions for the engine: download pacing and playlist reload delay.

use crate::cache::SegmentCache;
use m3u8_playlist::{MIN_RELOAD_DELAY_SECS, PlaylistDocument, PlaylistError, Segment};
use std::time::Duration;
use tracing::debug;

const END_OF_STREAM_PACING: Duration = Duration::from_secs(1);

/// How long to wait before downloading segment `next`.
///
/// No wait while catching up, i.e. when either of the two sequences before
/// `next` is missing from the cache. Once caught up the loop paces itself:
/// one second per segment on an ended playlist, otherwise the declared
/// duration of the previously downloaded segment.
pub(crate) fn download_delay(
    cache: &SegmentCache,
    next: u64,
    previous: Option<&Segment>,
    end_of_stream: bool,
) -> Duration {
    let Some(previous) = previous else {
        return Duration::ZERO;
    };
    let caught_up = [1, 2]
        .iter()
        .all(|back| next.checked_sub(*back).is_some_and(|seq| cache.contains(seq)));
    if !caught_up {
        return Duration::ZERO;
    }
    if end_of_stream {
        END_OF_STREAM_PACING
    } else {
        previous.duration()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReloadPlan {
    After(Duration),
    /// The playlist has ended; it is never fetched again.
    Never,
}

/// When to fetch the media playlist next.
pub(crate) fn reload_plan(document: &mut PlaylistDocument) -> ReloadPlan {
    if document.end_of_stream() {
        return ReloadPlan::Never;
    }
    let secs = match document.compute_reload_delay() {
        Ok(secs) => secs,
        Err(PlaylistError::NotReloadable { reason }) => {
            // No segments yet: poll at the advertised target duration.
            let fallback = document
                .target_duration()
                .map(|target| target as f64)
                .unwrap_or(MIN_RELOAD_DELAY_SECS)
                .max(MIN_RELOAD_DELAY_SECS);
            debug!(reason, delay_secs = fallback, "Using fallback reload delay");
            fallback
        }
        Err(PlaylistError::NoVariants) => MIN_RELOAD_DELAY_SECS,
    };
    ReloadPlan::After(Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedSegment;
    use std::path::PathBuf;

    fn segment(sequence: u64, duration: f64) -> Segment {
        Segment {
            sequence_number: sequence,
            file_uri: format!("{sequence}.ts"),
            duration_seconds: duration,
            title: String::new(),
            discontinuity: false,
            is_last_in_stream: false,
        }
    }

    fn cache_of(sequences: &[u64]) -> SegmentCache {
        let mut cache = SegmentCache::default();
        for &sequence in sequences {
            cache.insert(CachedSegment {
                sequence_number: sequence,
                local_path: PathBuf::from(format!("{sequence}.ts")),
                segment: segment(sequence, 6.0),
            });
        }
        cache
    }

    #[test]
    fn first_download_is_immediate() {
        assert_eq!(
            download_delay(&SegmentCache::default(), 10, None, false),
            Duration::ZERO
        );
    }

    #[test]
    fn catching_up_is_immediate() {
        let previous = segment(4, 6.0);
        assert_eq!(
            download_delay(&cache_of(&[4]), 5, Some(&previous), false),
            Duration::ZERO
        );
        assert_eq!(
            download_delay(&cache_of(&[0]), 1, Some(&segment(0, 6.0)), false),
            Duration::ZERO
        );
    }

    #[test]
    fn caught_up_live_paces_by_previous_duration() {
        let previous = segment(4, 6.0);
        assert_eq!(
            download_delay(&cache_of(&[3, 4]), 5, Some(&previous), false),
            Duration::from_secs(6)
        );
    }

    #[test]
    fn caught_up_ended_paces_by_one_second() {
        let previous = segment(4, 6.0);
        assert_eq!(
            download_delay(&cache_of(&[3, 4]), 5, Some(&previous), true),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn ended_playlist_is_never_reloaded() {
        let mut doc = PlaylistDocument::parse(
            "#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXTINF:4,\na.ts\n#EXT-X-ENDLIST\n",
        )
        .unwrap();
        assert_eq!(reload_plan(&mut doc), ReloadPlan::Never);
    }

    #[test]
    fn empty_live_playlist_polls_at_target_duration() {
        let mut doc = PlaylistDocument::parse("#EXTM3U\n#EXT-X-TARGETDURATION:4\n").unwrap();
        assert_eq!(reload_plan(&mut doc), ReloadPlan::After(Duration::from_secs(4)));
    }

    #[test]
    fn live_playlist_uses_document_delay() {
        let mut doc = PlaylistDocument::parse(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:8,\na.ts\n",
        )
        .unwrap();
        assert_eq!(reload_plan(&mut doc), ReloadPlan::After(Duration::from_secs(8)));
    }
}

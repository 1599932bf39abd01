use std::collections::HashMap;
use std::time::Duration;

/// One entry of a master playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRef {
    /// Advertised `BANDWIDTH` in bits per second.
    pub bandwidth: u64,
    /// Media playlist URI, relative to the master playlist or absolute.
    pub uri: String,
    /// Every attribute of the `#EXT-X-STREAM-INF` line, `BANDWIDTH` included.
    pub attributes: HashMap<String, String>,
}

/// One media segment of a media playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub sequence_number: u64,
    pub file_uri: String,
    pub duration_seconds: f64,
    pub title: String,
    /// Set when an `#EXT-X-DISCONTINUITY` precedes this segment.
    pub discontinuity: bool,
    /// Set on the segment that precedes `#EXT-X-ENDLIST`.
    pub is_last_in_stream: bool,
}

impl Segment {
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_seconds).unwrap_or_default()
    }
}

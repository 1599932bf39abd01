use std::path::PathBuf;

/// Lifecycle of a [`FetchEngine`](crate::FetchEngine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    /// Fetching the root or the selected variant playlist.
    Loading,
    /// A master playlist was read and a variant chosen.
    MasterSelected,
    /// Reloading and downloading.
    Streaming,
    /// Every segment has been downloaded; pending requests are being settled.
    Draining,
    Stopped,
}

/// Notifications delivered through [`EngineHandle::subscribe`](crate::EngineHandle::subscribe).
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PlaylistRefreshed {
        first_sequence: Option<u64>,
        last_sequence: Option<u64>,
        end_of_stream: bool,
    },
    PlaylistUnchanged {
        attempts: u32,
    },
    SegmentDownloaded {
        sequence: u64,
        path: PathBuf,
    },
    SegmentEvicted {
        sequence: u64,
    },
    /// Retries for this segment were exhausted; the engine moved on.
    SegmentSkipped {
        sequence: u64,
        reason: String,
    },
    /// Sent once, after the last segment of an ended playlist.
    EndOfStream,
}

// HLS fetch engine: keeps a media playlist fresh, downloads its segments
// ahead of playback into a bounded local cache and serves them on demand.

mod cache;
pub mod config;
mod engine;
pub mod error;
pub mod events;
mod playlist;
pub mod retry;
mod scheduler;
pub mod storage;
pub mod transport;
mod waiters;

pub use cache::{CachedSegment, ReadySegment};
pub use config::{HlsConfig, HttpConfig, RetentionPolicy, WaiterMode};
pub use engine::{EngineHandle, FetchEngine};
pub use error::HlsError;
pub use events::{EngineEvent, EnginePhase};
pub use m3u8_playlist::{Segment, VariantSelection};
pub use playlist::resolve_uri;
pub use retry::RetryPolicy;
pub use storage::{DirectoryStore, SegmentStore, segment_file_name};
pub use transport::{HttpTransport, Transport};

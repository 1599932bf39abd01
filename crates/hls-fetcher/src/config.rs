use crate::error::HlsError;
use crate::retry::RetryPolicy;
use m3u8_playlist::VariantSelection;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("hls-fetcher/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_PREFERRED_BITRATE: u64 = 200_000;
pub const DEFAULT_KEEP: u64 = 3;

/// Which cached segments are deleted, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Never evict; every downloaded segment stays until the engine stops.
    Unlimited,
    /// After downloading `s`, evict everything at or below `s - keep`.
    DownloadWindow { keep: u64 },
    /// Evict only what the consumer has acknowledged through
    /// `notify_consumed`, keeping `keep` segments behind it.
    PlaybackWindow { keep: u64 },
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::DownloadWindow { keep: DEFAULT_KEEP }
    }
}

/// How `get_segment` calls that cannot be served from the cache wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WaiterMode {
    /// Every request waits independently.
    #[default]
    PerRequest,
    /// Only the newest request waits; older ones fail with
    /// [`HlsError::WaiterSuperseded`].
    SingleCursor,
}

/// HTTP settings for [`HttpTransport`](crate::HttpTransport).
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub user_agent: String,
    pub referer: Option<String>,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
    /// Whole-request timeout.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Keep cookies set by the server across requests.
    pub persist_cookies: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: None,
            headers: Vec::new(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            persist_cookies: true,
        }
    }
}

impl HttpConfig {
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_persist_cookies(mut self, persist: bool) -> Self {
        self.persist_cookies = persist;
        self
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct HlsConfig {
    /// Bitrate used to pick a variant from a master playlist, in bits per second.
    pub preferred_bitrate: u64,
    pub variant_selection: VariantSelection,
    pub retention: RetentionPolicy,
    pub waiter_mode: WaiterMode,
    /// Suspend downloads while this many cached segments lie beyond the
    /// consumer's last acknowledged sequence.
    pub max_buffered_ahead: Option<usize>,
    /// Applied to start-up playlist loads and to every segment download.
    pub retry: RetryPolicy,
    pub http: HttpConfig,
    /// Where segments are written. A temporary directory when unset.
    pub download_dir: Option<PathBuf>,
    /// Remove every cached file when the engine stops.
    pub cleanup_on_stop: bool,
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            preferred_bitrate: DEFAULT_PREFERRED_BITRATE,
            variant_selection: VariantSelection::default(),
            retention: RetentionPolicy::default(),
            waiter_mode: WaiterMode::default(),
            max_buffered_ahead: None,
            retry: RetryPolicy::default(),
            http: HttpConfig::default(),
            download_dir: None,
            cleanup_on_stop: true,
        }
    }
}

impl HlsConfig {
    pub fn with_preferred_bitrate(mut self, bps: u64) -> Self {
        self.preferred_bitrate = bps;
        self
    }

    pub fn with_variant_selection(mut self, selection: VariantSelection) -> Self {
        self.variant_selection = selection;
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_waiter_mode(mut self, mode: WaiterMode) -> Self {
        self.waiter_mode = mode;
        self
    }

    pub fn with_max_buffered_ahead(mut self, limit: usize) -> Self {
        self.max_buffered_ahead = Some(limit);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    pub fn with_cleanup_on_stop(mut self, cleanup: bool) -> Self {
        self.cleanup_on_stop = cleanup;
        self
    }

    pub fn validate(&self) -> Result<(), HlsError> {
        if let RetentionPolicy::DownloadWindow { keep: 0 } = self.retention {
            return Err(HlsError::configuration(
                "download window must keep at least one segment",
            ));
        }
        if let Some(0) = self.max_buffered_ahead {
            return Err(HlsError::configuration(
                "max_buffered_ahead must be at least 1",
            ));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(HlsError::configuration(
                "retry base_delay exceeds max_delay",
            ));
        }
        Ok(())
    }
}

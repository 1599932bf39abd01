use crate::error::{AppError, Result};
use clap::Parser;
use hls_fetcher::{
    HlsConfig, HttpConfig, RetentionPolicy, VariantSelection, WaiterMode,
    config::{DEFAULT_KEEP, DEFAULT_PREFERRED_BITRATE},
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// URL of the master or media playlist
    pub url: String,

    /// Preferred bitrate in bits per second, used to pick a variant
    #[arg(short, long, default_value_t = DEFAULT_PREFERRED_BITRATE)]
    pub bitrate: u64,

    /// Never pick a variant above the preferred bitrate
    #[arg(long)]
    pub max_bitrate: bool,

    /// Number of already downloaded segments to keep on disk
    #[arg(short, long, default_value_t = DEFAULT_KEEP, conflicts_with = "keep_all")]
    pub keep: u64,

    /// Keep every downloaded segment until exit
    #[arg(long)]
    pub keep_all: bool,

    /// Evict segments only after they have been played
    #[arg(long)]
    pub playback_aware: bool,

    /// Stop downloading while this many segments are waiting to be played
    #[arg(long)]
    pub max_ahead: Option<usize>,

    /// Directory for downloaded segments (a temporary directory by default)
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Leave downloaded segments on disk on exit
    #[arg(long)]
    pub keep_files: bool,

    /// Referer header sent with every request
    #[arg(long)]
    pub referer: Option<String>,

    /// Extra request header, `Name: Value`. May be repeated
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    pub headers: Vec<String>,

    /// Do not keep cookies between requests
    #[arg(long, env = "HLS_RESET_COOKIES")]
    pub reset_cookies: bool,

    /// Wait each segment's duration before requesting the next one
    #[arg(long)]
    pub realtime: bool,

    /// Verbose output (debug logging)
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| AppError::InvalidInput(format!("header `{raw}` is not `Name: Value`")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput(format!("header `{raw}` has no name")));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

impl Args {
    pub fn to_config(&self) -> Result<HlsConfig> {
        let mut http = HttpConfig::default().with_persist_cookies(!self.reset_cookies);
        if let Some(referer) = &self.referer {
            http = http.with_referer(referer);
        }
        for raw in &self.headers {
            let (name, value) = parse_header(raw)?;
            http = http.with_header(name, value);
        }

        let retention = match (self.keep_all, self.playback_aware) {
            (true, _) => RetentionPolicy::Unlimited,
            (false, true) => RetentionPolicy::PlaybackWindow { keep: self.keep },
            (false, false) => RetentionPolicy::DownloadWindow { keep: self.keep },
        };
        let selection = if self.max_bitrate {
            VariantSelection::ClosestNotExceeding
        } else {
            VariantSelection::Closest
        };

        let mut config = HlsConfig::default()
            .with_preferred_bitrate(self.bitrate)
            .with_variant_selection(selection)
            .with_retention(retention)
            .with_waiter_mode(WaiterMode::PerRequest)
            .with_http(http)
            .with_cleanup_on_stop(!self.keep_files);
        if let Some(path) = &self.path {
            config = config.with_download_dir(path);
        }
        if let Some(limit) = self.max_ahead {
            config = config.with_max_buffered_ahead(limit);
        }
        config.validate()?;
        Ok(config)
    }
}

use m3u8_playlist::{ParseError, PlaylistError};
use reqwest::StatusCode;

#[derive(Debug, Clone, thiserror::Error)]
pub enum HlsError {
    #[error("playlist parse error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("playlist error: {source}")]
    Playlist {
        #[from]
        source: PlaylistError,
    },

    #[error("transport error for {url}: {reason}")]
    Transport {
        url: String,
        reason: String,
        retryable: bool,
    },

    #[error("request failed with HTTP {status} for {url}")]
    Http { status: StatusCode, url: String },

    #[error("I/O error: {reason}")]
    Io { reason: String },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("unsupported playlist: {reason}")]
    UnsupportedPlaylist { reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("end of stream")]
    EndOfStream,

    #[error("engine stopped")]
    Stopped,

    #[error("request superseded by a newer one")]
    WaiterSuperseded,

    #[error("operation cancelled")]
    Cancelled,
}

impl HlsError {
    pub fn transport(url: impl Into<String>, reason: impl Into<String>, retryable: bool) -> Self {
        Self::Transport {
            url: url.into(),
            reason: reason.into(),
            retryable,
        }
    }

    pub fn http(status: StatusCode, url: impl Into<String>) -> Self {
        Self::Http {
            status,
            url: url.into(),
        }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported_playlist(reason: impl Into<String>) -> Self {
        Self::UnsupportedPlaylist {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { retryable, .. } => *retryable,
            Self::Http { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Io { .. } => true,
            Self::Parse { .. }
            | Self::Playlist { .. }
            | Self::InvalidUrl { .. }
            | Self::UnsupportedPlaylist { .. }
            | Self::Configuration { .. }
            | Self::EndOfStream
            | Self::Stopped
            | Self::WaiterSuperseded
            | Self::Cancelled => false,
        }
    }
}

impl From<std::io::Error> for HlsError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_status_class() {
        assert!(HlsError::http(StatusCode::BAD_GATEWAY, "u").is_retryable());
        assert!(HlsError::http(StatusCode::TOO_MANY_REQUESTS, "u").is_retryable());
        assert!(!HlsError::http(StatusCode::NOT_FOUND, "u").is_retryable());
    }

    #[test]
    fn transport_carries_its_own_classification() {
        assert!(HlsError::transport("u", "reset", true).is_retryable());
        assert!(!HlsError::transport("u", "redirect loop", false).is_retryable());
        assert!(!HlsError::EndOfStream.is_retryable());
    }

    #[test]
    fn parse_errors_convert() {
        let err: HlsError = ParseError::MissingHeader.into();
        assert!(matches!(err, HlsError::Parse { .. }));
        assert!(!err.is_retryable());
    }
}

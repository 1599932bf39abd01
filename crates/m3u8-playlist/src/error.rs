use thiserror::Error;

/// Errors produced while parsing playlist content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("playlist is not valid UTF-8: {reason}")]
    InvalidUtf8 { reason: String },

    #[error("missing header: first significant line must be #EXTM3U")]
    MissingHeader,

    #[error("invalid stream: no programs and no duration")]
    InvalidStream,

    #[error("invalid numeric value `{value}` for {directive}")]
    InvalidNumber {
        directive: &'static str,
        value: String,
    },

    #[error("{directive} is not followed by a URI line")]
    MissingUri { directive: &'static str },
}

/// Errors produced by queries against a parsed document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaylistError {
    #[error("master playlist has no variants")]
    NoVariants,

    #[error("playlist cannot be reloaded: {reason}")]
    NotReloadable { reason: &'static str },
}

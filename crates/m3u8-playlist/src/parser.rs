// Line-oriented M3U8 parser. Produces a `ParsedPlaylist` that the document
// merges into its accumulated state only when the whole parse succeeds.

use crate::attributes::parse_attribute_list;
use crate::error::ParseError;
use crate::types::{Segment, VariantRef};
use std::collections::HashMap;
use tracing::trace;

const HEADER: &str = "#EXTM3U";
const STREAM_INF: &str = "#EXT-X-STREAM-INF";
const TARGET_DURATION: &str = "#EXT-X-TARGETDURATION";
const MEDIA_SEQUENCE: &str = "#EXT-X-MEDIA-SEQUENCE";
const DISCONTINUITY: &str = "#EXT-X-DISCONTINUITY";
const EXTINF: &str = "#EXTINF";
const ENDLIST: &str = "#EXT-X-ENDLIST";

#[derive(Debug, Default)]
pub(crate) struct ParsedPlaylist {
    pub variants: Vec<VariantRef>,
    /// Segments in document order, sequence numbers already assigned.
    pub segments: Vec<Segment>,
    pub target_duration: Option<u64>,
    pub end_list: bool,
}

/// Yields the significant lines: directives (`#EXT...`) and URI lines.
/// Comments and blank lines are skipped.
fn significant_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(str::trim).filter(|line| {
        if line.is_empty() {
            return false;
        }
        line.starts_with("#EXT") || !line.starts_with('#')
    })
}

fn split_directive(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((tag, payload)) => (tag, payload.trim()),
        None => (line, ""),
    }
}

fn parse_integer(directive: &'static str, value: &str) -> Result<u64, ParseError> {
    value.parse::<u64>().map_err(|_| ParseError::InvalidNumber {
        directive,
        value: value.to_string(),
    })
}

fn parse_duration(value: &str) -> Result<f64, ParseError> {
    match value.parse::<f64>() {
        Ok(duration) if duration.is_finite() && duration >= 0.0 => Ok(duration),
        _ => Err(ParseError::InvalidNumber {
            directive: EXTINF,
            value: value.to_string(),
        }),
    }
}

fn take_uri<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    directive: &'static str,
) -> Result<&'a str, ParseError> {
    match lines.next() {
        Some(line) if !line.starts_with('#') => Ok(line),
        _ => Err(ParseError::MissingUri { directive }),
    }
}

pub(crate) fn parse(content: &[u8]) -> Result<ParsedPlaylist, ParseError> {
    let text = std::str::from_utf8(content).map_err(|e| ParseError::InvalidUtf8 {
        reason: e.to_string(),
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut lines = significant_lines(text);
    match lines.next() {
        Some(first) if first == HEADER => {}
        _ => return Err(ParseError::MissingHeader),
    }

    let mut parsed = ParsedPlaylist::default();
    // None once the sequence space is exhausted.
    let mut current_sequence: Option<u64> = Some(0);
    let mut pending_discontinuity = false;

    while let Some(line) = lines.next() {
        if !line.starts_with('#') {
            trace!(line, "Ignoring URI line without a preceding directive");
            continue;
        }

        let (tag, payload) = split_directive(line);
        match tag {
            STREAM_INF => {
                let attributes = parse_attribute_list(payload);
                let bandwidth = attributes
                    .iter()
                    .find(|(key, _)| key == "BANDWIDTH")
                    .map(|(_, value)| value.as_str())
                    .unwrap_or_default();
                let bandwidth = parse_integer(STREAM_INF, bandwidth)?;
                let uri = take_uri(&mut lines, STREAM_INF)?;
                parsed.variants.push(VariantRef {
                    bandwidth,
                    uri: uri.to_string(),
                    attributes: attributes.into_iter().collect::<HashMap<_, _>>(),
                });
            }
            TARGET_DURATION => {
                parsed.target_duration = Some(parse_integer(TARGET_DURATION, payload)?);
            }
            MEDIA_SEQUENCE => {
                current_sequence = Some(parse_integer(MEDIA_SEQUENCE, payload)?);
            }
            DISCONTINUITY => {
                pending_discontinuity = true;
            }
            EXTINF => {
                let (duration, title) = payload.split_once(',').unwrap_or((payload, ""));
                let duration_seconds = parse_duration(duration.trim())?;
                let uri = take_uri(&mut lines, EXTINF)?;
                let sequence_number =
                    current_sequence.ok_or_else(|| ParseError::InvalidNumber {
                        directive: MEDIA_SEQUENCE,
                        value: (u128::from(u64::MAX) + 1).to_string(),
                    })?;
                parsed.segments.push(Segment {
                    sequence_number,
                    file_uri: uri.to_string(),
                    duration_seconds,
                    title: title.trim().to_string(),
                    discontinuity: pending_discontinuity,
                    is_last_in_stream: false,
                });
                current_sequence = sequence_number.checked_add(1);
                pending_discontinuity = false;
            }
            ENDLIST => {
                if let Some(last) = parsed.segments.last_mut() {
                    last.is_last_in_stream = true;
                }
                parsed.end_list = true;
            }
            _ => {
                trace!(directive = tag, "Ignoring unsupported directive");
            }
        }
    }

    if parsed.variants.is_empty() && parsed.target_duration.is_none() {
        return Err(ParseError::InvalidStream);
    }

    Ok(parsed)
}

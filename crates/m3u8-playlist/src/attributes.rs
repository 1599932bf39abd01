// Attribute list tokenizer for directives such as `#EXT-X-STREAM-INF`.

use tracing::trace;

/// Parses a comma-separated `KEY=VALUE` attribute list.
///
/// Commas inside double quotes do not split. Keys are case-sensitive and
/// trimmed; values are trimmed and stripped of one pair of surrounding quotes.
/// Parts without a `=` are dropped. Order of appearance is preserved.
pub fn parse_attribute_list(input: &str) -> Vec<(String, String)> {
    let mut parts: Vec<&str> = Vec::new();
    let mut in_quotes = false;
    let mut start = 0usize;
    for (idx, ch) in input.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&input[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if start < input.len() {
        parts.push(&input[start..]);
    }

    let mut attributes = Vec::with_capacity(parts.len());
    for part in parts.into_iter().map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = part.split_once('=') else {
            trace!(part, "Dropping attribute without a value");
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let mut value = value.trim();
        if let Some(stripped) = value.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            value = stripped.trim();
        }
        attributes.push((key.to_string(), value.to_string()));
    }
    attributes
}

// M3U8 playlist model: parsing, reload bookkeeping and segment iteration.
pub mod attributes;
pub mod cursor;
pub mod document;
pub mod error;
mod parser;
pub mod types;

// Export common types for ease of use
pub use attributes::parse_attribute_list;
pub use cursor::{CursorStep, SegmentCursor, Segments};
pub use document::{MIN_RELOAD_DELAY_SECS, PlaylistDocument, VariantSelection};
pub use error::{ParseError, PlaylistError};
pub use types::{Segment, VariantRef};

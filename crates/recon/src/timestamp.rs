use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};

/// Offsets the issuing systems append to `dhEmi`. Anything else is left in
/// place and makes the strict parse fail.
const KNOWN_OFFSETS: [&str; 2] = ["-03:00", "-04:00"];

const FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Display format for report cells.
pub const DISPLAY_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Issuance timestamp, or the original text when it did not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuedAt {
    Parsed(NaiveDateTime),
    Raw(String),
}

impl IssuedAt {
    pub fn parse(text: &str) -> Self {
        match parse_issued_at(text) {
            Some(dt) => Self::Parsed(dt),
            None => Self::Raw(text.to_string()),
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::Parsed(dt) => Some(dt.date()),
            Self::Raw(_) => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Raw(_))
    }
}

impl fmt::Display for IssuedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsed(dt) => write!(f, "{}", dt.format(DISPLAY_FORMAT)),
            Self::Raw(text) => f.write_str(text),
        }
    }
}

impl Serialize for IssuedAt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Strip a known trailing offset, then try `T`-separated and space-separated
/// layouts.
pub fn parse_issued_at(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    let bare = KNOWN_OFFSETS
        .iter()
        .find_map(|offset| trimmed.strip_suffix(offset))
        .unwrap_or(trimmed);
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(bare, fmt).ok())
}

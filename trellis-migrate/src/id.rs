//! Migration identifiers.
//!
//! An identifier is the leading run of digit groups in a file name,
//! separated by `_`: `20260101_001_create_reviews.toml` has identifier
//! `20260101_001` and slug `create_reviews`. Identifiers compare numerically
//! group by group, so timestamp-prefixed names sort chronologically.

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use trellis_core::{MigrationError, TrellisError, TrellisResult};

/// Orderable migration identifier.
#[derive(Debug, Clone)]
pub struct MigrationId {
    raw: String,
    groups: Vec<u64>,
}

impl MigrationId {
    /// Parse an identifier made only of digit groups.
    pub fn parse(raw: &str) -> TrellisResult<Self> {
        let groups = raw
            .split('_')
            .map(parse_group)
            .collect::<Option<Vec<u64>>>()
            .ok_or_else(|| invalid(raw))?;
        Ok(Self {
            raw: raw.to_string(),
            groups,
        })
    }

    /// Split a file stem into identifier and slug.
    pub fn split_stem(stem: &str) -> TrellisResult<(Self, String)> {
        let mut groups = Vec::new();
        let mut digits = Vec::new();
        let mut rest = Vec::new();
        for part in stem.split('_') {
            match parse_group(part) {
                Some(group) if rest.is_empty() => {
                    groups.push(group);
                    digits.push(part);
                }
                _ => rest.push(part),
            }
        }
        if groups.is_empty() {
            return Err(invalid(stem));
        }
        Ok((
            Self {
                raw: digits.join("_"),
                groups,
            },
            rest.join("_"),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn parse_group(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

fn invalid(name: &str) -> TrellisError {
    MigrationError::InvalidFileName {
        name: name.to_string(),
    }
    .into()
}

// Equality follows the numeric groups: `001` and `1` are the same migration.
impl PartialEq for MigrationId {
    fn eq(&self, other: &Self) -> bool {
        self.groups == other.groups
    }
}

impl Eq for MigrationId {}

impl std::hash::Hash for MigrationId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.groups.hash(state);
    }
}

impl Ord for MigrationId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.groups.cmp(&other.groups)
    }
}

impl PartialOrd for MigrationId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for MigrationId {
    type Err = TrellisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MigrationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

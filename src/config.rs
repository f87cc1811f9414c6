//! Rotator configuration.
//!
//! [`RotatorConfig`] is serde-loadable so callers can embed it in their own
//! configuration files; every field also has an obvious struct-literal shape
//! for programmatic use. Validation runs once, at
//! [`Rotator::new`](crate::Rotator::new), so malformed values never survive
//! construction.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::frequency::Frequency;

/// Strategy used to move live content into an archive file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Rename the live file to the archive path, then create a fresh empty
    /// file at the original path. A writer holding an open handle keeps
    /// writing into the archived file; a writer that reopens by path starts
    /// fresh.
    Create,
    /// Copy the live file's bytes to the archive path, then truncate the live
    /// file in place. Appends racing the copy/truncate window land in either
    /// the archive or the post-truncate file, never both.
    #[default]
    CopyTruncate,
    /// Like [`Behavior::CopyTruncate`] but streams through gzip into the
    /// archive. The race window widens by compression latency.
    CopyCompressTruncate,
}

impl FromStr for Behavior {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Behavior::Create),
            "copy_truncate" => Ok(Behavior::CopyTruncate),
            "copy_compress_truncate" => Ok(Behavior::CopyCompressTruncate),
            other => Err(Error::validation(format!(
                "behavior not recognized: {other:?} (expected create, copy_truncate or copy_compress_truncate)"
            ))),
        }
    }
}

/// Configuration for a [`Rotator`](crate::Rotator).
///
/// `file_path`, `dir_path` and `state_file_path` are always explicit; nothing
/// here defaults to the current working directory. At least one of
/// `frequency` / `max_size` must be set or the rotator would never trigger.
#[derive(Debug, Clone, Deserialize)]
pub struct RotatorConfig {
    /// Live file to manage.
    pub file_path: PathBuf,
    /// Directory receiving archives. Created recursively at startup when
    /// absent.
    pub dir_path: PathBuf,
    /// Location of the persisted state document.
    pub state_file_path: PathBuf,
    /// Boundary-based trigger; absent disables time-based rotation.
    #[serde(default)]
    pub frequency: Option<Frequency>,
    /// Byte threshold enabling size-based rotation. Accepts a numeric byte
    /// count or a string with a k/m/g suffix.
    #[serde(default, deserialize_with = "deserialize_max_size")]
    pub max_size: Option<u64>,
    /// Maximum tracked archives before the oldest are evicted.
    #[serde(default)]
    pub files_limit: Option<usize>,
    /// Maximum archive age before eviction. Accepts a number of seconds or a
    /// string with an s/m/h/d suffix.
    #[serde(default, deserialize_with = "deserialize_max_age")]
    pub max_age: Option<Duration>,
    /// Rotation strategy.
    #[serde(default)]
    pub behavior: Behavior,
    /// Text encoding of the live file. Only UTF-8 is supported; all file I/O
    /// is byte-faithful regardless.
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

impl RotatorConfig {
    /// Check the configuration for problems that should fail construction.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.frequency.is_none() && self.max_size.is_none() {
            return Err(Error::validation(
                "neither frequency nor max_size is set; the rotator would never trigger",
            ));
        }
        if self.max_size == Some(0) {
            return Err(Error::validation("max_size must be at least 1 byte"));
        }
        if !matches!(
            self.encoding.to_ascii_lowercase().as_str(),
            "utf-8" | "utf8"
        ) {
            return Err(Error::validation(format!(
                "encoding not supported: {:?} (only utf-8)",
                self.encoding
            )));
        }
        Ok(())
    }
}

/// Parse a size given as a byte count or with a k/m/g suffix (powers of 1024).
pub fn parse_size(raw: &str) -> Result<u64> {
    let normalized = raw.trim().to_ascii_lowercase();
    let (digits, multiplier) = match normalized.as_bytes().last() {
        Some(b'k') => (&normalized[..normalized.len() - 1], 1024u64),
        Some(b'm') => (&normalized[..normalized.len() - 1], 1024 * 1024),
        Some(b'g') => (&normalized[..normalized.len() - 1], 1024 * 1024 * 1024),
        _ => (normalized.as_str(), 1),
    };
    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .filter(|bytes| *bytes > 0)
        .ok_or_else(|| {
            Error::validation(format!(
                "max_size not recognized: {raw:?} (expected bytes or a value like \"100k\", \"5m\", \"1g\")"
            ))
        })
}

/// Parse a duration given as seconds or with an s/m/h/d suffix.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let normalized = raw.trim().to_ascii_lowercase();
    let (digits, unit_secs) = match normalized.as_bytes().last() {
        Some(b's') => (&normalized[..normalized.len() - 1], 1u64),
        Some(b'm') => (&normalized[..normalized.len() - 1], 60),
        Some(b'h') => (&normalized[..normalized.len() - 1], 60 * 60),
        Some(b'd') => (&normalized[..normalized.len() - 1], 24 * 60 * 60),
        _ => (normalized.as_str(), 1),
    };
    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(unit_secs))
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| {
            Error::validation(format!(
                "duration not recognized: {raw:?} (expected seconds or a value like \"30s\", \"12h\", \"7d\")"
            ))
        })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

fn deserialize_max_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(bytes)) => Ok(Some(bytes)),
        Some(NumberOrString::Text(raw)) => parse_size(&raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn deserialize_max_age<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(secs)) => Ok(Some(Duration::from_secs(secs))),
        Some(NumberOrString::Text(raw)) => parse_duration(&raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

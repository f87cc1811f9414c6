//! Archive name formatting.
//!
//! The naming function is an injected strategy: callers can supply their own
//! [`NameFormatter`] to control archive file names, with
//! [`default_formatter`] as the documented default.

use std::sync::Arc;

use chrono::{DateTime, Local};

/// Inputs handed to a [`NameFormatter`] for one rotation.
#[derive(Debug, Clone, Copy)]
pub struct NameParts<'a> {
    /// Base name of the live file, without extension.
    pub name: &'a str,
    /// Extension of the live file, without the leading dot.
    pub extension: Option<&'a str>,
    /// Local time of the rotation.
    pub date: Option<DateTime<Local>>,
    /// Same-day ordinal, present under high-frequency or size-triggered
    /// configurations.
    pub sequence_number: Option<u32>,
}

/// Pluggable archive naming strategy.
///
/// Called once per rotation with the parts for that rotation; returns the
/// archive file name (no directory component). The compressed behavior
/// appends `.gz` to the returned name afterwards.
pub type NameFormatter = Arc<dyn Fn(&NameParts<'_>) -> String + Send + Sync>;

/// The default [`NameFormatter`].
///
/// Produces `<base>.<YYYY-MM-DD>.<sequenceNumber>.<extension>`, omitting any
/// segment that is not applicable.
pub fn default_formatter() -> NameFormatter {
    Arc::new(format_archive_name)
}

fn format_archive_name(parts: &NameParts<'_>) -> String {
    let mut segments: Vec<String> = Vec::with_capacity(4);
    if !parts.name.is_empty() {
        segments.push(parts.name.to_string());
    }
    if let Some(date) = parts.date {
        segments.push(date.format("%Y-%m-%d").to_string());
    }
    if let Some(number) = parts.sequence_number {
        segments.push(number.to_string());
    }
    if let Some(extension) = parts.extension {
        segments.push(extension.to_string());
    }
    segments.join(".")
}

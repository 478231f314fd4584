//! Parameter entries and their textual rendering.

use chrono::{DateTime, Utc};

/// Display format for a parameter's last-modified timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Display format for the dates inside a rendered history.
pub const HISTORY_DATE_FORMAT: &str = "%Y-%m-%d";

/// One output row: `[timestamp] name [value] [history]`.
pub type Row = Vec<String>;

/// A previous (or current) version of a parameter's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub last_modified: DateTime<Utc>,
    pub value: String,
}

impl HistoryEntry {
    /// Renders as `(YYYY-MM-DD, value)`.
    pub fn render(&self) -> String {
        format!(
            "({}, {})",
            self.last_modified.format(HISTORY_DATE_FORMAT),
            self.value
        )
    }
}

/// A named remote entry as assembled by a listing.
///
/// `value` and `history` are `None` unless the listing asked for them; an
/// empty string or an empty history is a resolved, genuinely empty result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub value: Option<String>,
    pub history: Option<Vec<HistoryEntry>>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            last_modified,
            value: None,
            history: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = Some(history);
        self
    }

    /// Renders this parameter as an output row.
    pub fn to_row(&self, show_timestamp: bool, strip: bool) -> Row {
        let mut row = Vec::with_capacity(4);
        if show_timestamp {
            row.push(self.last_modified.format(TIMESTAMP_FORMAT).to_string());
        }
        let name = if strip {
            strip_prefix(&self.name)
        } else {
            &self.name
        };
        row.push(name.to_string());
        if let Some(value) = &self.value {
            row.push(value.clone());
        }
        if let Some(history) = &self.history {
            row.push(render_history(history));
        }
        row
    }
}

/// Returns the last `/`-delimited segment of a parameter path.
pub fn strip_prefix(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Comma-joins rendered history entries.
pub fn render_history(history: &[HistoryEntry]) -> String {
    history
        .iter()
        .map(HistoryEntry::render)
        .collect::<Vec<_>>()
        .join(", ")
}

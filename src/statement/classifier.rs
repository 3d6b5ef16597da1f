//! Statement kind classification.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

// Tested in this order; the first match wins.
static EXECUTE_JAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*execute\s+jar\b").expect("Invalid regex pattern"));
static ADD_FILE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*add\s+file\s+\S").expect("Invalid regex pattern"));
static ADD_JAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*add\s+(?:customjar|jar)\s+\S").expect("Invalid regex pattern")
});

/// Closed set of statement kinds the submitter dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// `ADD JAR '<path>'` / `ADD CUSTOMJAR '<path>'`
    Add,
    /// `ADD FILE '<path>'`
    AddFile,
    /// `EXECUTE JAR ...`
    ExecuteJar,
    /// Anything else: DDL, DML, queries, `SET`, ...
    Standard,
}

impl StatementKind {
    pub const ALL: [StatementKind; 4] = [
        StatementKind::Add,
        StatementKind::AddFile,
        StatementKind::ExecuteJar,
        StatementKind::Standard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::AddFile => "ADD_FILE",
            Self::ExecuteJar => "EXECUTE_JAR",
            Self::Standard => "STANDARD",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify raw statement text. Total and side-effect free.
pub fn classify(text: &str) -> StatementKind {
    if EXECUTE_JAR_PATTERN.is_match(text) {
        StatementKind::ExecuteJar
    } else if ADD_FILE_PATTERN.is_match(text) {
        StatementKind::AddFile
    } else if ADD_JAR_PATTERN.is_match(text) {
        StatementKind::Add
    } else {
        StatementKind::Standard
    }
}

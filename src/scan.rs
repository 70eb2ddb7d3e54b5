//! Per-file line extraction, the routine behind `para scan`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use serde::Serialize;

use crate::process::Process;

/// A line that passed the filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineMatch {
    pub path: PathBuf,
    /// 1-based line number.
    pub line_no: usize,
    pub line: String,
}

/// Yields every line of a file that is at least `min_len` characters long
/// and, when set, contains `contains`.
#[derive(Debug, Clone, Default)]
pub struct LineFilter {
    pub min_len: usize,
    pub contains: Option<String>,
}

impl LineFilter {
    fn matches(&self, line: &str) -> bool {
        line.chars().count() >= self.min_len
            && self
                .contains
                .as_deref()
                .is_none_or(|needle| line.contains(needle))
    }
}

impl Process<PathBuf> for LineFilter {
    type Value = LineMatch;
    type Error = std::io::Error;
    type Values = Box<dyn Iterator<Item = std::io::Result<LineMatch>>>;

    fn process(&self, path: PathBuf) -> Self::Values {
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                let err = std::io::Error::new(e.kind(), format!("{}: {e}", path.display()));
                return Box::new(std::iter::once(Err(err)));
            }
        };

        let filter = self.clone();
        let lines = BufReader::new(file).lines().enumerate();
        Box::new(lines.filter_map(move |(idx, line)| match line {
            Ok(line) if filter.matches(&line) => Some(Ok(LineMatch {
                path: path.clone(),
                line_no: idx + 1,
                line,
            })),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        }))
    }
}

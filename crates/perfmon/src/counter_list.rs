//! Counter list file parsing
//!
//! One record per line, `index,name`. The index is decimal or `0x`-prefixed
//! hex; the name is everything after the first comma and may be empty.
//! Lines without a comma or with a bad index are skipped.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{PerfMonError, Result};
use crate::types::CounterIndex;

/// Named counter from the list file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterEntry {
    /// Hardware counter index
    pub index: CounterIndex,
    /// Label printed next to the value
    pub name: String,
}

impl CounterEntry {
    pub fn new(index: CounterIndex, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

/// Parse a single `index,name` record.
///
/// Returns `None` for lines without a comma or with an index that does not
/// parse. An empty name is kept; the counter is still read and printed.
pub fn parse_line(line: &str) -> Option<CounterEntry> {
    let (index, name) = line.split_once(',')?;
    let index = index.parse::<CounterIndex>().ok()?;
    Some(CounterEntry::new(index, name.trim()))
}

/// Parse the whole list, skipping malformed lines
pub fn parse_counter_list(content: &str) -> Vec<CounterEntry> {
    let mut entries = Vec::new();

    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(entry) => entries.push(entry),
            None if line.contains(',') => {
                warn!("Skipping malformed counter list line {}: {:?}", lineno + 1, line);
            }
            None => {
                debug!("Skipping line {} without separator", lineno + 1);
            }
        }
    }

    entries
}

/// Load and parse a counter list file
pub fn load_counter_list(path: impl AsRef<Path>) -> Result<Vec<CounterEntry>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        PerfMonError::CounterList(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let entries = parse_counter_list(&content);
    debug!("Loaded {} counters from {}", entries.len(), path.display());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_line() {
        let entry = parse_line("12,cycles").unwrap();
        assert_eq!(entry, CounterEntry::new(CounterIndex::new(12), "cycles"));
    }

    #[test]
    fn test_parse_hex_line() {
        let entry = parse_line("0x1f,instret").unwrap();
        assert_eq!(entry.index, CounterIndex::new(31));
        assert_eq!(entry.name, "instret");
    }

    #[test]
    fn test_hex_and_decimal_lines_agree() {
        let hex = parse_line("0x10,a").unwrap();
        let dec = parse_line("16,a").unwrap();
        assert_eq!(hex.index, dec.index);
    }

    #[test]
    fn test_name_keeps_later_commas() {
        let entry = parse_line("1,dcache miss, load").unwrap();
        assert_eq!(entry.name, "dcache miss, load");
    }

    #[test]
    fn test_name_trimmed() {
        let entry = parse_line("1, branch mispredicts \r").unwrap();
        assert_eq!(entry.name, "branch mispredicts");
    }

    #[test]
    fn test_line_without_separator_skipped() {
        assert!(parse_line("cycles").is_none());
        assert!(parse_line("0x10").is_none());
    }

    #[test]
    fn test_bad_index_skipped() {
        assert!(parse_line("cycles,0x10").is_none());
        assert!(parse_line(",name").is_none());
    }

    #[test]
    fn test_empty_name_kept() {
        assert_eq!(
            parse_line("3,"),
            Some(CounterEntry::new(CounterIndex::new(3), ""))
        );
        assert_eq!(
            parse_line("0x3,   \r"),
            Some(CounterEntry::new(CounterIndex::new(3), ""))
        );
        assert_eq!(parse_counter_list("1,a\n2,\n").len(), 2);
    }

    #[test]
    fn test_parse_counter_list() {
        let content = "0x0,cycles\n\nbogus line\n1,instret\nnot,valid\n0x2,tlb misses\n";
        let entries = parse_counter_list(content);
        assert_eq!(
            entries,
            vec![
                CounterEntry::new(CounterIndex::new(0), "cycles"),
                CounterEntry::new(CounterIndex::new(1), "instret"),
                CounterEntry::new(CounterIndex::new(2), "tlb misses"),
            ]
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_counter_list("/nonexistent/counters.txt").unwrap_err();
        assert!(matches!(err, PerfMonError::CounterList(_)));
    }
}

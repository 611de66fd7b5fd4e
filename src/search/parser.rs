//! Parsing of zoekt's `path:line:content` result lines.

use regex::Regex;
use std::sync::LazyLock;
use tracing::trace;

static RESULT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:]+):(\d+):(.*)$").expect("result line pattern is valid"));

/// One search hit as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    /// File reference as printed, relative or absolute
    pub path: String,
    /// 1-based line number
    pub line: u32,
    /// Line content, trimmed
    pub content: String,
}

/// Parse accumulated search output into records, in input order.
///
/// Blank lines and lines that are not `path:line:content` (summaries,
/// warnings) are skipped. So are hits claiming line 0, which the engine never
/// reports for a real match.
pub fn parse_output(raw: &str) -> Vec<MatchRecord> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let record = parse_line(line);
            if record.is_none() {
                trace!(line = line, "Skipping non-result line");
            }
            record
        })
        .collect()
}

/// Parse a single result line
pub fn parse_line(line: &str) -> Option<MatchRecord> {
    let captures = RESULT_LINE.captures(line)?;
    let line_number: u32 = captures[2].parse().ok()?;
    if line_number == 0 {
        return None;
    }
    Some(MatchRecord {
        path: captures[1].to_string(),
        line: line_number,
        content: captures[3].trim().to_string(),
    })
}

//! Quick-pick style rendering of search results.

use crate::search::orchestrator::SearchResults;
use crate::search::resolver::ResolvedMatch;
use serde::Serialize;

pub const NO_RESULTS_MESSAGE: &str = "No results found";

/// One entry of the result list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuickPickItem {
    /// File name
    pub label: String,
    /// `path:line` as reported by the engine
    pub description: String,
    /// Matched line content
    pub detail: String,
}

impl From<&ResolvedMatch> for QuickPickItem {
    fn from(m: &ResolvedMatch) -> Self {
        let label = m
            .absolute_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| m.record.path.clone());

        Self {
            label,
            description: format!("{}:{}", m.record.path, m.record.line),
            detail: m.record.content.clone(),
        }
    }
}

pub fn items(results: &SearchResults) -> Vec<QuickPickItem> {
    results.matches.iter().map(QuickPickItem::from).collect()
}

/// Render results as a list for the terminal
pub fn render(results: &SearchResults) -> String {
    if results.is_empty() {
        return NO_RESULTS_MESSAGE.to_string();
    }

    let mut out = format!("Select a result ({} matches found)\n", results.len());
    for (i, item) in items(results).iter().enumerate() {
        out.push_str(&format!(
            "{:>4}. {}  {}\n        {}\n",
            i + 1,
            item.label,
            item.description,
            item.detail
        ));
    }
    out
}

pub mod orchestrator;
pub mod parser;
pub mod present;
pub mod resolver;

pub use orchestrator::{SearchError, SearchOrchestrator, SearchResults};
pub use parser::{parse_line, parse_output, MatchRecord};
pub use present::{render, QuickPickItem, NO_RESULTS_MESSAGE};
pub use resolver::{resolve_all, resolve_path, ResolvedMatch};

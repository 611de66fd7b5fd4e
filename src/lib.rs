//! Keeps zoekt code-search indexes in sync with a set of workspace roots and
//! runs queries against them.
//!
//! - [`index`]: one scheduler actor per workspace root decides when
//!   `zoekt-index` runs. File changes are debounced, cron schedules trigger
//!   periodic rebuilds and a build is never started while one is in flight.
//! - [`process`]: subprocess driving and heuristic classification of the
//!   tools' stderr chatter.
//! - [`search`]: runs `zoekt`, parses `path:line:content` output and maps
//!   each hit to an existing file under one of the roots.

pub mod config;
pub mod index;
pub mod notifier;
pub mod process;
pub mod search;
pub mod telemetry;
pub mod utils;

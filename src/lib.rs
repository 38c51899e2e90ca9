//! Single-URL phishing risk scanner.
//!
//! A URL is normalized, checked for resolvability, and then handed to five
//! independent analyzers (lexical heuristics, domain intelligence, TLS,
//! typosquatting, page content) whose score deltas are summed into a
//! verdict. See [`scan::Scanner`] for the entry point.

pub mod analyzers;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gate;
pub mod normalize;
pub mod render;
pub mod report;
pub mod scan;
pub mod similarity;
pub mod telemetry;
pub mod verdict;

pub use config::ScoringPolicy;
pub use error::{Result, ScanError};
pub use report::ScanReport;
pub use scan::Scanner;
pub use verdict::Verdict;

use std::time::Duration;

use thiserror::Error;

use crate::analyzers::AnalyzerKind;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("domain does not resolve: {0}")]
    UnresolvableDomain(String),

    #[error("{analyzer} analyzer timed out after {budget:?}")]
    AnalyzerTimeout {
        analyzer: AnalyzerKind,
        budget: Duration,
    },

    #[error("{analyzer} network failure: {reason}")]
    AnalyzerNetworkFailure {
        analyzer: AnalyzerKind,
        reason: String,
    },

    #[error("internal analysis module failure: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ScanError {
    pub fn network(analyzer: AnalyzerKind, reason: impl ToString) -> Self {
        ScanError::AnalyzerNetworkFailure {
            analyzer,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

//! The one shape every scan ends in, whatever happened along the way.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analyzers::{
    AnalyzerKind, AnalyzerOutcome, DomainSummary, Evidence, OutcomeStatus, TlsSummary,
};
use crate::verdict::{Aggregate, Verdict, ERROR_SCORE, INVALID_SCORE, UNRESOLVABLE_SCORE};

pub const ENGINE_NAME: &str = "URL Phishing Detector";

/// Compact per-analyzer status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyzerStatus {
    pub analyzer: AnalyzerKind,
    pub status: OutcomeStatus,
    pub score: u32,
}

/// A signal as reported: who raised it, what it says, what it added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedSignal {
    pub analyzer: Option<AnalyzerKind>,
    pub message: String,
    pub delta: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub engine: String,
    pub version: String,
    pub scanned_at: DateTime<Utc>,
    pub input: String,
    pub normalized_url: Option<String>,
    pub score: u8,
    pub verdict: Verdict,
    pub signals: Vec<ReportedSignal>,
    pub analyzers: Vec<AnalyzerStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSummary>,
    pub elapsed_ms: u64,
}

impl ScanReport {
    fn terminal(
        input: &str,
        normalized_url: Option<String>,
        score: u8,
        verdict: Verdict,
        reason: &str,
    ) -> Self {
        Self {
            engine: ENGINE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            scanned_at: Utc::now(),
            input: input.to_string(),
            normalized_url,
            score,
            verdict,
            signals: vec![ReportedSignal {
                analyzer: None,
                message: reason.to_string(),
                delta: u32::from(score),
            }],
            analyzers: Vec::new(),
            domain: None,
            tls: None,
            elapsed_ms: 0,
        }
    }

    pub fn invalid(input: &str) -> Self {
        Self::terminal(input, None, INVALID_SCORE, Verdict::Invalid, "Invalid or empty URL")
    }

    /// Every analyzer in `skipped` is listed but never ran.
    pub fn unresolvable(input: &str, normalized_url: &str, skipped: &[AnalyzerKind]) -> Self {
        let mut report = Self::terminal(
            input,
            Some(normalized_url.to_string()),
            UNRESOLVABLE_SCORE,
            Verdict::HighRisk,
            "Domain does not resolve",
        );
        report.analyzers = skipped
            .iter()
            .map(|&analyzer| AnalyzerStatus {
                analyzer,
                status: OutcomeStatus::Skipped,
                score: 0,
            })
            .collect();
        report
    }

    /// Partial analyzer results are discarded.
    pub fn internal_error(input: &str, normalized_url: &str) -> Self {
        Self::terminal(
            input,
            Some(normalized_url.to_string()),
            ERROR_SCORE,
            Verdict::Error,
            "internal analysis module failure",
        )
    }

    pub fn from_aggregate(input: &str, normalized_url: &str, agg: Aggregate) -> Self {
        let analyzers = agg
            .outcomes
            .iter()
            .map(|o| AnalyzerStatus {
                analyzer: o.analyzer,
                status: o.status,
                score: o.score,
            })
            .collect();

        Self {
            engine: ENGINE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            scanned_at: Utc::now(),
            input: input.to_string(),
            normalized_url: Some(normalized_url.to_string()),
            score: agg.score,
            verdict: agg.verdict,
            signals: agg
                .signals
                .into_iter()
                .map(|s| ReportedSignal {
                    analyzer: Some(s.analyzer),
                    message: s.message,
                    delta: s.delta,
                })
                .collect(),
            analyzers,
            domain: domain_summary(&agg.outcomes),
            tls: tls_summary(&agg.outcomes),
            elapsed_ms: 0,
        }
    }

    pub fn with_elapsed(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Signals that moved the score.
    pub fn scored_signals(&self) -> impl Iterator<Item = &ReportedSignal> {
        self.signals.iter().filter(|s| s.delta > 0)
    }
}

fn domain_summary(outcomes: &[AnalyzerOutcome]) -> Option<DomainSummary> {
    outcomes.iter().find_map(|o| match &o.evidence {
        Some(Evidence::Domain(summary)) => Some(summary.clone()),
        _ => None,
    })
}

fn tls_summary(outcomes: &[AnalyzerOutcome]) -> Option<TlsSummary> {
    outcomes.iter().find_map(|o| match &o.evidence {
        Some(Evidence::Tls(summary)) => Some(summary.clone()),
        _ => None,
    })
}

//! The independent probes a scan fans out to once the gate has passed.
//!
//! Each analyzer reads the same immutable [`ScanContext`] and produces exactly
//! one [`AnalyzerOutcome`]. Analyzers share no mutable state, so the
//! orchestrator is free to run them concurrently.

pub mod domain_intel;
pub mod heuristics;
pub mod html;
pub mod tls;
pub mod typosquat;
pub mod whois;

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use serde::Serialize;

use crate::config::FailureMode;
use crate::error::Result;
use crate::normalize::ScanRequest;

pub use domain_intel::{DomainIntelAnalyzer, DomainSummary};
pub use heuristics::HeuristicAnalyzer;
pub use html::HtmlAnalyzer;
pub use tls::{TlsAnalyzer, TlsSummary};
pub use typosquat::TyposquatAnalyzer;

/// Analyzer identity. The declaration order is the report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    Heuristic,
    DomainIntel,
    Tls,
    Typosquat,
    Html,
}

impl AnalyzerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalyzerKind::Heuristic => "heuristic",
            AnalyzerKind::DomainIntel => "domain_intel",
            AnalyzerKind::Tls => "tls",
            AnalyzerKind::Typosquat => "typosquat",
            AnalyzerKind::Html => "html",
        }
    }
}

impl fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding and what it added to the score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signal {
    pub analyzer: AnalyzerKind,
    pub message: String,
    pub delta: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    TimedOut,
    Failed,
    /// Never started because the resolvability gate ended the scan.
    Skipped,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Completed => "completed",
            OutcomeStatus::TimedOut => "timed_out",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::Skipped => "skipped",
        }
    }
}

/// Structured side data an analyzer can hand to the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    Domain(DomainSummary),
    Tls(TlsSummary),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzerOutcome {
    pub analyzer: AnalyzerKind,
    pub status: OutcomeStatus,
    pub score: u32,
    pub signals: Vec<Signal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
}

impl AnalyzerOutcome {
    /// The analyzer overran its own budget; scored per its timeout policy.
    pub fn timed_out(analyzer: AnalyzerKind, budget: Duration, mode: FailureMode) -> Self {
        let mut findings = Findings::new(analyzer);
        findings.flag(
            mode.score(),
            format!("{analyzer} analysis timed out after {}s", budget.as_secs()),
        );
        findings.finish(OutcomeStatus::TimedOut)
    }

    /// Still running when the scan deadline passed; never scored.
    pub fn abandoned(analyzer: AnalyzerKind) -> Self {
        let mut findings = Findings::new(analyzer);
        findings.note(format!("{analyzer} analysis did not finish before the scan deadline"));
        findings.finish(OutcomeStatus::Failed)
    }
}

/// Accumulates signals while an analyzer works; the outcome score is always
/// the sum of its signal deltas.
#[derive(Debug)]
pub struct Findings {
    analyzer: AnalyzerKind,
    signals: Vec<Signal>,
    evidence: Option<Evidence>,
}

impl Findings {
    pub fn new(analyzer: AnalyzerKind) -> Self {
        Self {
            analyzer,
            signals: Vec::new(),
            evidence: None,
        }
    }

    pub fn flag(&mut self, delta: u32, message: impl Into<String>) {
        self.signals.push(Signal {
            analyzer: self.analyzer,
            message: message.into(),
            delta,
        });
    }

    /// Informational signal, no score.
    pub fn note(&mut self, message: impl Into<String>) {
        self.flag(0, message);
    }

    pub fn attach(&mut self, evidence: Evidence) {
        self.evidence = Some(evidence);
    }

    pub fn score(&self) -> u32 {
        self.signals.iter().map(|s| s.delta).sum()
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn finish(self, status: OutcomeStatus) -> AnalyzerOutcome {
        let score = self.score();
        AnalyzerOutcome {
            analyzer: self.analyzer,
            status,
            score,
            signals: self.signals,
            evidence: self.evidence,
        }
    }

    pub fn completed(self) -> AnalyzerOutcome {
        self.finish(OutcomeStatus::Completed)
    }
}

/// What every analyzer gets to look at.
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub request: ScanRequest,
    /// Addresses found by the resolvability gate.
    pub addresses: Vec<IpAddr>,
}

pub trait Analyzer: Send + Sync {
    fn kind(&self) -> AnalyzerKind;

    /// Time the orchestrator waits for this analyzer. `None` means only the
    /// overall scan deadline applies.
    fn budget(&self) -> Option<Duration> {
        None
    }

    /// Score policy applied when the budget runs out.
    fn timeout_mode(&self) -> FailureMode {
        FailureMode::Open
    }

    /// Errors are reserved for internal faults; probe failures are folded
    /// into the outcome.
    fn analyze(&self, ctx: &ScanContext) -> Result<AnalyzerOutcome>;
}

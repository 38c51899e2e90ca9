//! Scan orchestration.
//!
//! normalize → resolvability gate → fan out to every analyzer → aggregate.
//! Analyzers run on their own threads and report back over a channel; the
//! orchestrator waits for each one until its budget runs out, and for all of
//! them until the scan deadline, then aggregates whatever it has.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::analyzers::html::HttpFetcher;
use crate::analyzers::tls::RustlsProbe;
use crate::analyzers::whois::Port43Client;
use crate::analyzers::{
    Analyzer, AnalyzerOutcome, DomainIntelAnalyzer, HeuristicAnalyzer, HtmlAnalyzer, ScanContext,
    TlsAnalyzer, TyposquatAnalyzer,
};
use crate::config::ScoringPolicy;
use crate::error::{Result, ScanError};
use crate::gate::{self, Resolver, SystemResolver};
use crate::normalize::ScanRequest;
use crate::report::ScanReport;
use crate::verdict::aggregate;

type Delivery = (usize, Result<AnalyzerOutcome>);

pub struct Scanner {
    resolver: Arc<dyn Resolver>,
    analyzers: Vec<Arc<dyn Analyzer>>,
    deadline: Duration,
}

impl Scanner {
    /// The production stack: system resolver, port-43 WHOIS, rustls, reqwest.
    pub fn new(policy: Arc<ScoringPolicy>) -> Result<Self> {
        let resolver: Arc<dyn Resolver> = Arc::new(SystemResolver);
        let probe_timeout = policy.timeouts.probe();

        let whois = Arc::new(Port43Client::new(probe_timeout));
        let tls_probe = Arc::new(RustlsProbe::new(probe_timeout)?);
        let fetcher = Arc::new(HttpFetcher::new(&policy.html, probe_timeout)?);

        let analyzers: Vec<Arc<dyn Analyzer>> = vec![
            Arc::new(HeuristicAnalyzer::new(policy.clone())),
            Arc::new(DomainIntelAnalyzer::new(policy.clone(), resolver.clone(), whois)),
            Arc::new(TlsAnalyzer::new(policy.clone(), tls_probe)),
            Arc::new(TyposquatAnalyzer::new(policy.clone())),
            Arc::new(HtmlAnalyzer::new(policy.clone(), fetcher)),
        ];

        Ok(Self::with_parts(resolver, analyzers, policy.timeouts.scan_deadline()))
    }

    pub fn with_parts(
        resolver: Arc<dyn Resolver>,
        analyzers: Vec<Arc<dyn Analyzer>>,
        deadline: Duration,
    ) -> Self {
        Self {
            resolver,
            analyzers,
            deadline,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Always produces a report; failures are folded into its verdict.
    pub fn scan(&self, raw: &str) -> ScanReport {
        let started = Instant::now();
        info!(input = raw, "scan started");

        let report = self
            .run(raw)
            .with_elapsed(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));

        info!(
            score = report.score,
            verdict = %report.verdict,
            elapsed_ms = report.elapsed_ms,
            "scan finished"
        );
        report
    }

    fn run(&self, raw: &str) -> ScanReport {
        let request = match ScanRequest::parse(raw) {
            Ok(request) => request,
            Err(e) => {
                info!(error = %e, "input rejected");
                return ScanReport::invalid(raw);
            }
        };

        let addresses = match gate::check(self.resolver.as_ref(), &request.host) {
            Ok(addresses) => addresses,
            Err(e) => {
                info!(host = %request.host, error = %e, "resolvability gate fired");
                let skipped: Vec<_> = self.analyzers.iter().map(|a| a.kind()).collect();
                return ScanReport::unresolvable(raw, &request.url, &skipped);
            }
        };
        debug!(host = %request.host, ?addresses, "gate passed");

        let ctx = Arc::new(ScanContext { request, addresses });
        match self.fan_out(&ctx) {
            Ok(outcomes) => ScanReport::from_aggregate(raw, &ctx.request.url, aggregate(outcomes)),
            Err(e) => {
                error!(error = %e, "analysis aborted, partial results discarded");
                ScanReport::internal_error(raw, &ctx.request.url)
            }
        }
    }

    fn fan_out(&self, ctx: &Arc<ScanContext>) -> Result<Vec<AnalyzerOutcome>> {
        let started = Instant::now();
        let scan_deadline = started + self.deadline;
        let (tx, rx) = mpsc::channel::<Delivery>();

        for (slot, analyzer) in self.analyzers.iter().enumerate() {
            let analyzer = Arc::clone(analyzer);
            let ctx = Arc::clone(ctx);
            let tx = tx.clone();
            thread::Builder::new()
                .name(format!("analyzer-{}", analyzer.kind()))
                .spawn(move || {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(&ctx)))
                        .unwrap_or_else(|payload| Err(ScanError::Internal(panic_message(payload))));
                    // The receiver is gone once the scan stopped waiting.
                    let _ = tx.send((slot, result));
                })
                .map_err(|e| ScanError::Internal(format!("cannot spawn analyzer thread: {e}")))?;
        }
        drop(tx);

        let budgets: Vec<Option<Duration>> = self.analyzers.iter().map(|a| a.budget()).collect();
        let mut outcomes: Vec<Option<AnalyzerOutcome>> = vec![None; self.analyzers.len()];
        let mut remaining = outcomes.len();

        while remaining > 0 {
            let now = Instant::now();

            for (slot, analyzer) in self.analyzers.iter().enumerate() {
                let Some(budget) = budgets[slot] else { continue };
                if outcomes[slot].is_none() && now >= started + budget {
                    warn!(analyzer = %analyzer.kind(), ?budget, "analyzer timed out");
                    outcomes[slot] = Some(AnalyzerOutcome::timed_out(
                        analyzer.kind(),
                        budget,
                        analyzer.timeout_mode(),
                    ));
                    remaining -= 1;
                }
            }
            if remaining == 0 {
                break;
            }

            if now >= scan_deadline {
                for (slot, analyzer) in self.analyzers.iter().enumerate() {
                    if outcomes[slot].is_none() {
                        warn!(analyzer = %analyzer.kind(), "scan deadline passed, analyzer abandoned");
                        outcomes[slot] = Some(AnalyzerOutcome::abandoned(analyzer.kind()));
                    }
                }
                break;
            }

            let wake = budgets
                .iter()
                .zip(&outcomes)
                .filter(|(_, outcome)| outcome.is_none())
                .filter_map(|(budget, _)| budget.map(|b| started + b))
                .fold(scan_deadline, Instant::min);

            match rx.recv_timeout(wake.saturating_duration_since(now)) {
                Ok((slot, result)) => {
                    if outcomes[slot].is_some() {
                        debug!(slot, "late analyzer result ignored");
                        continue;
                    }
                    let outcome = result?;
                    info!(
                        analyzer = %outcome.analyzer,
                        status = ?outcome.status,
                        score = outcome.score,
                        signals = outcome.signals.len(),
                        "analyzer finished"
                    );
                    outcomes[slot] = Some(outcome);
                    remaining -= 1;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ScanError::Internal(
                        "analyzer thread exited without reporting".into(),
                    ));
                }
            }
        }

        Ok(outcomes.into_iter().flatten().collect())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .map(|msg| format!("analyzer panicked: {msg}"))
        .unwrap_or_else(|| "analyzer panicked".to_string())
}

//! Lexical and structural checks on the URL text. No network.

use std::net::IpAddr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Analyzer, AnalyzerKind, AnalyzerOutcome, Findings, ScanContext};
use crate::catalog::{LURE_KEYWORDS, SUSPICIOUS_EXTENSIONS, SUSPICIOUS_TLDS};
use crate::config::{HeuristicWeights, ScoringPolicy};
use crate::error::Result;
use crate::normalize::ScanRequest;

static RANDOM_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z]{10,}").expect("static regex"));
static PERCENT_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%[0-9A-Fa-f]{2}").expect("static regex"));
static LONG_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9]{25,}").expect("static regex"));

pub struct HeuristicAnalyzer {
    policy: Arc<ScoringPolicy>,
}

impl HeuristicAnalyzer {
    pub fn new(policy: Arc<ScoringPolicy>) -> Self {
        Self { policy }
    }
}

impl Analyzer for HeuristicAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Heuristic
    }

    fn analyze(&self, ctx: &ScanContext) -> Result<AnalyzerOutcome> {
        Ok(score_request(&ctx.request, &self.policy.heuristics).completed())
    }
}

fn is_ip_host(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok()
}

fn has_punycode(host: &str) -> bool {
    host.starts_with("xn--") || host.contains(".xn--")
}

fn suspicious_port(req: &ScanRequest) -> bool {
    matches!(req.port, Some(p) if p != 80 && p != 443)
}

fn has_suspicious_extension(path: &str) -> Option<&'static str> {
    let path = path.to_lowercase();
    SUSPICIOUS_EXTENSIONS
        .iter()
        .copied()
        .find(|ext| path.ends_with(ext))
}

/// Longest run of one repeated character.
fn longest_repeat(text: &str) -> usize {
    let mut best = 0;
    let mut run = 0;
    let mut last = None;
    for c in text.chars() {
        if Some(c) == last {
            run += 1;
        } else {
            run = 1;
            last = Some(c);
        }
        best = best.max(run);
    }
    best
}

pub fn score_request(req: &ScanRequest, w: &HeuristicWeights) -> Findings {
    let mut findings = Findings::new(AnalyzerKind::Heuristic);
    let host = req.host.as_str();
    let haystack = req.haystack();
    let haystack_lower = haystack.to_lowercase();
    let ip_host = is_ip_host(host);

    if host.len() > w.long_hostname_len {
        findings.flag(w.long_hostname, "Unusually long domain");
    }

    if RANDOM_RUN.is_match(host) {
        findings.flag(w.randomized_run, "Randomized domain string");
    }

    let hyphens = host.matches('-').count();
    if hyphens >= 2 {
        findings.flag(w.two_hyphens, "Excessive hyphens in domain");
    }
    if hyphens >= 3 {
        findings.flag(w.three_hyphens, format!("{hyphens} hyphens in domain"));
    }

    if ip_host {
        findings.flag(w.ip_literal, "Host is a raw IP address");
    }

    if has_punycode(host) {
        findings.flag(w.punycode, "Punycode in host (xn--), possible homograph");
    }

    let dots = host.matches('.').count();
    if dots >= 4 && !ip_host {
        findings.flag(w.many_dots, format!("Many subdomains ({dots} dots)"));
    }

    if let Some(tld) = SUSPICIOUS_TLDS.iter().find(|tld| host.ends_with(*tld)) {
        findings.flag(w.suspicious_tld, format!("High-risk top-level domain: {tld}"));
    }

    for keyword in LURE_KEYWORDS.iter().filter(|k| haystack_lower.contains(*k)) {
        findings.flag(w.keyword_each, format!("Lure keyword in URL: '{keyword}'"));
    }

    if haystack.len() > w.long_url_len {
        findings.flag(w.long_url, format!("URL length > {}", w.long_url_len));
    }

    if PERCENT_ESCAPE.is_match(&haystack) {
        findings.flag(w.percent_encoding, "Percent-encoded characters in URL");
    }

    if LONG_TOKEN.is_match(&req.path) {
        findings.flag(w.long_path_token, "Long random-looking token in path");
    }

    if longest_repeat(&haystack) >= 5 {
        findings.flag(w.repeated_chars, "Character repeated 5+ times in a row");
    }

    if let Some(ext) = has_suspicious_extension(&req.path) {
        findings.flag(w.suspicious_extension, format!("Executable-like file in path ({ext})"));
    }

    let params = req.query.as_deref().map_or(0, |q| q.matches('=').count());
    if params >= 4 {
        findings.flag(w.many_query_params, format!("{params} query parameters"));
    }

    if req.has_credentials {
        findings.flag(w.embedded_credentials, "Embedded credentials in URL (credential trick)");
    }

    if suspicious_port(req) {
        if let Some(port) = req.port {
            findings.flag(w.nonstandard_port, format!("Non-standard port {port}"));
        }
    }

    findings
}

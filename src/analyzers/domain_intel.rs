//! Domain intelligence: structure, entropy, DNS posture and registration age.
//!
//! DNS trouble is scored (fail-risky); missing WHOIS data is not (fail-open).

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::whois::{WhoisLookup, WhoisRecord};
use super::{Analyzer, AnalyzerKind, AnalyzerOutcome, Evidence, Findings, ScanContext};
use crate::catalog::{SUSPICIOUS_TLDS, TRUSTED_BRAND_TOKENS};
use crate::config::{tier_for, FailureMode, ScoringPolicy};
use crate::error::{Result, ScanError};
use crate::gate::Resolver;
use crate::similarity::shannon_entropy;

static NUMERIC_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9.\-]+$").expect("static regex"));

const MAX_LABELS: usize = 4;

/// Part of the analyzer budget the WHOIS lookup may not use.
const WHOIS_MARGIN: Duration = Duration::from_millis(500);

/// Networks reported as private (IANA special-purpose registries).
const PRIVATE_V4: &[(Ipv4Addr, u32)] = &[
    (Ipv4Addr::new(0, 0, 0, 0), 8),
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(127, 0, 0, 0), 8),
    (Ipv4Addr::new(169, 254, 0, 0), 16),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 0, 0, 0), 29),
    (Ipv4Addr::new(192, 0, 0, 170), 31),
    (Ipv4Addr::new(192, 0, 2, 0), 24),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    (Ipv4Addr::new(198, 18, 0, 0), 15),
    (Ipv4Addr::new(198, 51, 100, 0), 24),
    (Ipv4Addr::new(203, 0, 113, 0), 24),
    (Ipv4Addr::new(240, 0, 0, 0), 4),
    (Ipv4Addr::new(255, 255, 255, 255), 32),
];

const PRIVATE_V6: &[(Ipv6Addr, u32)] = &[
    (Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1), 128),
    (Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 0), 128),
    (Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0, 0), 96),
    (Ipv6Addr::new(0x0100, 0, 0, 0, 0, 0, 0, 0), 64),
    (Ipv6Addr::new(0x2001, 0, 0, 0, 0, 0, 0, 0), 23),
    (Ipv6Addr::new(0x2001, 0x0db8, 0, 0, 0, 0, 0, 0), 32),
    (Ipv6Addr::new(0x2002, 0, 0, 0, 0, 0, 0, 0), 16),
    (Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7),
    (Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10),
];

const RESERVED_V4: &[(Ipv4Addr, u32)] = &[(Ipv4Addr::new(240, 0, 0, 0), 4)];

/// Unallocated IPv6 space (RFC 4291 address type table).
const RESERVED_V6: &[(Ipv6Addr, u32)] = &[
    (Ipv6Addr::new(0x0000, 0, 0, 0, 0, 0, 0, 0), 8),
    (Ipv6Addr::new(0x0100, 0, 0, 0, 0, 0, 0, 0), 8),
    (Ipv6Addr::new(0x0200, 0, 0, 0, 0, 0, 0, 0), 7),
    (Ipv6Addr::new(0x0400, 0, 0, 0, 0, 0, 0, 0), 6),
    (Ipv6Addr::new(0x0800, 0, 0, 0, 0, 0, 0, 0), 5),
    (Ipv6Addr::new(0x1000, 0, 0, 0, 0, 0, 0, 0), 4),
    (Ipv6Addr::new(0x4000, 0, 0, 0, 0, 0, 0, 0), 3),
    (Ipv6Addr::new(0x6000, 0, 0, 0, 0, 0, 0, 0), 3),
    (Ipv6Addr::new(0x8000, 0, 0, 0, 0, 0, 0, 0), 3),
    (Ipv6Addr::new(0xa000, 0, 0, 0, 0, 0, 0, 0), 3),
    (Ipv6Addr::new(0xc000, 0, 0, 0, 0, 0, 0, 0), 3),
    (Ipv6Addr::new(0xe000, 0, 0, 0, 0, 0, 0, 0), 4),
    (Ipv6Addr::new(0xf000, 0, 0, 0, 0, 0, 0, 0), 5),
    (Ipv6Addr::new(0xf800, 0, 0, 0, 0, 0, 0, 0), 6),
    (Ipv6Addr::new(0xfe00, 0, 0, 0, 0, 0, 0, 0), 9),
];

/// Per-field summary rendered alongside the signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DomainSummary {
    pub trusted: bool,
    pub addresses: Vec<IpAddr>,
    pub label_entropy: f64,
    pub registrar: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub age_days: Option<i64>,
    pub expires: Option<DateTime<Utc>>,
    pub expires_in_days: Option<i64>,
}

pub struct DomainIntelAnalyzer {
    policy: Arc<ScoringPolicy>,
    resolver: Arc<dyn Resolver>,
    whois: Arc<dyn WhoisLookup>,
}

impl DomainIntelAnalyzer {
    pub fn new(
        policy: Arc<ScoringPolicy>,
        resolver: Arc<dyn Resolver>,
        whois: Arc<dyn WhoisLookup>,
    ) -> Self {
        Self {
            policy,
            resolver,
            whois,
        }
    }

    /// `whois_deadline` bounds the registration lookup; past it the lookup
    /// counts as failed and every other signal is kept.
    fn assess(
        &self,
        host: &str,
        gate_addresses: &[IpAddr],
        now: DateTime<Utc>,
        whois_deadline: Instant,
    ) -> Findings {
        let w = &self.policy.domain;
        let mut findings = Findings::new(AnalyzerKind::DomainIntel);
        let mut summary = DomainSummary::default();

        if is_trusted(host) {
            findings.note("Known trusted infrastructure");
            summary.trusted = true;
            findings.attach(Evidence::Domain(summary));
            return findings;
        }

        if host.is_empty() || host.starts_with('.') || host.ends_with('.') || host.contains("..") {
            findings.flag(w.malformed, "Malformed domain structure detected");
            return findings;
        }

        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() > MAX_LABELS {
            findings.flag(w.deep_subdomains, "Excessive subdomain depth detected");
        }

        if NUMERIC_HOST.is_match(host) {
            findings.flag(w.numeric_host, "Domain consists primarily of numeric characters");
        }

        if host.starts_with("xn--") || host.contains(".xn--") {
            findings.flag(w.punycode, "Internationalized domain (punycode) detected");
        }

        if let Some(tld) = SUSPICIOUS_TLDS.iter().find(|tld| host.ends_with(*tld)) {
            findings.flag(w.suspicious_tld, format!("High-risk top-level domain used: {tld}"));
        }

        let base_label = labels[0];
        summary.label_entropy = shannon_entropy(base_label);
        if summary.label_entropy > w.entropy_threshold && base_label.chars().count() > w.entropy_min_len
        {
            findings.flag(
                w.high_entropy,
                format!(
                    "High entropy domain label ({:.2} bits, possible DGA-generated domain)",
                    summary.label_entropy
                ),
            );
        }

        let first = if gate_addresses.is_empty() {
            self.resolver.resolve(host).ok().filter(|a| !a.is_empty())
        } else {
            Some(gate_addresses.to_vec())
        };
        let Some(first) = first else {
            findings.flag(
                self.policy.failures.dns.score(),
                "DNS resolution failed (domain does not exist or unreachable)",
            );
            findings.attach(Evidence::Domain(summary));
            return findings;
        };

        findings.note(format!("DNS resolved successfully to {}", first[0]));
        classify_addresses(&first, &mut findings, &self.policy);
        summary.addresses = first.clone();

        if let Ok(second) = self.resolver.resolve(host) {
            let a: BTreeSet<IpAddr> = first.iter().copied().collect();
            let b: BTreeSet<IpAddr> = second.into_iter().collect();
            if !b.is_empty() && a != b {
                findings.flag(w.fast_flux, "Inconsistent DNS resolution detected (possible fast-flux)");
            }
        }

        let registrable = base_domain(host);
        let limit = whois_deadline.saturating_duration_since(Instant::now());
        match self.lookup_within(&registrable, limit) {
            Ok(record) => score_registration(&record, now, &self.policy, &mut findings, &mut summary),
            Err(e) => {
                debug!(domain = %registrable, error = %e, "whois lookup failed");
                let mode = self.policy.failures.whois;
                match mode {
                    FailureMode::Open => findings.note("WHOIS data unavailable"),
                    FailureMode::Risky { score } => findings.flag(score, "WHOIS lookup failed"),
                }
            }
        }

        findings.attach(Evidence::Domain(summary));
        findings
    }

    /// Runs the WHOIS lookup on its own thread and stops waiting after `limit`.
    /// An abandoned lookup finishes in the background against its socket timeout.
    fn lookup_within(&self, domain: &str, limit: Duration) -> Result<WhoisRecord> {
        let timed_out = || ScanError::AnalyzerTimeout {
            analyzer: AnalyzerKind::DomainIntel,
            budget: limit,
        };
        if limit.is_zero() {
            return Err(timed_out());
        }

        let (tx, rx) = mpsc::channel();
        let whois = Arc::clone(&self.whois);
        let target = domain.to_string();
        thread::Builder::new()
            .name("whois".into())
            .spawn(move || {
                let _ = tx.send(whois.lookup(&target));
            })
            .map_err(|e| ScanError::Internal(format!("cannot spawn whois thread: {e}")))?;

        rx.recv_timeout(limit).map_err(|_| timed_out())?
    }
}

impl Analyzer for DomainIntelAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::DomainIntel
    }

    fn budget(&self) -> Option<Duration> {
        Some(self.policy.timeouts.analyzer())
    }

    fn timeout_mode(&self) -> FailureMode {
        self.policy.failures.domain_timeout
    }

    fn analyze(&self, ctx: &ScanContext) -> Result<AnalyzerOutcome> {
        let whois_deadline =
            Instant::now() + self.policy.timeouts.analyzer().saturating_sub(WHOIS_MARGIN);
        Ok(self
            .assess(&ctx.request.host, &ctx.addresses, Utc::now(), whois_deadline)
            .completed())
    }
}

pub fn is_trusted(host: &str) -> bool {
    let host = host.to_lowercase();
    TRUSTED_BRAND_TOKENS.iter().any(|token| host.contains(token))
}

/// Last two labels of `host`.
pub fn base_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 2 {
        labels[labels.len() - 2..].join(".")
    } else {
        host.to_string()
    }
}

fn in_v4(ip: Ipv4Addr, networks: &[(Ipv4Addr, u32)]) -> bool {
    let ip = u32::from(ip);
    networks.iter().any(|&(net, prefix)| {
        let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
        ip & mask == u32::from(net) & mask
    })
}

fn in_v6(ip: Ipv6Addr, networks: &[(Ipv6Addr, u32)]) -> bool {
    let ip = u128::from(ip);
    networks.iter().any(|&(net, prefix)| {
        let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
        ip & mask == u128::from(net) & mask
    })
}

/// Loopback, documentation and other non-global space count as private too.
fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => in_v4(v4, PRIVATE_V4),
        IpAddr::V6(v6) => in_v6(v6, PRIVATE_V6),
    }
}

fn is_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => in_v4(v4, RESERVED_V4),
        IpAddr::V6(v6) => in_v6(v6, RESERVED_V6),
    }
}

/// Each address class is scored once even when several addresses fall in it.
fn classify_addresses(addrs: &[IpAddr], findings: &mut Findings, policy: &ScoringPolicy) {
    let w = &policy.domain;
    if addrs.iter().any(|ip| is_private(*ip)) {
        findings.flag(w.private_address, "Domain resolves to private IP address");
    }
    if addrs.iter().any(|ip| ip.is_loopback()) {
        findings.flag(w.loopback_address, "Domain resolves to loopback address");
    }
    if addrs.iter().any(|ip| is_reserved(*ip)) {
        findings.flag(w.reserved_address, "Domain resolves to reserved IP space");
    }
    if addrs.iter().any(|ip| ip.is_multicast()) {
        findings.flag(w.multicast_address, "Domain resolves to multicast address");
    }
}

fn score_registration(
    record: &WhoisRecord,
    now: DateTime<Utc>,
    policy: &ScoringPolicy,
    findings: &mut Findings,
    summary: &mut DomainSummary,
) {
    let w = &policy.domain;
    summary.registrar = record.registrar.clone();
    summary.created = record.created;
    summary.expires = record.expires;

    if let Some(created) = record.created {
        let age = (now - created).num_days();
        summary.age_days = Some(age);
        match tier_for(&w.registration_age, age) {
            Some(tier) => findings.flag(tier.score, format!("Recently registered domain ({age} days old)")),
            None => findings.note(format!("Domain registered {age} days ago")),
        }
    }

    if let Some(expires) = record.expires {
        let left = (expires - now).num_days();
        summary.expires_in_days = Some(left);
        if let Some(tier) = tier_for(&w.expiry, left) {
            findings.flag(tier.score, format!("Domain registration expires in {left} days"));
        }
    }
}

//! Score constants and failure policies.
//!
//! Every number an analyzer adds to the risk score lives in [`ScoringPolicy`],
//! so a deployment can audit (`--print-policy`) or override (`--policy FILE`)
//! them without touching code. Missing keys in a policy file fall back to the
//! defaults below.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// What a failed probe contributes to the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FailureMode {
    /// Inconclusive: the failure adds nothing.
    Open,
    /// The failure is itself evidence and adds `score`.
    Risky { score: u32 },
}

impl FailureMode {
    pub fn score(self) -> u32 {
        match self {
            FailureMode::Open => 0,
            FailureMode::Risky { score } => score,
        }
    }
}

/// A threshold row: applies when the measured days are strictly below `under_days`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayTier {
    pub under_days: i64,
    pub score: u32,
}

/// First row (in order) whose bound is above `days`.
pub fn tier_for(tiers: &[DayTier], days: i64) -> Option<DayTier> {
    tiers.iter().copied().find(|tier| days < tier.under_days)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicWeights {
    pub long_hostname: u32,
    pub long_hostname_len: usize,
    pub randomized_run: u32,
    pub two_hyphens: u32,
    pub three_hyphens: u32,
    pub ip_literal: u32,
    pub punycode: u32,
    pub many_dots: u32,
    pub suspicious_tld: u32,
    pub keyword_each: u32,
    pub long_url: u32,
    pub long_url_len: usize,
    pub percent_encoding: u32,
    pub long_path_token: u32,
    pub repeated_chars: u32,
    pub suspicious_extension: u32,
    pub many_query_params: u32,
    pub embedded_credentials: u32,
    pub nonstandard_port: u32,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        Self {
            long_hostname: 15,
            long_hostname_len: 35,
            randomized_run: 20,
            two_hyphens: 10,
            three_hyphens: 10,
            ip_literal: 35,
            punycode: 25,
            many_dots: 15,
            suspicious_tld: 20,
            keyword_each: 5,
            long_url: 10,
            long_url_len: 90,
            percent_encoding: 10,
            long_path_token: 15,
            repeated_chars: 10,
            suspicious_extension: 20,
            many_query_params: 10,
            embedded_credentials: 40,
            nonstandard_port: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainWeights {
    pub malformed: u32,
    pub deep_subdomains: u32,
    pub numeric_host: u32,
    pub punycode: u32,
    pub suspicious_tld: u32,
    pub high_entropy: u32,
    pub entropy_threshold: f64,
    pub entropy_min_len: usize,
    pub private_address: u32,
    pub loopback_address: u32,
    pub reserved_address: u32,
    pub multicast_address: u32,
    pub fast_flux: u32,
    pub registration_age: Vec<DayTier>,
    pub expiry: Vec<DayTier>,
}

impl Default for DomainWeights {
    fn default() -> Self {
        Self {
            malformed: 30,
            deep_subdomains: 10,
            numeric_host: 20,
            punycode: 25,
            suspicious_tld: 25,
            high_entropy: 20,
            entropy_threshold: 4.0,
            entropy_min_len: 10,
            private_address: 20,
            loopback_address: 25,
            reserved_address: 15,
            multicast_address: 15,
            fast_flux: 15,
            registration_age: vec![
                DayTier { under_days: 14, score: 60 },
                DayTier { under_days: 90, score: 30 },
                DayTier { under_days: 365, score: 10 },
            ],
            expiry: vec![
                DayTier { under_days: 15, score: 20 },
                DayTier { under_days: 30, score: 10 },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsWeights {
    pub hostname_mismatch: u32,
    pub missing_certificate: u32,
    pub not_yet_valid: u32,
    pub expired: u32,
    pub expiry: Vec<DayTier>,
    pub self_signed: u32,
    pub weak_protocol: u32,
    pub weak_cipher: u32,
}

impl Default for TlsWeights {
    fn default() -> Self {
        Self {
            hostname_mismatch: 40,
            missing_certificate: 40,
            not_yet_valid: 30,
            expired: 40,
            expiry: vec![
                DayTier { under_days: 15, score: 20 },
                DayTier { under_days: 30, score: 10 },
            ],
            self_signed: 35,
            weak_protocol: 25,
            weak_cipher: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TyposquatWeights {
    pub lookalike: u32,
    pub min_ratio: f64,
    pub max_ratio: f64,
    pub homoglyph: u32,
}

impl Default for TyposquatWeights {
    fn default() -> Self {
        Self {
            lookalike: 30,
            min_ratio: 0.85,
            max_ratio: 0.99,
            homoglyph: 35,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlWeights {
    pub password_field: u32,
    pub external_form: u32,
    pub insecure_form: u32,
    pub hidden_iframe: u32,
    pub external_scripts: u32,
    pub external_script_limit: usize,
    pub script_redirect: u32,
    pub phrase_each: u32,
    pub max_bytes: usize,
    pub user_agent: String,
}

impl Default for HtmlWeights {
    fn default() -> Self {
        Self {
            password_field: 35,
            external_form: 40,
            insecure_form: 25,
            hidden_iframe: 20,
            external_scripts: 15,
            external_script_limit: 3,
            script_redirect: 15,
            phrase_each: 10,
            max_bytes: 300_000,
            user_agent: format!("url-phishing-detector/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Fail-open / fail-risky choice for every probe that can break.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailurePolicies {
    pub dns: FailureMode,
    pub whois: FailureMode,
    pub tls: FailureMode,
    pub html: FailureMode,
    pub domain_timeout: FailureMode,
    pub tls_timeout: FailureMode,
    pub html_timeout: FailureMode,
}

impl Default for FailurePolicies {
    fn default() -> Self {
        Self {
            dns: FailureMode::Risky { score: 35 },
            whois: FailureMode::Open,
            tls: FailureMode::Risky { score: 30 },
            html: FailureMode::Open,
            domain_timeout: FailureMode::Open,
            tls_timeout: FailureMode::Risky { score: 30 },
            html_timeout: FailureMode::Open,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Budget for each network-bound analyzer, as seen by the orchestrator.
    pub analyzer_secs: u64,
    /// Socket timeout used inside the probes.
    pub probe_secs: u64,
    /// Hard ceiling for a whole scan.
    pub scan_deadline_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            analyzer_secs: 6,
            probe_secs: 5,
            scan_deadline_secs: 20,
        }
    }
}

impl Timeouts {
    pub fn analyzer(&self) -> Duration {
        Duration::from_secs(self.analyzer_secs)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn scan_deadline(&self) -> Duration {
        Duration::from_secs(self.scan_deadline_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub heuristics: HeuristicWeights,
    pub domain: DomainWeights,
    pub tls: TlsWeights,
    pub typosquat: TyposquatWeights,
    pub html: HtmlWeights,
    pub failures: FailurePolicies,
    pub timeouts: Timeouts,
}

impl ScoringPolicy {
    /// Defaults, or the given TOML file layered over them.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| {
                    ScanError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml(&text)
            }
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ScanError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ScanError::Config(e.to_string()))
    }
}

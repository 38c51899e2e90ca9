//! Brand lookalike detection. No network.

use std::sync::Arc;

use unicode_normalization::UnicodeNormalization;

use super::domain_intel::base_domain;
use super::{Analyzer, AnalyzerKind, AnalyzerOutcome, Findings, ScanContext};
use crate::catalog::LEGITIMATE_DOMAINS;
use crate::config::{ScoringPolicy, TyposquatWeights};
use crate::error::Result;
use crate::similarity::similarity_ratio;

pub struct TyposquatAnalyzer {
    policy: Arc<ScoringPolicy>,
}

impl TyposquatAnalyzer {
    pub fn new(policy: Arc<ScoringPolicy>) -> Self {
        Self { policy }
    }
}

impl Analyzer for TyposquatAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Typosquat
    }

    fn analyze(&self, ctx: &ScanContext) -> Result<AnalyzerOutcome> {
        Ok(detect(&ctx.request.host, &self.policy.typosquat).completed())
    }
}

/// Unicode form of the host, compatibility-decomposed, reduced to ASCII and lower-cased.
fn fold_host(host: &str) -> String {
    let (unicode, _) = idna::domain_to_unicode(host);
    unicode
        .nfkd()
        .filter(char::is_ascii)
        .collect::<String>()
        .to_lowercase()
}

fn undo_homoglyphs(domain: &str) -> String {
    domain.replace('0', "o").replace('1', "l")
}

pub fn detect(host: &str, w: &TyposquatWeights) -> Findings {
    let mut findings = Findings::new(AnalyzerKind::Typosquat);
    let candidate = base_domain(&fold_host(host));
    let substituted = undo_homoglyphs(&candidate);

    for legit in LEGITIMATE_DOMAINS {
        let brand = base_domain(legit);

        let ratio = similarity_ratio(&candidate, &brand);
        if ratio >= w.min_ratio && ratio < w.max_ratio {
            findings.flag(
                w.lookalike,
                format!("Domain closely resembles trusted brand '{brand}' (similarity {ratio:.2})"),
            );
        }

        if substituted == brand && candidate != brand {
            findings.flag(
                w.homoglyph,
                format!("Numeric substitution detected resembling '{brand}'"),
            );
        }
    }

    findings
}

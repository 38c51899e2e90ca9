//! Score → verdict tiers and outcome aggregation.

use std::fmt;

use serde::Serialize;

use crate::analyzers::{AnalyzerOutcome, Signal};

pub const MAX_SCORE: u8 = 100;
pub const INVALID_SCORE: u8 = 100;
pub const UNRESOLVABLE_SCORE: u8 = 90;
pub const ERROR_SCORE: u8 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Safe,
    LowRisk,
    Suspicious,
    HighRisk,
    Invalid,
    Error,
}

impl Verdict {
    /// Tier for an aggregated (already clamped) score.
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Verdict::HighRisk,
            50..=79 => Verdict::Suspicious,
            20..=49 => Verdict::LowRisk,
            _ => Verdict::Safe,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Safe => "SAFE",
            Verdict::LowRisk => "LOW_RISK",
            Verdict::Suspicious => "SUSPICIOUS",
            Verdict::HighRisk => "HIGH_RISK",
            Verdict::Invalid => "INVALID",
            Verdict::Error => "ERROR",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn clamp_score(total: u64) -> u8 {
    total.min(u64::from(MAX_SCORE)) as u8
}

/// Result of folding every analyzer outcome into one score.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub score: u8,
    pub verdict: Verdict,
    pub signals: Vec<Signal>,
    pub outcomes: Vec<AnalyzerOutcome>,
}

/// Orders outcomes by analyzer declaration order, concatenates their
/// signals and clamps the summed deltas.
pub fn aggregate(mut outcomes: Vec<AnalyzerOutcome>) -> Aggregate {
    outcomes.sort_by_key(|o| o.analyzer);

    let total: u64 = outcomes.iter().map(|o| u64::from(o.score)).sum();
    let signals = outcomes
        .iter()
        .flat_map(|o| o.signals.iter().cloned())
        .collect();
    let score = clamp_score(total);

    Aggregate {
        score,
        verdict: Verdict::from_score(score),
        signals,
        outcomes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::{AnalyzerKind, Findings};

    fn outcome(kind: AnalyzerKind, deltas: &[u32]) -> AnalyzerOutcome {
        let mut findings = Findings::new(kind);
        for (i, d) in deltas.iter().enumerate() {
            findings.flag(*d, format!("{kind} #{i}"));
        }
        findings.completed()
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(Verdict::from_score(0), Verdict::Safe);
        assert_eq!(Verdict::from_score(19), Verdict::Safe);
        assert_eq!(Verdict::from_score(20), Verdict::LowRisk);
        assert_eq!(Verdict::from_score(49), Verdict::LowRisk);
        assert_eq!(Verdict::from_score(50), Verdict::Suspicious);
        assert_eq!(Verdict::from_score(79), Verdict::Suspicious);
        assert_eq!(Verdict::from_score(80), Verdict::HighRisk);
        assert_eq!(Verdict::from_score(100), Verdict::HighRisk);
    }

    #[test]
    fn every_score_maps_to_a_table_tier() {
        for score in 0..=MAX_SCORE {
            let v = Verdict::from_score(score);
            assert!(!matches!(v, Verdict::Invalid | Verdict::Error));
            assert_eq!(v, Verdict::from_score(score));
        }
    }

    #[test]
    fn signals_follow_declaration_order() {
        let agg = aggregate(vec![
            outcome(AnalyzerKind::Html, &[10]),
            outcome(AnalyzerKind::Typosquat, &[30]),
            outcome(AnalyzerKind::Heuristic, &[5, 5]),
            outcome(AnalyzerKind::Tls, &[]),
            outcome(AnalyzerKind::DomainIntel, &[20]),
        ]);
        let order: Vec<AnalyzerKind> = agg.signals.iter().map(|s| s.analyzer).collect();
        assert_eq!(
            order,
            vec![
                AnalyzerKind::Heuristic,
                AnalyzerKind::Heuristic,
                AnalyzerKind::DomainIntel,
                AnalyzerKind::Typosquat,
                AnalyzerKind::Html,
            ]
        );
        assert_eq!(agg.score, 70);
        assert_eq!(agg.verdict, Verdict::Suspicious);
    }

    #[test]
    fn sum_is_clamped() {
        let agg = aggregate(vec![
            outcome(AnalyzerKind::Heuristic, &[60, 40]),
            outcome(AnalyzerKind::Html, &[75]),
        ]);
        assert_eq!(agg.score, 100);
        assert_eq!(agg.verdict, Verdict::HighRisk);
        assert_eq!(clamp_score(u64::MAX), 100);
    }

    #[test]
    fn verdict_serializes_screaming() {
        let json = serde_json::to_string(&Verdict::HighRisk).expect("serialize");
        assert_eq!(json, "\"HIGH_RISK\"");
        assert_eq!(Verdict::LowRisk.to_string(), "LOW_RISK");
    }
}

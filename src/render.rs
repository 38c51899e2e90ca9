//! Output renderings of a [`ScanReport`]. Neither one changes the result.

use std::fmt::Write as _;

use crate::report::ScanReport;

const WIDTH: usize = 70;

pub fn json(report: &ScanReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

fn field(out: &mut String, label: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, " {label:<14}: {value}");
}

fn opt<T: std::fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map_or_else(|| "unknown".to_string(), |v| v.to_string())
}

pub fn text(report: &ScanReport) -> String {
    let sep = "-".repeat(WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "{sep}");
    let _ = writeln!(out, " {} - Phishing Analysis Report", report.engine);
    let _ = writeln!(out, "{sep}");
    field(&mut out, "Engine", format!("{} v{}", report.engine, report.version));
    field(&mut out, "Scan Time", report.scanned_at.format("%Y-%m-%d %H:%M:%S UTC"));
    field(&mut out, "Input URL", &report.input);
    field(
        &mut out,
        "Normalized",
        report.normalized_url.as_deref().unwrap_or("-"),
    );
    out.push('\n');
    field(&mut out, "Risk Score", format!("{}/100", report.score));
    field(&mut out, "Verdict", report.verdict);
    out.push('\n');

    out.push_str(" Signals:\n");
    let mut scored = report.scored_signals().peekable();
    if scored.peek().is_none() {
        out.push_str("  - No malicious indicators detected\n");
    }
    for s in scored {
        let _ = writeln!(out, "  - {} (+{})", s.message, s.delta);
    }

    let notes: Vec<_> = report.signals.iter().filter(|s| s.delta == 0).collect();
    if !notes.is_empty() {
        out.push_str(" Notes:\n");
        for s in notes {
            let _ = writeln!(out, "  - {}", s.message);
        }
    }

    if !report.analyzers.is_empty() {
        out.push('\n');
        out.push_str(" Analyzers:\n");
        for a in &report.analyzers {
            let _ = writeln!(
                out,
                "  {:<14} {:<10} +{}",
                a.analyzer.as_str(),
                a.status.as_str(),
                a.score
            );
        }
    }

    if let Some(domain) = &report.domain {
        out.push('\n');
        out.push_str(" Domain Intelligence:\n");
        field(&mut out, "  Trusted", domain.trusted);
        let addresses: Vec<String> = domain.addresses.iter().map(|a| a.to_string()).collect();
        field(
            &mut out,
            "  Addresses",
            if addresses.is_empty() { "-".to_string() } else { addresses.join(", ") },
        );
        field(&mut out, "  Entropy", format!("{:.2}", domain.label_entropy));
        field(&mut out, "  Registrar", opt(&domain.registrar));
        field(&mut out, "  Age (days)", opt(&domain.age_days));
        field(&mut out, "  Expires in", opt(&domain.expires_in_days));
    }

    if let Some(tls) = &report.tls {
        out.push('\n');
        out.push_str(" TLS:\n");
        field(&mut out, "  Protocol", opt(&tls.protocol));
        field(&mut out, "  Cipher", opt(&tls.cipher));
        field(&mut out, "  Issuer", opt(&tls.issuer));
        field(
            &mut out,
            "  Not after",
            tls.not_after
                .map_or_else(|| "unknown".to_string(), |t| t.format("%Y-%m-%d").to_string()),
        );
    }

    let _ = writeln!(out, "{sep}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::{AnalyzerKind, DomainSummary, Evidence, Findings};
    use crate::verdict::aggregate;

    #[test]
    fn invalid_report_text() {
        let text = text(&ScanReport::invalid(""));
        assert!(text.contains(" Risk Score    : 100/100"));
        assert!(text.contains(" Verdict       : INVALID"));
        assert!(text.contains("  - Invalid or empty URL (+100)"));
        assert!(!text.contains("Analyzers:"));
    }

    #[test]
    fn clean_report_says_so() {
        let mut domain = Findings::new(AnalyzerKind::DomainIntel);
        domain.note("DNS resolved successfully to 93.184.215.14");
        domain.attach(Evidence::Domain(DomainSummary {
            label_entropy: 2.5,
            ..DomainSummary::default()
        }));
        let report = ScanReport::from_aggregate(
            "example.com",
            "https://example.com/",
            aggregate(vec![domain.completed()]),
        );

        let text = text(&report);
        assert!(text.contains("No malicious indicators detected"));
        assert!(text.contains("DNS resolved successfully"));
        assert!(text.contains("domain_intel   completed  +0"));
        assert!(text.contains("   Entropy     : 2.50"));
    }

    #[test]
    fn json_is_pretty() {
        let out = json(&ScanReport::invalid("x")).expect("serialize");
        assert!(out.contains("\n  \"verdict\": \"INVALID\""));
    }
}

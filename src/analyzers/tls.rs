//! TLS posture of the host on port 443.
//!
//! The handshake runs with full certificate and hostname verification, so a
//! verification failure is itself the finding. When the handshake succeeds the
//! leaf certificate, protocol and cipher suite are inspected.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, ProtocolVersion, RootCertStore};
use serde::Serialize;
use tracing::debug;

use super::{Analyzer, AnalyzerKind, AnalyzerOutcome, Evidence, Findings, ScanContext};
use crate::catalog::{WEAK_CIPHER_MARKERS, WEAK_PROTOCOLS};
use crate::config::{tier_for, FailureMode, ScoringPolicy};
use crate::error::{Result, ScanError};

const HTTPS_PORT: u16 = 443;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFacts {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub subject: String,
    pub issuer: String,
    /// Issuer name equals subject name.
    pub self_issued: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsObservation {
    pub protocol: Option<String>,
    pub cipher: Option<String>,
    pub certificate: Option<CertificateFacts>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsFailure {
    HostnameMismatch(String),
    Expired(String),
    NotYetValid(String),
    Timeout,
    Connect(String),
    Handshake(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TlsSummary {
    pub protocol: Option<String>,
    pub cipher: Option<String>,
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub not_after: Option<DateTime<Utc>>,
}

pub trait TlsProbe: Send + Sync {
    fn probe(&self, host: &str) -> std::result::Result<TlsObservation, TlsFailure>;
}

pub struct RustlsProbe {
    config: Arc<ClientConfig>,
    timeout: Duration,
}

impl RustlsProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| ScanError::Internal(format!("tls config: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self {
            config: Arc::new(config),
            timeout,
        })
    }
}

impl TlsProbe for RustlsProbe {
    fn probe(&self, host: &str) -> std::result::Result<TlsObservation, TlsFailure> {
        let name = ServerName::try_from(host.to_string())
            .map_err(|e| TlsFailure::Handshake(format!("invalid server name: {e}")))?;
        let addr = (host, HTTPS_PORT)
            .to_socket_addrs()
            .map_err(|e| TlsFailure::Connect(e.to_string()))?
            .next()
            .ok_or_else(|| TlsFailure::Connect(format!("{host} has no address")))?;

        let mut sock = TcpStream::connect_timeout(&addr, self.timeout).map_err(classify_io)?;
        sock.set_read_timeout(Some(self.timeout)).map_err(classify_io)?;
        sock.set_write_timeout(Some(self.timeout)).map_err(classify_io)?;

        let mut conn = ClientConnection::new(Arc::clone(&self.config), name)
            .map_err(|e| classify_rustls(&e))?;
        while conn.is_handshaking() {
            conn.complete_io(&mut sock).map_err(classify_io)?;
        }

        let certificate = match conn.peer_certificates().and_then(|certs| certs.first()) {
            Some(der) => Some(
                parse_certificate(der.as_ref())
                    .ok_or_else(|| TlsFailure::Handshake("unreadable leaf certificate".into()))?,
            ),
            None => None,
        };

        Ok(TlsObservation {
            protocol: conn.protocol_version().map(protocol_name),
            cipher: conn.negotiated_cipher_suite().map(|s| format!("{:?}", s.suite())),
            certificate,
        })
    }
}

fn protocol_name(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::SSLv3 => "SSLv3".into(),
        ProtocolVersion::TLSv1_0 => "TLSv1".into(),
        ProtocolVersion::TLSv1_1 => "TLSv1.1".into(),
        ProtocolVersion::TLSv1_2 => "TLSv1.2".into(),
        ProtocolVersion::TLSv1_3 => "TLSv1.3".into(),
        other => format!("{other:?}"),
    }
}

fn parse_certificate(der: &[u8]) -> Option<CertificateFacts> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).ok()?;
    let validity = cert.validity();
    Some(CertificateFacts {
        not_before: DateTime::from_timestamp(validity.not_before.timestamp(), 0)?,
        not_after: DateTime::from_timestamp(validity.not_after.timestamp(), 0)?,
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        self_issued: cert.subject().as_raw() == cert.issuer().as_raw(),
    })
}

fn classify_io(err: io::Error) -> TlsFailure {
    if let Some(tls) = err.get_ref().and_then(|inner| inner.downcast_ref::<rustls::Error>()) {
        return classify_rustls(tls);
    }
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TlsFailure::Timeout,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
            TlsFailure::Connect(err.to_string())
        }
        _ => TlsFailure::Handshake(err.to_string()),
    }
}

fn classify_rustls(err: &rustls::Error) -> TlsFailure {
    use rustls::CertificateError;

    let rustls::Error::InvalidCertificate(cert_err) = err else {
        return TlsFailure::Handshake(err.to_string());
    };
    match cert_err {
        CertificateError::Expired | CertificateError::ExpiredContext { .. } => {
            TlsFailure::Expired(err.to_string())
        }
        CertificateError::NotValidYet | CertificateError::NotValidYetContext { .. } => {
            TlsFailure::NotYetValid(err.to_string())
        }
        CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. } => {
            TlsFailure::HostnameMismatch(err.to_string())
        }
        _ => TlsFailure::Handshake(err.to_string()),
    }
}

pub fn assess(
    result: std::result::Result<TlsObservation, TlsFailure>,
    now: DateTime<Utc>,
    policy: &ScoringPolicy,
) -> Findings {
    let w = &policy.tls;
    let mut findings = Findings::new(AnalyzerKind::Tls);

    let observation = match result {
        Ok(observation) => observation,
        Err(failure) => {
            debug!(?failure, "tls probe failed");
            match failure {
                TlsFailure::HostnameMismatch(_) => {
                    findings.flag(w.hostname_mismatch, "TLS certificate hostname mismatch")
                }
                TlsFailure::Expired(_) => findings.flag(w.expired, "TLS certificate expired"),
                TlsFailure::NotYetValid(_) => {
                    findings.flag(w.not_yet_valid, "TLS certificate not yet valid")
                }
                TlsFailure::Timeout => findings.flag(
                    policy.failures.tls_timeout.score(),
                    "TLS handshake timed out",
                ),
                TlsFailure::Connect(reason) | TlsFailure::Handshake(reason) => findings.flag(
                    policy.failures.tls.score(),
                    format!("TLS handshake failed ({reason})"),
                ),
            }
            return findings;
        }
    };

    let mut summary = TlsSummary {
        protocol: observation.protocol.clone(),
        cipher: observation.cipher.clone(),
        ..TlsSummary::default()
    };

    let Some(cert) = observation.certificate else {
        findings.flag(w.missing_certificate, "Missing TLS certificate");
        findings.attach(Evidence::Tls(summary));
        return findings;
    };
    summary.subject = Some(cert.subject.clone());
    summary.issuer = Some(cert.issuer.clone());
    summary.not_after = Some(cert.not_after);

    if now < cert.not_before {
        findings.flag(w.not_yet_valid, "TLS certificate not yet valid");
    } else if now > cert.not_after {
        findings.flag(w.expired, "TLS certificate expired");
    } else {
        let days_left = (cert.not_after - now).num_days();
        match tier_for(&w.expiry, days_left) {
            Some(tier) => findings.flag(
                tier.score,
                format!("TLS certificate expires in {days_left} days"),
            ),
            None => findings.note("Valid TLS certificate"),
        }
    }

    if cert.self_issued {
        findings.flag(w.self_signed, "Self-signed TLS certificate");
    }

    if let Some(protocol) = &observation.protocol {
        if WEAK_PROTOCOLS.contains(&protocol.as_str()) {
            findings.flag(w.weak_protocol, format!("Weak TLS protocol negotiated: {protocol}"));
        } else {
            findings.note(format!("Negotiated protocol: {protocol}"));
        }
    }

    if let Some(cipher) = &observation.cipher {
        let upper = cipher.to_uppercase();
        if WEAK_CIPHER_MARKERS.iter().any(|m| upper.contains(m)) {
            findings.flag(w.weak_cipher, format!("Weak cipher suite negotiated: {cipher}"));
        } else {
            findings.note(format!("Cipher suite: {cipher}"));
        }
    }

    findings.attach(Evidence::Tls(summary));
    findings
}

pub struct TlsAnalyzer {
    policy: Arc<ScoringPolicy>,
    probe: Arc<dyn TlsProbe>,
}

impl TlsAnalyzer {
    pub fn new(policy: Arc<ScoringPolicy>, probe: Arc<dyn TlsProbe>) -> Self {
        Self { policy, probe }
    }
}

impl Analyzer for TlsAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Tls
    }

    fn budget(&self) -> Option<Duration> {
        Some(self.policy.timeouts.analyzer())
    }

    fn timeout_mode(&self) -> FailureMode {
        self.policy.failures.tls_timeout
    }

    fn analyze(&self, ctx: &ScanContext) -> Result<AnalyzerOutcome> {
        let result = self.probe.probe(&ctx.request.host);
        Ok(assess(result, Utc::now(), &self.policy).completed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as Days, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    fn cert(not_before: DateTime<Utc>, not_after: DateTime<Utc>, self_issued: bool) -> CertificateFacts {
        CertificateFacts {
            not_before,
            not_after,
            subject: "CN=shop.example.com".into(),
            issuer: if self_issued {
                "CN=shop.example.com".into()
            } else {
                "CN=Example CA".into()
            },
            self_issued,
        }
    }

    fn observed(certificate: Option<CertificateFacts>) -> TlsObservation {
        TlsObservation {
            protocol: Some("TLSv1.3".into()),
            cipher: Some("TLS13_AES_256_GCM_SHA384".into()),
            certificate,
        }
    }

    fn run(result: std::result::Result<TlsObservation, TlsFailure>) -> Findings {
        assess(result, now(), &ScoringPolicy::default())
    }

    fn messages(findings: &Findings) -> Vec<String> {
        findings.signals().iter().map(|s| s.message.clone()).collect()
    }

    #[test]
    fn healthy_certificate_scores_nothing() {
        let findings = run(Ok(observed(Some(cert(now() - Days::days(30), now() + Days::days(200), false)))));
        assert_eq!(findings.score(), 0);
        assert_eq!(
            messages(&findings),
            vec![
                "Valid TLS certificate",
                "Negotiated protocol: TLSv1.3",
                "Cipher suite: TLS13_AES_256_GCM_SHA384",
            ]
        );
    }

    #[test]
    fn expired_certificate_during_handshake() {
        let findings = run(Err(TlsFailure::Expired("certificate expired".into())));
        assert_eq!(findings.score(), 40);
        assert_eq!(messages(&findings), vec!["TLS certificate expired"]);
    }

    #[test]
    fn expired_certificate_after_handshake() {
        let findings = run(Ok(observed(Some(cert(now() - Days::days(400), now() - Days::days(2), false)))));
        assert_eq!(findings.score(), 40);
        assert!(messages(&findings).contains(&"TLS certificate expired".to_string()));
    }

    #[test]
    fn not_yet_valid_certificate() {
        let findings = run(Ok(observed(Some(cert(now() + Days::days(1), now() + Days::days(90), false)))));
        assert_eq!(findings.score(), 30);
    }

    #[test]
    fn expiry_window_tiers() {
        let soon = run(Ok(observed(Some(cert(now() - Days::days(80), now() + Days::days(10), false)))));
        assert_eq!(soon.score(), 20);
        let later = run(Ok(observed(Some(cert(now() - Days::days(80), now() + Days::days(20), false)))));
        assert_eq!(later.score(), 10);
    }

    #[test]
    fn self_signed_certificate() {
        let findings = run(Ok(observed(Some(cert(now() - Days::days(1), now() + Days::days(300), true)))));
        assert_eq!(findings.score(), 35);
        assert!(messages(&findings).contains(&"Self-signed TLS certificate".to_string()));
    }

    #[test]
    fn weak_protocol_and_cipher() {
        let findings = run(Ok(TlsObservation {
            protocol: Some("TLSv1".into()),
            cipher: Some("TLS_RSA_WITH_3DES_EDE_CBC_SHA".into()),
            certificate: Some(cert(now() - Days::days(1), now() + Days::days(300), false)),
        }));
        assert_eq!(findings.score(), 50);
    }

    #[test]
    fn tls12_is_not_weak() {
        let findings = run(Ok(TlsObservation {
            protocol: Some("TLSv1.2".into()),
            cipher: Some("TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256".into()),
            certificate: Some(cert(now() - Days::days(1), now() + Days::days(300), false)),
        }));
        assert_eq!(findings.score(), 0);
    }

    #[test]
    fn missing_certificate_is_terminal() {
        let findings = run(Ok(observed(None)));
        assert_eq!(findings.score(), 40);
        assert_eq!(messages(&findings), vec!["Missing TLS certificate"]);
    }

    #[test]
    fn handshake_failures() {
        assert_eq!(run(Err(TlsFailure::HostnameMismatch("x".into()))).score(), 40);
        assert_eq!(run(Err(TlsFailure::Handshake("alert".into()))).score(), 30);
        assert_eq!(run(Err(TlsFailure::Connect("refused".into()))).score(), 30);
        assert_eq!(run(Err(TlsFailure::Timeout)).score(), 30);
    }

    #[test]
    fn rustls_errors_are_classified() {
        use rustls::CertificateError;
        let expired = rustls::Error::InvalidCertificate(CertificateError::Expired);
        assert!(matches!(classify_rustls(&expired), TlsFailure::Expired(_)));
        let name = rustls::Error::InvalidCertificate(CertificateError::NotValidForName);
        assert!(matches!(classify_rustls(&name), TlsFailure::HostnameMismatch(_)));
        let early = rustls::Error::InvalidCertificate(CertificateError::NotValidYet);
        assert!(matches!(classify_rustls(&early), TlsFailure::NotYetValid(_)));
        let revoked = rustls::Error::InvalidCertificate(CertificateError::Revoked);
        assert!(matches!(classify_rustls(&revoked), TlsFailure::Handshake(_)));
        let wrapped = io::Error::new(io::ErrorKind::InvalidData, expired);
        assert!(matches!(classify_io(wrapped), TlsFailure::Expired(_)));
        let timeout = io::Error::new(io::ErrorKind::TimedOut, "timed out");
        assert_eq!(classify_io(timeout), TlsFailure::Timeout);
    }

    #[test]
    fn context_carrying_certificate_errors_are_classified() {
        use rustls::pki_types::UnixTime;
        use rustls::CertificateError;

        let at = |secs| UnixTime::since_unix_epoch(std::time::Duration::from_secs(secs));
        let expired = rustls::Error::InvalidCertificate(CertificateError::ExpiredContext {
            time: at(1_800_000_000),
            not_after: at(1_700_000_000),
        });
        assert!(matches!(classify_rustls(&expired), TlsFailure::Expired(_)));
        let early = rustls::Error::InvalidCertificate(CertificateError::NotValidYetContext {
            time: at(1_700_000_000),
            not_before: at(1_800_000_000),
        });
        assert!(matches!(classify_rustls(&early), TlsFailure::NotYetValid(_)));
    }
}

//! Input canonicalization.
//!
//! Raw operator input is turned into a `scheme://host[:port]/path[?query]`
//! string with an IDNA-encoded, lower-cased host that satisfies the hostname
//! grammar. Anything that cannot get there is rejected outright.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::error::{Result, ScanError};

static SCHEME_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").expect("static regex"));

const MAX_HOST_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// One scan's view of its input. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanRequest {
    pub raw: String,
    pub url: String,
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub query: Option<String>,
    pub has_credentials: bool,
}

impl ScanRequest {
    pub fn parse(raw: &str) -> Result<Self> {
        let parsed = parse_canonical(raw)
            .ok_or_else(|| ScanError::InvalidInput(format!("cannot normalize {raw:?}")))?;
        Ok(Self {
            raw: raw.to_string(),
            ..parsed
        })
    }

    /// Host, path and query glued together, as scanned by the lexical checks.
    pub fn haystack(&self) -> String {
        let mut out = String::with_capacity(self.url.len());
        out.push_str(&self.host);
        out.push_str(&self.path);
        if let Some(q) = &self.query {
            out.push('?');
            out.push_str(q);
        }
        out
    }
}

/// Canonical form of `raw`, or `None` when there is no usable host.
///
/// Normalizing an already-normalized URL returns it unchanged.
pub fn normalize(raw: &str) -> Option<String> {
    parse_canonical(raw).map(|req| req.url)
}

fn parse_canonical(raw: &str) -> Option<ScanRequest> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != '\r' && *c != '\n').collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        return None;
    }

    let candidate = if SCHEME_PREFIX.is_match(cleaned) {
        cleaned.to_string()
    } else {
        format!("https://{cleaned}")
    };

    let url = Url::parse(&candidate).ok()?;
    let host = url.host_str()?;
    let host = idna::domain_to_ascii(host).ok()?.to_lowercase();
    if !is_valid_hostname(&host) {
        return None;
    }

    let scheme = url.scheme().to_string();
    let path = url.path().to_string();
    let query = url.query().map(str::to_string);
    let port = url.port();

    let mut canonical = format!("{scheme}://{host}");
    if let Some(port) = port {
        canonical.push_str(&format!(":{port}"));
    }
    canonical.push_str(&path);
    if let Some(q) = &query {
        canonical.push('?');
        canonical.push_str(q);
    }

    Some(ScanRequest {
        raw: raw.to_string(),
        url: canonical,
        scheme,
        host,
        port,
        path,
        query,
        has_credentials: !url.username().is_empty() || url.password().is_some(),
    })
}

/// DNS hostname grammar, restricted to names with at least two labels.
pub fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_HOST_LEN {
        return false;
    }
    if host.starts_with('.') || host.ends_with('.') || !host.contains('.') {
        return false;
    }

    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_blank_input_is_rejected() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("   \t "), None);
        assert_eq!(normalize("\r\n"), None);
        assert_eq!(normalize("..."), None);
    }

    #[test]
    fn missing_scheme_defaults_to_https() {
        assert_eq!(normalize("example.com").as_deref(), Some("https://example.com/"));
        assert_eq!(
            normalize("  Example.COM/Login?A=B ").as_deref(),
            Some("https://example.com/Login?A=B")
        );
    }

    #[test]
    fn explicit_scheme_is_kept() {
        assert_eq!(
            normalize("http://example.com:8080/x").as_deref(),
            Some("http://example.com:8080/x")
        );
        assert_eq!(normalize("https://example.com:443/").as_deref(), Some("https://example.com/"));
    }

    #[test]
    fn strips_line_breaks_and_leading_dots() {
        assert_eq!(
            normalize("..exa\r\nmple.org/path").as_deref(),
            Some("https://example.org/path")
        );
    }

    #[test]
    fn encodes_internationalized_hosts() {
        assert_eq!(normalize("bücher.de").as_deref(), Some("https://xn--bcher-kva.de/"));
    }

    #[test]
    fn hostname_grammar() {
        assert!(is_valid_hostname("a.b"));
        assert!(is_valid_hostname("my-site.example.co.uk"));
        assert!(is_valid_hostname("192.168.0.1"));
        assert!(!is_valid_hostname("localhost"));
        assert!(!is_valid_hostname("example..com"));
        assert!(!is_valid_hostname("-bad.com"));
        assert!(!is_valid_hostname("bad-.com"));
        assert!(!is_valid_hostname("under_score.com"));
        assert!(!is_valid_hostname(&format!("{}.com", "a".repeat(64))));
        assert!(is_valid_hostname(&format!("{}.com", "a".repeat(63))));
        let long = vec!["abcdefghi"; 26].join(".");
        assert!(long.len() > MAX_HOST_LEN);
        assert!(!is_valid_hostname(&long));
    }

    #[test]
    fn rejects_hosts_outside_the_grammar() {
        assert_eq!(normalize("localhost"), None);
        assert_eq!(normalize("http://[::1]/"), None);
        assert_eq!(normalize("https:///nohost"), None);
        assert_eq!(normalize("exa mple.com"), None);
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in [
            "example.com",
            "HTTP://Sub.Example.com:8443/a/B?c=D&e=%20f",
            "bücher.de/straße",
            "user:pw@bank-login.example.net/x",
            "https://example.com/a%2Fb?q=1#frag",
        ] {
            let once = normalize(input).expect("normalizes");
            assert_eq!(normalize(&once).as_deref(), Some(once.as_str()), "input {input}");
        }
    }

    #[test]
    fn request_fields() {
        let req = ScanRequest::parse(" user@Login.Example.com/Path?x=1 ").expect("valid");
        assert_eq!(req.host, "login.example.com");
        assert_eq!(req.path, "/Path");
        assert_eq!(req.query.as_deref(), Some("x=1"));
        assert!(req.has_credentials);
        assert_eq!(req.haystack(), "login.example.com/Path?x=1");
        assert_eq!(req.raw, " user@Login.Example.com/Path?x=1 ");
    }

    #[test]
    fn parse_reports_invalid_input() {
        let err = ScanRequest::parse("").unwrap_err();
        assert!(matches!(err, ScanError::InvalidInput(_)));
    }
}

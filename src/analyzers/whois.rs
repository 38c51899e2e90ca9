//! Minimal port-43 WHOIS client.
//!
//! Queries the registry server for the TLD (IANA when unknown, following one
//! `refer:` hop) and pulls the creation date, expiry date and registrar out
//! of the free-text reply.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::AnalyzerKind;
use crate::catalog::{IANA_WHOIS, WHOIS_SERVERS};
use crate::error::{Result, ScanError};

const WHOIS_PORT: u16 = 43;
const MAX_REPLY_BYTES: u64 = 256 * 1024;

static CREATED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^\s*(?:creation date|created|created on|registered on|registration time|domain registration date|registered)\s*:\s*(.+?)\s*$",
    )
    .expect("static regex")
});
static EXPIRES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^\s*(?:registry expiry date|registrar registration expiration date|expiry date|expiration date|expires on|expire date|paid-till|expires)\s*:\s*(.+?)\s*$",
    )
    .expect("static regex")
});
static REGISTRAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*registrar\s*:\s*(.+?)\s*$").expect("static regex"));
static REFER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:refer|whois)\s*:\s*([a-z0-9.\-]+)\s*$").expect("static regex")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhoisRecord {
    pub created: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
    pub registrar: Option<String>,
}

impl WhoisRecord {
    pub fn is_empty(&self) -> bool {
        self.created.is_none() && self.expires.is_none() && self.registrar.is_none()
    }
}

pub trait WhoisLookup: Send + Sync {
    fn lookup(&self, domain: &str) -> Result<WhoisRecord>;
}

pub struct Port43Client {
    timeout: Duration,
}

impl Port43Client {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn query(&self, server: &str, domain: &str) -> Result<String> {
        let addr = (server, WHOIS_PORT)
            .to_socket_addrs()
            .map_err(|e| ScanError::network(AnalyzerKind::DomainIntel, format!("{server}: {e}")))?
            .next()
            .ok_or_else(|| {
                ScanError::network(AnalyzerKind::DomainIntel, format!("{server}: no address"))
            })?;

        let io_err = |e: std::io::Error| {
            ScanError::network(AnalyzerKind::DomainIntel, format!("whois {server}: {e}"))
        };
        let mut stream = TcpStream::connect_timeout(&addr, self.timeout).map_err(io_err)?;
        stream.set_read_timeout(Some(self.timeout)).map_err(io_err)?;
        stream.set_write_timeout(Some(self.timeout)).map_err(io_err)?;
        stream.write_all(format!("{domain}\r\n").as_bytes()).map_err(io_err)?;

        let mut reply = Vec::new();
        stream.take(MAX_REPLY_BYTES).read_to_end(&mut reply).map_err(io_err)?;
        Ok(String::from_utf8_lossy(&reply).into_owned())
    }
}

impl WhoisLookup for Port43Client {
    fn lookup(&self, domain: &str) -> Result<WhoisRecord> {
        let tld = domain.rsplit('.').next().unwrap_or(domain);
        let mut server = server_for(tld).to_string();
        let mut reply = self.query(&server, domain)?;

        if server == IANA_WHOIS {
            if let Some(referral) = referral(&reply) {
                debug!(domain, referral = %referral, "following whois referral");
                server = referral;
                reply = self.query(&server, domain)?;
            }
        }

        let record = parse_record(&reply);
        if record.is_empty() {
            return Err(ScanError::network(
                AnalyzerKind::DomainIntel,
                format!("{server} returned no registration data for {domain}"),
            ));
        }
        Ok(record)
    }
}

pub fn server_for(tld: &str) -> &'static str {
    WHOIS_SERVERS
        .iter()
        .find(|(t, _)| t.eq_ignore_ascii_case(tld))
        .map(|(_, server)| *server)
        .unwrap_or(IANA_WHOIS)
}

fn referral(reply: &str) -> Option<String> {
    REFER
        .captures(reply)
        .map(|c| c[1].to_lowercase())
        .filter(|s| s != IANA_WHOIS)
}

pub fn parse_record(reply: &str) -> WhoisRecord {
    WhoisRecord {
        created: first_date(&CREATED, reply),
        expires: first_date(&EXPIRES, reply),
        registrar: REGISTRAR
            .captures(reply)
            .map(|c| c[1].to_string())
            .filter(|s| !s.is_empty()),
    }
}

fn first_date(re: &Regex, reply: &str) -> Option<DateTime<Utc>> {
    re.captures_iter(reply).find_map(|c| parse_whois_date(&c[1]))
}

/// Registries disagree on date formats; try the common ones.
pub fn parse_whois_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y.%m.%d %H:%M:%S",
        "%d-%b-%Y %H:%M:%S",
    ];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y.%m.%d", "%d-%b-%Y", "%d.%m.%Y", "%Y/%m/%d"];

    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }

    let head = value.split_whitespace().next().unwrap_or(value);
    for candidate in [value, head] {
        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(candidate, fmt) {
                return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const VERISIGN_REPLY: &str = "   Domain Name: EXAMPLE.COM\r\n\
   Registry Domain ID: 2336799_DOMAIN_COM-VRSN\r\n\
   Registrar WHOIS Server: whois.iana.org\r\n\
   Updated Date: 2024-08-14T07:01:34Z\r\n\
   Creation Date: 1995-08-14T04:00:00Z\r\n\
   Registry Expiry Date: 2025-08-13T04:00:00Z\r\n\
   Registrar: RESERVED-Internet Assigned Numbers Authority\r\n";

    #[test]
    fn parses_verisign_style_reply() {
        let record = parse_record(VERISIGN_REPLY);
        assert_eq!(record.created, Some(Utc.with_ymd_and_hms(1995, 8, 14, 4, 0, 0).unwrap()));
        assert_eq!(record.expires, Some(Utc.with_ymd_and_hms(2025, 8, 13, 4, 0, 0).unwrap()));
        assert_eq!(
            record.registrar.as_deref(),
            Some("RESERVED-Internet Assigned Numbers Authority")
        );
    }

    #[test]
    fn parses_ru_style_reply() {
        let record = parse_record("domain: EXAMPLE.RU\ncreated: 2023-01-05T10:11:12Z\npaid-till: 2026-01-05T21:00:00Z\n");
        assert_eq!(record.created, Some(Utc.with_ymd_and_hms(2023, 1, 5, 10, 11, 12).unwrap()));
        assert!(record.expires.is_some());
    }

    #[test]
    fn date_formats() {
        let midnight = |y, m, d| Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap();
        assert_eq!(parse_whois_date("2020-03-01"), Some(midnight(2020, 3, 1)));
        assert_eq!(parse_whois_date("01-Mar-2020"), Some(midnight(2020, 3, 1)));
        assert_eq!(parse_whois_date("2020.03.01"), Some(midnight(2020, 3, 1)));
        assert_eq!(parse_whois_date("2020-03-01 (YYYY-MM-DD)"), Some(midnight(2020, 3, 1)));
        assert_eq!(
            parse_whois_date("2020-03-01 12:30:00"),
            Some(Utc.with_ymd_and_hms(2020, 3, 1, 12, 30, 0).unwrap())
        );
        assert_eq!(parse_whois_date("not a date"), None);
    }

    #[test]
    fn empty_reply_has_no_record() {
        assert!(parse_record("No match for \"NOPE.COM\".").is_empty());
    }

    #[test]
    fn server_table_and_referral() {
        assert_eq!(server_for("com"), "whois.verisign-grs.com");
        assert_eq!(server_for("COM"), "whois.verisign-grs.com");
        assert_eq!(server_for("museum"), IANA_WHOIS);
        assert_eq!(
            referral("domain: MUSEUM\nrefer: whois.nic.museum\n").as_deref(),
            Some("whois.nic.museum")
        );
        assert_eq!(referral("nothing here"), None);
    }
}

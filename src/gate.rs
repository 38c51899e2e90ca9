//! Resolvability gate.
//!
//! A host that does not resolve is not analyzed any further: the scan ends
//! with a fixed high-risk score and the network probes never start.

use std::io;
use std::net::{IpAddr, ToSocketAddrs};

use tracing::debug;

use crate::error::{Result, ScanError};
use crate::normalize::is_valid_hostname;

/// Forward lookups. The default goes through the platform resolver.
pub trait Resolver: Send + Sync {
    fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let mut addrs: Vec<IpAddr> = Vec::new();
        for ip in (host, 0).to_socket_addrs()?.map(|sa| sa.ip()) {
            if !addrs.contains(&ip) {
                addrs.push(ip);
            }
        }
        Ok(addrs)
    }
}

/// The addresses `host` resolves to, or [`ScanError::UnresolvableDomain`].
pub fn check(resolver: &dyn Resolver, host: &str) -> Result<Vec<IpAddr>> {
    if !is_valid_hostname(host) {
        return Err(ScanError::UnresolvableDomain(format!(
            "{host} is not a valid hostname"
        )));
    }
    match resolver.resolve(host) {
        Ok(addrs) if !addrs.is_empty() => {
            debug!(host, addresses = addrs.len(), "host resolved");
            Ok(addrs)
        }
        Ok(_) => Err(ScanError::UnresolvableDomain(format!(
            "{host} has no address records"
        ))),
        Err(e) => Err(ScanError::UnresolvableDomain(format!("{host}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    struct Fixed(Option<Vec<IpAddr>>);

    impl Resolver for Fixed {
        fn resolve(&self, _host: &str) -> io::Result<Vec<IpAddr>> {
            self.0
                .clone()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "NXDOMAIN"))
        }
    }

    #[test]
    fn resolved_addresses_are_kept() {
        let ip = IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34));
        let addrs = check(&Fixed(Some(vec![ip])), "example.com").unwrap();
        assert_eq!(addrs, vec![ip]);
    }

    #[test]
    fn lookup_failure_and_empty_answer_are_unresolvable() {
        let err = check(&Fixed(None), "nope.invalid").unwrap_err();
        assert!(matches!(err, ScanError::UnresolvableDomain(_)));
        assert_eq!(err.to_string(), "domain does not resolve: nope.invalid: NXDOMAIN");
        assert!(matches!(
            check(&Fixed(Some(vec![])), "empty.example"),
            Err(ScanError::UnresolvableDomain(_))
        ));
    }

    #[test]
    fn grammar_failure_skips_lookup() {
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert!(matches!(
            check(&Fixed(Some(vec![ip])), "localhost"),
            Err(ScanError::UnresolvableDomain(_))
        ));
    }
}

//! Outbound-URL safety check for the `http.request` executor: the host
//! must be on the configured allowlist and must not resolve to a
//! loopback, RFC1918, `.local`, or `.internal` address.

use std::net::IpAddr;

use reqwest::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsrfRejection {
    NoHost,
    NotAllowlisted,
    DisallowedHost,
}

pub fn check_allowed(url: &Url, allowed_domains: &[String]) -> Result<(), SsrfRejection> {
    let host = url.host_str().ok_or(SsrfRejection::NoHost)?;

    if host.eq_ignore_ascii_case("localhost") || host.ends_with(".local") || host.ends_with(".internal") {
        return Err(SsrfRejection::DisallowedHost);
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_or_loopback(&ip) {
            return Err(SsrfRejection::DisallowedHost);
        }
    }

    let allowed = allowed_domains
        .iter()
        .any(|d| host.eq_ignore_ascii_case(d) || host.to_lowercase().ends_with(&format!(".{}", d.to_lowercase())));
    if !allowed {
        return Err(SsrfRejection::NotAllowlisted);
    }

    Ok(())
}

fn is_private_or_loopback(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowlist() -> Vec<String> {
        vec!["example.com".into()]
    }

    #[test]
    fn allows_exact_and_subdomain_matches() {
        assert!(check_allowed(&Url::parse("https://example.com/hook").unwrap(), &allowlist()).is_ok());
        assert!(check_allowed(&Url::parse("https://hooks.example.com/x").unwrap(), &allowlist()).is_ok());
    }

    #[test]
    fn rejects_domain_not_on_allowlist() {
        assert_eq!(
            check_allowed(&Url::parse("https://evil.com/hook").unwrap(), &allowlist()),
            Err(SsrfRejection::NotAllowlisted)
        );
    }

    #[test]
    fn rejects_localhost_and_internal_suffixes() {
        assert_eq!(
            check_allowed(&Url::parse("http://localhost/x").unwrap(), &allowlist()),
            Err(SsrfRejection::DisallowedHost)
        );
        assert_eq!(
            check_allowed(&Url::parse("http://svc.internal/x").unwrap(), &["svc.internal".into()]),
            Err(SsrfRejection::DisallowedHost)
        );
    }

    #[test]
    fn rejects_rfc1918_literal_ip() {
        assert_eq!(
            check_allowed(&Url::parse("http://10.0.0.5/x").unwrap(), &["10.0.0.5".into()]),
            Err(SsrfRejection::DisallowedHost)
        );
    }
}

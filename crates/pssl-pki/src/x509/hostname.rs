//! Host name checks against certificate identities (RFC 6125).

use super::Certificate;

/// Whether `cert` was issued for `host`.
///
/// subjectAltName entries take precedence; the subject common name is only
/// consulted when the certificate has no subjectAltName extension. IP
/// literals match iPAddress entries only. A wildcard is accepted as the
/// whole leftmost label and covers exactly one label.
pub fn matches_host(cert: &Certificate, host: &str) -> bool {
    let host = host.trim();
    if host.is_empty() {
        return false;
    }
    if let Some(ip) = parse_ip(host) {
        return cert.ip_addresses().iter().any(|a| *a == ip);
    }
    if cert.subject_alt_name().is_some() {
        return cert.dns_names().iter().any(|n| matches_dns(n, host));
    }
    matches_dns(&cert.subject.common_name, host)
}

pub(crate) fn matches_dns(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if pattern.is_empty() {
        return false;
    }
    let Some(suffix) = pattern.strip_prefix("*.") else {
        return !pattern.contains('*') && pattern == host;
    };
    // `*.com` is too broad and partial wildcards are refused.
    if suffix.contains('*') || !suffix.contains('.') {
        return false;
    }
    match host.split_once('.') {
        Some((label, rest)) => !label.is_empty() && rest == suffix,
        None => false,
    }
}

fn parse_ip(s: &str) -> Option<Vec<u8>> {
    if let Ok(ip) = s.parse::<std::net::Ipv4Addr>() {
        return Some(ip.octets().to_vec());
    }
    if let Ok(ip) = s.parse::<std::net::Ipv6Addr>() {
        return Some(ip.octets().to_vec());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSA_SERVER: &str = include_str!("../../tests/data/rsa_server.pem");

    #[test]
    fn test_exact_and_case_insensitive() {
        assert!(matches_dns("example.com", "example.com"));
        assert!(matches_dns("Example.COM", "example.com"));
        assert!(matches_dns("example.com.", "example.com"));
        assert!(!matches_dns("example.com", "other.com"));
        assert!(!matches_dns("", "example.com"));
    }

    #[test]
    fn test_wildcard_rules() {
        assert!(matches_dns("*.example.com", "foo.example.com"));
        assert!(!matches_dns("*.example.com", "example.com"));
        assert!(!matches_dns("*.example.com", "a.b.example.com"));
        assert!(!matches_dns("*.com", "example.com"));
        assert!(!matches_dns("f*o.example.com", "foo.example.com"));
        assert!(!matches_dns("*.*.com", "a.b.com"));
    }

    #[test]
    fn test_certificate_san_match() {
        let cert = Certificate::parse_all(RSA_SERVER.as_bytes()).unwrap().remove(0);
        assert!(matches_host(&cert, "example.com"));
        assert!(matches_host(&cert, "WWW.example.com"));
        assert!(!matches_host(&cert, "other.com"));
        assert!(!matches_host(&cert, "127.0.0.1"));
        assert!(!matches_host(&cert, " "));
    }
}

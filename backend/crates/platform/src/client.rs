//! Client identification utilities
//!
//! Derives the identity that inbound requests are rate limited by.

use axum::http::HeaderMap;
use std::fmt;
use std::net::IpAddr;

/// Key used when no peer address is known
pub const UNKNOWN_CLIENT: &str = "unknown";

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Identity of an inbound caller
///
/// Keyed on the originating network address. Not persisted anywhere beyond
/// the rate limiter's window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    ip: Option<IpAddr>,
}

impl ClientIdentity {
    pub fn new(ip: Option<IpAddr>) -> Self {
        Self { ip }
    }

    /// Build the identity from request headers and the peer address
    ///
    /// Forwarding headers only count when the peer is a trusted proxy.
    pub fn from_request(
        headers: &HeaderMap,
        peer_ip: Option<IpAddr>,
        trusted_proxies: &[IpAddr],
    ) -> Self {
        Self::new(extract_client_ip(headers, peer_ip, trusted_proxies))
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    /// Rate limit store key
    pub fn key(&self) -> String {
        match self.ip {
            Some(ip) => ip.to_string(),
            None => UNKNOWN_CLIENT.to_string(),
        }
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Extract client IP address
///
/// The peer address is the client unless the peer is one of
/// `trusted_proxies`. Behind a trusted proxy, X-Forwarded-For is read from
/// the right and the first hop that is not itself a trusted proxy wins.
///
/// ## Arguments
/// * `headers` - HTTP request headers
/// * `peer_ip` - Address of the TCP peer
/// * `trusted_proxies` - Proxies allowed to report the client address
///
/// ## Returns
/// The client IP address, or None if not determinable
pub fn extract_client_ip(
    headers: &HeaderMap,
    peer_ip: Option<IpAddr>,
    trusted_proxies: &[IpAddr],
) -> Option<IpAddr> {
    let peer = peer_ip?;
    if !trusted_proxies.contains(&peer) {
        return Some(peer);
    }

    let Some(xff) = headers.get(FORWARDED_FOR).and_then(|v| v.to_str().ok()) else {
        return Some(peer);
    };

    for hop in xff.rsplit(',') {
        // A hop we cannot read ends the trusted chain
        let Ok(ip) = hop.trim().parse::<IpAddr>() else {
            return Some(peer);
        };
        if !trusted_proxies.contains(&ip) {
            return Some(ip);
        }
    }
    Some(peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ip(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_untrusted_peer_ignores_xff() {
        let headers = forwarded("192.168.1.1, 10.0.0.1");

        let client = extract_client_ip(&headers, Some(ip("203.0.113.5")), &[]);
        assert_eq!(client, Some(ip("203.0.113.5")));
    }

    #[test]
    fn test_trusted_peer_uses_rightmost_untrusted_hop() {
        let proxies = [ip("10.0.0.1"), ip("10.0.0.2")];
        let headers = forwarded("1.1.1.1, 198.51.100.7, 10.0.0.2");

        let client = extract_client_ip(&headers, Some(ip("10.0.0.1")), &proxies);
        assert_eq!(client, Some(ip("198.51.100.7")));
    }

    #[test]
    fn test_trusted_peer_garbage_xff_falls_back() {
        let proxies = [ip("127.0.0.1")];
        let headers = forwarded("not-an-ip");

        let client = extract_client_ip(&headers, Some(ip("127.0.0.1")), &proxies);
        assert_eq!(client, Some(ip("127.0.0.1")));
    }

    #[test]
    fn test_trusted_peer_without_xff() {
        let proxies = [ip("127.0.0.1")];

        let client = extract_client_ip(&HeaderMap::new(), Some(ip("127.0.0.1")), &proxies);
        assert_eq!(client, Some(ip("127.0.0.1")));
    }

    #[test]
    fn test_no_peer_is_unknown() {
        let headers = forwarded("198.51.100.7");
        assert_eq!(extract_client_ip(&headers, None, &[]), None);
    }

    #[test]
    fn test_identity_key() {
        let identity = ClientIdentity::new(Some(ip("10.1.2.3")));
        assert_eq!(identity.key(), "10.1.2.3");
        assert_eq!(ClientIdentity::new(None).key(), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_identity_from_request_rotating_xff_is_one_client() {
        let peer = Some(ip("10.9.9.9"));
        let first = ClientIdentity::from_request(&forwarded("1.2.3.1"), peer, &[]);
        let second = ClientIdentity::from_request(&forwarded("1.2.3.2"), peer, &[]);

        assert_eq!(first, second);
        assert_eq!(first.to_string(), "10.9.9.9");
    }
}

//! Client identification utilities
//!
//! Common functions for identifying clients via HTTP headers.
//!
//! `X-Forwarded-For` is client-controlled unless a proxy we operate wrote
//! it, so it is only read when the connecting peer is a trusted proxy.

use axum::http::{HeaderMap, header};
use std::net::IpAddr;
use std::sync::Arc;

/// User agents longer than this are truncated before storage
pub const MAX_USER_AGENT_LENGTH: usize = 512;

/// Request origin metadata recorded on sessions and audit events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    /// Client IP address (peer, or forwarded by a trusted proxy)
    pub ip: Option<IpAddr>,
    /// User-Agent header, truncated to [`MAX_USER_AGENT_LENGTH`] characters
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(ip: Option<IpAddr>, user_agent: Option<String>) -> Self {
        Self { ip, user_agent }
    }

    /// Get IP as string (for database storage)
    pub fn ip_string(&self) -> Option<String> {
        self.ip.map(|ip| ip.to_string())
    }
}

/// Reverse proxies whose `X-Forwarded-For` is believed. Empty by default:
/// only the socket peer counts.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies(Arc<[IpAddr]>);

impl TrustedProxies {
    pub fn new(proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        Self(proxies.into_iter().collect())
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.0.contains(ip)
    }
}

/// Extract client metadata from request headers
///
/// ## Arguments
/// * `headers` - HTTP request headers
/// * `direct_ip` - Peer address of the connection
/// * `proxies` - Peers allowed to report the originating address
pub fn extract_client_info(
    headers: &HeaderMap,
    direct_ip: Option<IpAddr>,
    proxies: &TrustedProxies,
) -> ClientInfo {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| ua.chars().take(MAX_USER_AGENT_LENGTH).collect());

    ClientInfo::new(extract_client_ip(headers, direct_ip, proxies), user_agent)
}

/// Extract client IP address
///
/// The peer address wins unless the peer is a trusted proxy. Then the
/// X-Forwarded-For chain is walked from the right, skipping our own
/// proxies, and the first other hop is the client.
///
/// ## Returns
/// The client IP address, or None without a peer address
pub fn extract_client_ip(
    headers: &HeaderMap,
    direct_ip: Option<IpAddr>,
    proxies: &TrustedProxies,
) -> Option<IpAddr> {
    let peer = direct_ip?;
    if !proxies.contains(&peer) {
        return Some(peer);
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|xff| {
            xff.rsplit(',')
                .map(|hop| hop.trim().parse::<IpAddr>())
                .find(|hop| !matches!(hop, Ok(ip) if proxies.contains(ip)))
        });

    match forwarded {
        Some(Ok(ip)) => Some(ip),
        // Unparsable hop or nothing forwarded: fall back to the proxy itself
        _ => Some(peer),
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively; an empty token is treated as absent.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn xff(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(value));
        headers
    }

    fn ip(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    #[test]
    fn test_extract_client_info() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 Test Browser"),
        );

        let proxies = TrustedProxies::default();
        let info = extract_client_info(&headers, Some(ip("127.0.0.1")), &proxies);
        assert_eq!(info.user_agent.as_deref(), Some("Mozilla/5.0 Test Browser"));
        assert_eq!(info.ip_string().as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn test_user_agent_is_truncated() {
        let mut headers = HeaderMap::new();
        let long = "a".repeat(MAX_USER_AGENT_LENGTH + 100);
        headers.insert(header::USER_AGENT, HeaderValue::from_str(&long).unwrap());

        let info = extract_client_info(&headers, None, &TrustedProxies::default());
        assert_eq!(info.user_agent.unwrap().len(), MAX_USER_AGENT_LENGTH);
    }

    #[test]
    fn test_xff_ignored_from_untrusted_peer() {
        let headers = xff("192.168.1.1");
        let peer = ip("203.0.113.7");

        let none = TrustedProxies::default();
        assert_eq!(extract_client_ip(&headers, Some(peer), &none), Some(peer));
        assert_eq!(extract_client_ip(&headers, None, &none), None);

        let other = TrustedProxies::new([ip("10.0.0.1")]);
        assert_eq!(extract_client_ip(&headers, Some(peer), &other), Some(peer));
    }

    #[test]
    fn test_xff_walked_from_the_right_behind_trusted_proxies() {
        let proxies = TrustedProxies::new([ip("10.0.0.1"), ip("10.0.0.2")]);

        // The leftmost entry is whatever the client sent
        let headers = xff("1.2.3.4, 198.51.100.9, 10.0.0.2");
        let client = extract_client_ip(&headers, Some(ip("10.0.0.1")), &proxies);
        assert_eq!(client, Some(ip("198.51.100.9")));

        let headers = xff("192.168.1.1");
        let client = extract_client_ip(&headers, Some(ip("10.0.0.1")), &proxies);
        assert_eq!(client, Some(ip("192.168.1.1")));
    }

    #[test]
    fn test_garbage_xff_falls_back_to_peer() {
        let proxies = TrustedProxies::new([ip("10.1.2.3")]);
        let direct = ip("10.1.2.3");

        assert_eq!(extract_client_ip(&xff("unknown"), Some(direct), &proxies), Some(direct));
        assert_eq!(extract_client_ip(&HeaderMap::new(), Some(direct), &proxies), Some(direct));
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(extract_bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer xyz"));
        assert_eq!(extract_bearer_token(&headers), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwdw=="));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);
    }
}

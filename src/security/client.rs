//! Client identification for rate limiting and access lists.
//!
//! Authenticated callers are keyed by user id and API clients by their key,
//! so each gets an individual quota. Anonymous callers are keyed by apparent
//! network origin. Forwarding headers are taken at face value and can be
//! spoofed; the eviction sweep bounds the memory such keys can consume.

use std::net::SocketAddr;

use axum::http::HeaderMap;

pub const X_API_KEY: &str = "x-api-key";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Key a request is rate limited under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientKey {
    User(String),
    ApiKey(String),
    Ip(String),
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientKey::User(id) => write!(f, "user:{}", id),
            ClientKey::ApiKey(key) => write!(f, "api:{}", key),
            ClientKey::Ip(addr) => write!(f, "ip:{}", addr),
        }
    }
}

/// Pick the rate limit key: user id, then `X-API-Key`, then apparent address.
pub fn derive_client_key(
    user_id: Option<&str>,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> ClientKey {
    if let Some(id) = user_id.filter(|id| !id.is_empty()) {
        return ClientKey::User(id.to_string());
    }

    if let Some(key) = header_value(headers, X_API_KEY) {
        return ClientKey::ApiKey(key.to_string());
    }

    ClientKey::Ip(client_address(headers, peer).unwrap_or_else(|| "unknown".to_string()))
}

/// Apparent client address: first `X-Forwarded-For` hop, then `X-Real-IP`,
/// then the socket peer. The value is not parsed here.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    if let Some(forwarded) = header_value(headers, X_FORWARDED_FOR) {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return Some(first.to_string());
        }
    }

    if let Some(real_ip) = header_value(headers, X_REAL_IP) {
        return Some(real_ip.to_string());
    }

    peer.map(|addr| addr.ip().to_string())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.10:51000".parse().unwrap())
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn user_id_wins_over_everything() {
        let h = headers(&[(X_API_KEY, "k1"), (X_FORWARDED_FOR, "203.0.113.5")]);
        assert_eq!(derive_client_key(Some("42"), &h, peer()).to_string(), "user:42");
    }

    #[test]
    fn api_key_wins_over_addresses() {
        let h = headers(&[(X_API_KEY, "k1"), (X_FORWARDED_FOR, "203.0.113.5")]);
        assert_eq!(derive_client_key(None, &h, peer()).to_string(), "api:k1");
    }

    #[test]
    fn forwarded_for_uses_first_hop() {
        let h = headers(&[(X_FORWARDED_FOR, " 203.0.113.5 , 10.0.0.1"), (X_REAL_IP, "198.51.100.1")]);
        assert_eq!(derive_client_key(None, &h, peer()).to_string(), "ip:203.0.113.5");
    }

    #[test]
    fn real_ip_then_peer() {
        let h = headers(&[(X_REAL_IP, "198.51.100.1")]);
        assert_eq!(derive_client_key(None, &h, peer()).to_string(), "ip:198.51.100.1");
        assert_eq!(derive_client_key(None, &HeaderMap::new(), peer()).to_string(), "ip:192.0.2.10");
    }

    #[test]
    fn empty_values_are_skipped() {
        let h = headers(&[(X_API_KEY, " "), (X_FORWARDED_FOR, ",")]);
        assert_eq!(derive_client_key(Some(""), &h, None).to_string(), "ip:unknown");
    }
}

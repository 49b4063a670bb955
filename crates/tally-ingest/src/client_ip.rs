//! Client IP resolution for rate limiting.

use std::net::SocketAddr;

use axum::http::HeaderMap;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Best-effort caller address: the first `X-Forwarded-For` entry, then
/// `X-Real-IP` (both only when proxy headers are trusted), then the socket
/// peer, then `"unknown"`.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy_headers: bool) -> String {
  if trust_proxy_headers {
    let forwarded = header_str(headers, X_FORWARDED_FOR)
      .and_then(|v| v.split(',').next())
      .map(str::trim)
      .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
      return ip.to_owned();
    }
    if let Some(ip) = header_str(headers, X_REAL_IP).map(str::trim).filter(|ip| !ip.is_empty()) {
      return ip.to_owned();
    }
  }
  peer.map_or_else(|| "unknown".to_owned(), |addr| addr.ip().to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
  headers.get(name).and_then(|v| v.to_str().ok())
}

//! Forwarding header manipulation.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host and X-Real-IP
//! - Append this hop to the `Forwarded` header
//! - Parse the first `Forwarded` element for URL reconstruction

use std::net::{IpAddr, SocketAddr};

use axum::http::header::{CONNECTION, FORWARDED, HOST};
use axum::http::{HeaderMap, HeaderValue};

pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Protocol this server speaks towards clients.
const PROTO: &str = "http";

const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();
    for name in listed.iter().map(String::as_str).chain(HOP_BY_HOP) {
        headers.remove(name);
    }
}

/// First element of a `Forwarded` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardedElement {
    pub for_: Option<String>,
    pub host: Option<String>,
    pub proto: Option<String>,
}

/// Parse the first element of a `Forwarded` header value.
pub fn parse_forwarded(value: &str) -> ForwardedElement {
    let mut element = ForwardedElement::default();
    for pair in split_unquoted(first_element(value), ';') {
        let Some((key, raw)) = pair.split_once('=') else {
            continue;
        };
        let value = raw.trim().trim_matches('"').to_string();
        match key.trim().to_ascii_lowercase().as_str() {
            "for" => element.for_ = Some(value),
            "host" => element.host = Some(value),
            "proto" => element.proto = Some(value.to_ascii_lowercase()),
            _ => {}
        }
    }
    element
}

fn first_element(value: &str) -> &str {
    split_unquoted(value, ',').next().unwrap_or("")
}

/// Split on `sep` outside of quoted strings.
fn split_unquoted(value: &str, sep: char) -> impl Iterator<Item = &str> {
    let mut quoted = false;
    value
        .split(move |c: char| {
            if c == '"' {
                quoted = !quoted;
            }
            c == sep && !quoted
        })
        .map(str::trim)
        .filter(|part| !part.is_empty())
}

/// The `Forwarded` element describing this hop.
pub fn forwarded_element(remote: Option<IpAddr>, host: Option<&str>) -> String {
    let mut parts = Vec::with_capacity(3);
    match remote {
        Some(IpAddr::V6(ip)) => parts.push(format!("for=\"[{}]\"", ip)),
        Some(IpAddr::V4(ip)) => parts.push(format!("for=\"{}\"", ip)),
        None => parts.push("for=unknown".to_string()),
    }
    if let Some(host) = host {
        parts.push(format!("host=\"{}\"", host));
    }
    parts.push(format!("proto={}", PROTO));
    parts.join(";")
}

fn set(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// Rewrite client request headers for the upstream hop.
pub fn prepare_upstream_headers(headers: &mut HeaderMap, remote: Option<SocketAddr>) {
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let ip = remote.map(|addr| addr.ip());

    strip_hop_by_hop(headers);
    headers.remove(HOST);

    if let Some(host) = host.as_deref() {
        set(headers, X_FORWARDED_HOST, host);
    }
    set(headers, X_FORWARDED_PROTO, PROTO);

    if let Some(ip) = ip {
        let ip = ip.to_string();
        set(headers, X_REAL_IP, &ip);
        let chain = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.trim().is_empty() => format!("{}, {}", existing, ip),
            _ => ip,
        };
        set(headers, X_FORWARDED_FOR, &chain);
    }

    let element = forwarded_element(ip, host.as_deref());
    let forwarded = match headers.get(FORWARDED).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{}, {}", existing, element),
        _ => element,
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded) {
        headers.insert(FORWARDED, value);
    }
}

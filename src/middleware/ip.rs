//! Client identity resolution for the rate limiter.
//!
//! The identity of a request is an IP address, taken from one of two sources
//! chosen explicitly by configuration ([`ClientIpSource`]):
//!
//! - **peer** (default): the TCP peer address from Axum's
//!   `ConnectInfo<SocketAddr>` extension
//! - **forwarded**: the first `X-Forwarded-For` entry, or `X-Real-IP`, but
//!   only when the peer is inside `TRUSTED_PROXIES` (every peer is trusted
//!   when the list is empty). Requests from untrusted peers, or without
//!   forwarding headers, fall back to the peer address.
//!
//! # Security Warning: IP Spoofing Risk
//!
//! In `forwarded` mode with no `TRUSTED_PROXIES`, clients can pick their own
//! identity by setting `X-Forwarded-For` and so bypass per-client limits.
//! Only use that combination behind a reverse proxy that overwrites (not
//! appends to) the header:
//!
//! ```nginx
//! proxy_set_header X-Real-IP $remote_addr;
//! proxy_set_header X-Forwarded-For $remote_addr;
//! ```
//!
//! # Failure Semantics
//!
//! Resolution never falls back to a shared placeholder key. A missing peer
//! address or a present but unparseable forwarding value is an
//! [`IdentityError`], which the rate limiter turns into a server error.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ClientIpSource;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Failure to determine who sent a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("peer address is not available on the request")]
    MissingPeerAddress,

    #[error("{header} header does not hold an IP address")]
    InvalidForwardedValue { header: &'static str },
}

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range for trusted proxy validation.
#[derive(Debug, Clone)]
pub struct CidrRange {
    /// Network address
    network: IpAddr,
    /// Prefix length (e.g., 24 for /24)
    prefix_len: u8,
}

impl CidrRange {
    /// Parse a CIDR notation string (e.g., "10.0.0.0/8" or "::1/128").
    ///
    /// A bare address is read as a single-host range. Returns `None` if the
    /// format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();

        let Some((addr, prefix)) = cidr.split_once('/') else {
            let ip: IpAddr = cidr.parse().ok()?;
            return Some(Self {
                network: ip,
                prefix_len: max_prefix(&ip),
            });
        };

        let ip: IpAddr = addr.parse().ok()?;
        let prefix_len: u8 = prefix.parse().ok()?;

        if prefix_len > max_prefix(&ip) {
            return None;
        }

        Some(Self {
            network: ip,
            prefix_len,
        })
    }

    /// Check if an IP address is contained within this CIDR range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            // IPv4 and IPv6 don't match
            _ => false,
        }
    }
}

fn max_prefix(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Networks allowed to set forwarding headers.
///
/// Built from an empty list it trusts every peer. Built from a non-empty list
/// it trusts only the ranges that parsed, so a list of nothing but typos
/// trusts no one.
#[derive(Debug, Clone)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
    trust_all: bool,
}

impl TrustedProxyConfig {
    /// Create a new trusted proxy configuration from CIDR strings.
    ///
    /// Invalid CIDR strings are logged as warnings and skipped.
    /// [`Config::validate`](crate::config::Config::validate) rejects them
    /// before startup.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        if !ranges.is_empty() {
            debug!(
                count = ranges.len(),
                "Trusted proxy validation enabled"
            );
        }

        Self {
            ranges,
            trust_all: cidrs.is_empty(),
        }
    }

    /// Check if trusted proxy validation is enabled (a list was configured).
    pub fn is_enabled(&self) -> bool {
        !self.trust_all
    }

    /// Check if a peer is allowed to set forwarding headers.
    ///
    /// Returns `true` if the IP matches any configured CIDR range,
    /// or if no list was configured (trust all mode).
    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.trust_all || self.ranges.iter().any(|range| range.contains(ip))
    }
}

impl Default for TrustedProxyConfig {
    fn default() -> Self {
        Self::new(&[])
    }
}

// =============================================================================
// Identity Resolution
// =============================================================================

/// Resolves the identity a request is rate limited under.
#[derive(Debug, Clone, Default)]
pub struct ClientIdentityResolver {
    source: ClientIpSource,
    trusted_proxies: TrustedProxyConfig,
}

impl ClientIdentityResolver {
    pub fn new(source: ClientIpSource, trusted_proxies: TrustedProxyConfig) -> Self {
        if source == ClientIpSource::ForwardedHeader && !trusted_proxies.is_enabled() {
            warn!(
                "CLIENT_IP_SOURCE=forwarded without TRUSTED_PROXIES: any client can choose its rate limit identity"
            );
        }

        Self {
            source,
            trusted_proxies,
        }
    }

    /// Resolver that always uses the peer address.
    pub fn peer() -> Self {
        Self::default()
    }

    pub fn source(&self) -> ClientIpSource {
        self.source
    }

    /// Resolve the client identity of `req` as a canonical IP string.
    pub fn resolve<B>(&self, req: &Request<B>) -> Result<String, IdentityError> {
        let peer = peer_ip(req);

        if self.source == ClientIpSource::ForwardedHeader {
            let trusted = match &peer {
                Some(ip) => self.trusted_proxies.is_trusted(ip),
                None => !self.trusted_proxies.is_enabled(),
            };

            if trusted {
                if let Some(ip) = forwarded_ip(req)? {
                    return Ok(ip.to_string());
                }
            } else if req.headers().contains_key(X_FORWARDED_FOR)
                || req.headers().contains_key(X_REAL_IP)
            {
                debug!(
                    peer = ?peer,
                    "Ignoring forwarding headers from untrusted peer"
                );
            }
        }

        peer.map(|ip| ip.to_string())
            .ok_or(IdentityError::MissingPeerAddress)
    }
}

/// The TCP peer address attached by `into_make_service_with_connect_info`.
fn peer_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// First `X-Forwarded-For` entry, else `X-Real-IP`.
///
/// `Ok(None)` when neither header is present; an error when one is present
/// but does not hold an address.
fn forwarded_ip<B>(req: &Request<B>) -> Result<Option<IpAddr>, IdentityError> {
    // Format: "client, proxy1, proxy2" - we want the first (client) IP
    if let Some(value) = req.headers().get(X_FORWARDED_FOR) {
        let first = value
            .to_str()
            .ok()
            .and_then(|v| v.split(',').next())
            .unwrap_or_default();
        return parse_ip(first)
            .map(Some)
            .ok_or(IdentityError::InvalidForwardedValue {
                header: X_FORWARDED_FOR,
            });
    }

    if let Some(value) = req.headers().get(X_REAL_IP) {
        let raw = value.to_str().unwrap_or_default();
        return parse_ip(raw)
            .map(Some)
            .ok_or(IdentityError::InvalidForwardedValue { header: X_REAL_IP });
    }

    Ok(None)
}

/// Parse an address, tolerating a port suffix some proxies append.
fn parse_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

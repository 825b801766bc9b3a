//! IPv4 endpoint value type.
//!
//! An [`Endpoint`] is the immutable host+port pair handed to bind and
//! connect, and reported back for accepted peers. Only dotted-decimal
//! IPv4 literals are accepted; there is no name resolution.

use socket2::SockAddr;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// An IPv4 host and port. Copied freely; never mutated after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    ip: Ipv4Addr,
    port: u16,
}

impl Endpoint {
    /// Build an endpoint from an already-parsed address.
    pub const fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Parse a dotted-decimal IPv4 literal.
    pub fn parse(ip: &str, port: u16) -> Result<Self, InvalidAddress> {
        let ip = ip
            .parse::<Ipv4Addr>()
            .map_err(|_| InvalidAddress(ip.to_string()))?;
        Ok(Self { ip, port })
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    /// The host in dotted-decimal form.
    pub fn text(&self) -> String {
        self.ip.to_string()
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for Endpoint {
    /// The zero-valued endpoint, `0.0.0.0:0`.
    fn default() -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED, 0)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(ep: Endpoint) -> Self {
        SocketAddr::V4(SocketAddrV4::new(ep.ip, ep.port))
    }
}

impl From<Endpoint> for SockAddr {
    fn from(ep: Endpoint) -> Self {
        SockAddr::from(SocketAddr::from(ep))
    }
}

impl TryFrom<&SockAddr> for Endpoint {
    type Error = InvalidAddress;

    fn try_from(addr: &SockAddr) -> Result<Self, Self::Error> {
        match addr.as_socket() {
            Some(SocketAddr::V4(v4)) => Ok(Self::new(*v4.ip(), v4.port())),
            _ => Err(InvalidAddress("non-IPv4 socket address".to_string())),
        }
    }
}

/// The text was not a well-formed IPv4 literal.
#[derive(Debug)]
pub struct InvalidAddress(String);

impl fmt::Display for InvalidAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid IPv4 address '{}'", self.0)
    }
}

impl std::error::Error for InvalidAddress {}

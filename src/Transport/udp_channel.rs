//! Parses and canonicalises channel URIs of the form
//! `udp://<endpoint>[?interface=<addr>][&ttl=<n>]`, where `<endpoint>` is
//! a `host:port` pair. A multicast endpoint is recognised by its address
//! falling in the multicast range; everything else is treated as
//! unicast.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::{DriverError, DriverResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpChannel {
    pub endpoint: SocketAddr,
    pub interface: Option<IpAddr>,
    pub ttl: Option<u32>,
    raw: String,
}

impl UdpChannel {
    pub fn parse(uri: &str) -> DriverResult<Self> {
        let rest = uri.strip_prefix("udp://").ok_or_else(|| DriverError::InvalidChannelUri {
            uri: uri.to_string(),
            reason: "missing udp:// scheme".to_string(),
        })?;

        let (endpoint_part, query) = match rest.split_once('?') {
            Some((e, q)) => (e, Some(q)),
            None => (rest, None),
        };

        let endpoint: SocketAddr = endpoint_part.parse().map_err(|_| DriverError::InvalidChannelUri {
            uri: uri.to_string(),
            reason: format!("`{endpoint_part}` is not a valid host:port"),
        })?;

        let mut interface = None;
        let mut ttl = None;
        if let Some(query) = query {
            for pair in query.split('&') {
                let (key, value) = pair.split_once('=').ok_or_else(|| DriverError::InvalidChannelUri {
                    uri: uri.to_string(),
                    reason: format!("malformed query parameter `{pair}`"),
                })?;
                match key {
                    "interface" => {
                        interface = Some(value.parse::<IpAddr>().map_err(|_| DriverError::InvalidChannelUri {
                            uri: uri.to_string(),
                            reason: format!("`{value}` is not a valid interface address"),
                        })?);
                    }
                    "ttl" => {
                        ttl = Some(value.parse::<u32>().map_err(|_| DriverError::InvalidChannelUri {
                            uri: uri.to_string(),
                            reason: format!("`{value}` is not a valid TTL"),
                        })?);
                    }
                    other => {
                        return Err(DriverError::InvalidChannelUri {
                            uri: uri.to_string(),
                            reason: format!("unknown query parameter `{other}`"),
                        })
                    }
                }
            }
        }

        Ok(Self {
            endpoint,
            interface,
            ttl,
            raw: uri.to_string(),
        })
    }

    pub fn is_multicast(&self) -> bool {
        match self.endpoint.ip() {
            IpAddr::V4(v4) => v4.is_multicast(),
            IpAddr::V6(v6) => v6.is_multicast(),
        }
    }

    pub fn canonical_form(&self) -> &str {
        &self.raw
    }

    pub fn default_ttl(&self) -> u32 {
        self.ttl.unwrap_or(if self.is_multicast() { 1 } else { 0 })
    }
}

/// The well-known multicast range reserved for ephemeral ad-hoc groups
/// (239.0.0.0/8), used when generating a multicast endpoint for a
/// manual-subscribe channel that didn't specify one explicitly.
pub fn is_in_administratively_scoped_range(addr: Ipv4Addr) -> bool {
    addr.octets()[0] == 239
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_unicast_endpoint() {
        let ch = UdpChannel::parse("udp://127.0.0.1:40001").unwrap();
        assert_eq!(ch.endpoint.port(), 40001);
        assert!(!ch.is_multicast());
        assert_eq!(ch.default_ttl(), 0);
    }

    #[test]
    fn parses_multicast_endpoint_with_interface_and_ttl() {
        let ch = UdpChannel::parse("udp://239.1.1.1:40001?interface=10.0.0.5&ttl=4").unwrap();
        assert!(ch.is_multicast());
        assert_eq!(ch.interface, Some("10.0.0.5".parse().unwrap()));
        assert_eq!(ch.ttl, Some(4));
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(UdpChannel::parse("127.0.0.1:40001").is_err());
    }

    #[test]
    fn rejects_unknown_query_parameter() {
        assert!(UdpChannel::parse("udp://127.0.0.1:40001?bogus=1").is_err());
    }
}

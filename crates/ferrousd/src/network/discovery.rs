//! LAN address discovery for the remote control URL

use ferrous_shared::{ControlError, UNKNOWN_ADDRESS};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::{info, warn};

/// Address the endpoint advertises to humans (panel header, `/api/address`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisedAddress {
    /// Resolved LAN IP, or the "Unable to get IP" placeholder
    pub ip: String,
    /// Full control URL; absent when the IP is unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// A QR code is only worth rendering for a real URL
    pub qr_enabled: bool,
}

impl AdvertisedAddress {
    pub fn resolved(ip: IpAddr, port: u16) -> Self {
        Self {
            ip: ip.to_string(),
            url: Some(control_url(ip, port)),
            qr_enabled: true,
        }
    }

    pub fn unknown() -> Self {
        Self {
            ip: UNKNOWN_ADDRESS.to_string(),
            url: None,
            qr_enabled: false,
        }
    }

    pub fn from_lookup(lookup: Result<IpAddr, ControlError>, port: u16) -> Self {
        match lookup {
            Ok(ip) => Self::resolved(ip, port),
            Err(e) => {
                warn!("LAN address unavailable: {}", e);
                Self::unknown()
            }
        }
    }

    /// URL when known, otherwise the placeholder.
    pub fn display(&self) -> &str {
        self.url.as_deref().unwrap_or(&self.ip)
    }
}

/// Primary non-loopback address of this host.
pub fn lan_ip() -> Result<IpAddr, ControlError> {
    local_ip_address::local_ip().map_err(|e| ControlError::NetworkUnavailable(e.to_string()))
}

pub fn control_url(ip: IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(v4) => format!("http://{}:{}", v4, port),
        IpAddr::V6(v6) => format!("http://[{}]:{}", v6, port),
    }
}

/// Resolve and log the address the endpoint should advertise.
pub fn advertise(port: u16) -> AdvertisedAddress {
    let address = AdvertisedAddress::from_lookup(lan_ip(), port);
    if address.qr_enabled {
        info!("Remote control available at {}", address.display());
    }
    address
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_resolved_address() {
        let addr = AdvertisedAddress::resolved(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 40)), 7777);
        assert_eq!(addr.ip, "192.168.1.40");
        assert_eq!(addr.display(), "http://192.168.1.40:7777");
        assert!(addr.qr_enabled);
    }

    #[test]
    fn test_lookup_failure_uses_placeholder() {
        let addr = AdvertisedAddress::from_lookup(
            Err(ControlError::NetworkUnavailable("no interfaces".into())),
            7777,
        );
        assert_eq!(addr, AdvertisedAddress::unknown());
        assert_eq!(addr.display(), "Unable to get IP");
        assert!(!addr.qr_enabled);

        let json = serde_json::to_value(&addr).unwrap();
        assert!(json.get("url").is_none());
    }

    #[test]
    fn test_ipv6_url_is_bracketed() {
        assert_eq!(
            control_url(IpAddr::V6(Ipv6Addr::LOCALHOST), 7777),
            "http://[::1]:7777"
        );
    }
}

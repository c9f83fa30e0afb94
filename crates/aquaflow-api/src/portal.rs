use url::Url;

use crate::error::Error;

/// Default base URL of the vendor cloud portal.
pub const CLOUD_BASE_URL: &str = "https://portal.aquaflow-connect.net";

/// Which portal a client talks to.
///
/// Determines the base URL; the endpoint paths are identical on both.
/// Local devices expose the same web service on their LAN address, which
/// avoids the cloud round-trip for on-site installations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Portal {
    /// The vendor cloud portal (default).
    Cloud,
    /// A device reachable on the local network, e.g. `http://192.168.1.50:8080`.
    Local(Url),
}

/// The request kinds the portal understands.
///
/// Statistics posts to the device-status endpoint -- the payload, not the
/// path, selects the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Login,
    DeviceList,
    DeviceStatus,
    SetStatus,
}

impl Endpoint {
    /// The fixed path for this endpoint, relative to the portal base URL.
    pub fn path(self) -> &'static str {
        match self {
            Self::Login => "/WebService/Connect/Login",
            Self::DeviceList => "/WebService/Connect/GetProjectDeviceCollection",
            Self::DeviceStatus => "/WebService/Connect/GetDeviceStatus",
            Self::SetStatus => "/WebService/Connect/SetDeviceStatus",
        }
    }
}

impl Portal {
    /// Resolve the base URL for this portal.
    pub fn base_url(&self) -> Result<Url, Error> {
        match self {
            Self::Cloud => Url::parse(CLOUD_BASE_URL).map_err(Error::InvalidUrl),
            Self::Local(url) => Ok(url.clone()),
        }
    }

    /// Resolve the full URL for an endpoint on this portal.
    pub fn url_for(&self, endpoint: Endpoint) -> Result<Url, Error> {
        self.base_url()?
            .join(endpoint.path())
            .map_err(Error::InvalidUrl)
    }
}

impl Default for Portal {
    fn default() -> Self {
        Self::Cloud
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cloud_urls_resolve_under_cloud_base() {
        let url = Portal::Cloud.url_for(Endpoint::Login).unwrap();
        assert_eq!(
            url.as_str(),
            "https://portal.aquaflow-connect.net/WebService/Connect/Login"
        );
    }

    #[test]
    fn local_portal_keeps_host_and_port() {
        let base = Url::parse("http://192.168.1.50:8080").unwrap();
        let url = Portal::Local(base).url_for(Endpoint::DeviceStatus).unwrap();
        assert_eq!(
            url.as_str(),
            "http://192.168.1.50:8080/WebService/Connect/GetDeviceStatus"
        );
    }
}

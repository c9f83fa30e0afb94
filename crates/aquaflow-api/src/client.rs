// Portal HTTP client
//
// Wraps the retrying transport with AquaFlow-specific request framing:
// payload building, checksum signing, response parsing, and login-blob
// decryption. One instance per account; cheap to clone.

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use url::Url;

use crate::crypto;
use crate::error::Error;
use crate::payload::{self, CommandValue, StatisticsKind};
use crate::portal::Endpoint;
use crate::transport::{Transport, TransportConfig};
use crate::xml::{self, AttributeMap, LoginData, StatusPayload, WireDevice};

/// Raw client for the AquaFlow Connect web service.
///
/// Methods mirror the portal's operations one-to-one and return parsed
/// wire types; session bookkeeping lives in
/// [`SessionManager`](crate::session::SessionManager), and snapshot/merge
/// policy lives in `aquaflow-core`.
#[derive(Debug, Clone)]
pub struct ConnectClient {
    transport: Transport,
    base_url: Url,
}

impl ConnectClient {
    /// Create a client against the given portal base URL.
    pub fn new(base_url: Url, config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            transport: Transport::new(config)?,
            base_url,
        })
    }

    /// The portal base URL this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, endpoint: Endpoint) -> Result<Url, Error> {
        self.base_url
            .join(endpoint.path())
            .map_err(Error::InvalidUrl)
    }

    /// Authenticate and decrypt the session data.
    ///
    /// The login response wraps an AES blob; parse failures after
    /// decryption are protocol errors here -- the session layer maps them
    /// to authentication failures.
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<LoginData, Error> {
        debug!(username, "logging in");

        let body = payload::build_login(username, password.expose_secret());
        let text = self
            .transport
            .post_xml(self.url(Endpoint::Login)?, body)
            .await?;

        let blob = xml::parse_login(&text)?;
        let cleartext = crypto::decrypt(&blob)?;
        let data = xml::parse_decrypted_login(&cleartext)?;

        debug!(projects = data.projects.len(), "login successful");
        Ok(data)
    }

    /// Fetch the device list for one project.
    pub async fn device_list(
        &self,
        token: &str,
        project_id: &str,
    ) -> Result<Vec<WireDevice>, Error> {
        debug!(project_id, "fetching device list");

        let body = payload::build_device_list(token, project_id);
        let text = self
            .transport
            .post_form(self.url(Endpoint::DeviceList)?, body)
            .await?;
        xml::parse_device_list(&text)
    }

    /// Fetch the status of one device collection (tri-state result).
    pub async fn device_status(
        &self,
        token: &str,
        control_id: &str,
    ) -> Result<StatusPayload, Error> {
        debug!(control_id, "fetching device status");

        let body = payload::build_device_status(token, control_id);
        let text = self
            .transport
            .post_form(self.url(Endpoint::DeviceStatus)?, body)
            .await?;
        xml::parse_device_status(&text)
    }

    /// Write a control command to a device collection.
    ///
    /// The portal echoes the device status on success; the echo is not
    /// authoritative (a reconcile poll follows), so only well-formedness
    /// is checked here.
    pub async fn set_status(
        &self,
        token: &str,
        control_id: &str,
        command: &str,
        value: &CommandValue,
    ) -> Result<(), Error> {
        debug!(control_id, command, %value, "writing device status");

        let body = payload::build_set_status(token, control_id, command, value);
        let text = self
            .transport
            .post_form(self.url(Endpoint::SetStatus)?, body)
            .await?;
        xml::parse_device_status(&text).map(|_| ())
    }

    /// Fetch a consumption statistics series for one device collection.
    ///
    /// Posts to the device-status endpoint; the payload selects the
    /// operation.
    pub async fn statistics(
        &self,
        token: &str,
        control_id: &str,
        kind: StatisticsKind,
    ) -> Result<AttributeMap, Error> {
        debug!(control_id, kind = kind.as_str(), "fetching statistics");

        let body = payload::build_statistics(token, control_id, kind);
        let text = self
            .transport
            .post_form(self.url(Endpoint::DeviceStatus)?, body)
            .await?;
        xml::parse_statistics(&text)
    }
}

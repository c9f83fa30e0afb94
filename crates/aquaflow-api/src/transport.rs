// Shared transport configuration and the retrying POST primitive.
//
// The portal is a single web service; every call is an HTTP POST with
// fixed vendor headers. Connect/timeout failures are retried with
// exponential backoff; a non-success HTTP status is terminal immediately.

use std::time::Duration;

use reqwest::header::{ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::payload::APP_VERSION;

/// `Accept-Language` the vendor app sends; the portal localizes `<msg>`
/// texts based on it.
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.8";

/// Transport configuration for building the HTTP client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-call timeout.
    pub timeout: Duration,
    /// Retry bound for connect/timeout failures.
    pub max_retries: u32,
    /// Accept self-signed certificates (local devices ship them).
    pub danger_accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            danger_accept_invalid_certs: false,
        }
    }
}

impl TransportConfig {
    /// Build the shared `reqwest::Client` with the fixed vendor headers.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE),
        );

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(format!("AquaflowConnect/{APP_VERSION} (Android)"))
            .default_headers(headers);

        if self.danger_accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder.build().map_err(Error::Transport)
    }
}

/// The retrying POST layer shared by all portal calls.
#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
    max_retries: u32,
}

/// What the request body is and how it is labelled.
enum Body {
    /// Raw XML document, `Content-Type: text/xml` (login only).
    Xml(String),
    /// Single `xml` form field, `application/x-www-form-urlencoded`.
    Form(String),
}

impl Transport {
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: config.build_client()?,
            max_retries: config.max_retries,
        })
    }

    /// POST a raw XML body (the login endpoint).
    pub async fn post_xml(&self, url: Url, body: String) -> Result<String, Error> {
        self.post(url, Body::Xml(body)).await
    }

    /// POST a signed document as the single `xml` form field (all other
    /// endpoints).
    pub async fn post_form(&self, url: Url, xml: String) -> Result<String, Error> {
        self.post(url, Body::Form(xml)).await
    }

    async fn post(&self, url: Url, body: Body) -> Result<String, Error> {
        let mut attempt = 0u32;
        loop {
            debug!(%url, attempt, "POST");

            let request = match &body {
                Body::Xml(xml) => self
                    .http
                    .post(url.clone())
                    .header(CONTENT_TYPE, "text/xml")
                    .body(xml.clone()),
                Body::Form(xml) => self.http.post(url.clone()).form(&[("xml", xml.as_str())]),
            };

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        // Non-2xx is terminal: the portal answered, it just
                        // refused. Retrying would not change its mind.
                        return Err(Error::Status {
                            status: status.as_u16(),
                        });
                    }
                    return response.text().await.map_err(Error::Transport);
                }
                Err(e) if is_retryable(&e) && attempt < self.max_retries => {
                    let delay = Duration::from_secs(1u64 << attempt);
                    warn!(%url, attempt, error = %e, delay_secs = delay.as_secs(), "transport error, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(Error::Transport(e)),
            }
        }
    }
}

/// Only network-level failures are worth retrying; everything else is
/// either terminal or the portal's explicit answer.
fn is_retryable(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

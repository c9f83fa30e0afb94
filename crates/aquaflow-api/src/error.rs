use thiserror::Error;

/// Top-level error type for the `aquaflow-api` crate.
///
/// Covers every failure mode across the wire protocol: authentication,
/// transport, XML parsing, response structure, and login-blob decryption.
/// `aquaflow-core` maps these into per-device degradation decisions.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login failed (wrong credentials, unusable login response, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The AES login blob could not be decrypted.
    #[error("Login payload decryption failed: {0}")]
    Decryption(String),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Portal answered with a non-success HTTP status.
    #[error("Portal returned HTTP {status}")]
    Status { status: u16 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Protocol ────────────────────────────────────────────────────
    /// The response body is not well-formed XML.
    #[error("Malformed XML response: {0}")]
    Parse(String),

    /// Well-formed XML with an unexpected structure (missing required
    /// elements or attributes for the response kind).
    #[error("Unexpected response structure: {message}")]
    Protocol { message: String },
}

impl Error {
    /// Returns `true` if this error means the credentials or session are
    /// bad and re-authentication (or operator intervention) is required.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::Decryption(_))
    }

    /// Returns `true` if this is a transient error worth retrying on the
    /// next poll cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Status { .. } | Self::Parse(_) | Self::Protocol { .. } => true,
            _ => false,
        }
    }
}

use thiserror::Error;

/// Error type for the polling layer.
///
/// Wire-level failures pass through as [`CoreError::Api`]; the variants
/// here are decisions this crate makes itself.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A write was addressed to a device the current snapshot does not
    /// know. Surfaced immediately, never retried, snapshot untouched.
    #[error("Device {serial} is not known")]
    DeviceNotFound { serial: String },

    /// The coordinator was torn down mid-cycle; no snapshot was
    /// published for the cancelled cycle.
    #[error("Poll cycle cancelled before completion")]
    Cancelled,

    /// Wire-level failure from the api crate.
    #[error(transparent)]
    Api(#[from] aquaflow_api::Error),
}

impl CoreError {
    /// Returns `true` if the operator must intervene (bad credentials);
    /// polling again will not help.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_auth())
    }
}

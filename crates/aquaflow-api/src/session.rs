// Session lifecycle
//
// The portal issues an opaque session token at login and expects it on
// every signed request. Expiry is tracked client-side (30 minutes from
// issuance); the portal gives no explicit signal. Sessions are never
// persisted across process restarts.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::ConnectClient;
use crate::error::Error;
use crate::xml::WireProject;

/// Client-side session lifetime.
const SESSION_TTL_MINUTES: i64 = 30;

/// An authenticated portal session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque token, required on every signed request.
    pub token: String,
    /// Projects visible to this account, replaced wholesale on each login.
    pub projects: Vec<WireProject>,
    issued_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.issued_at + ChronoDuration::minutes(SESSION_TTL_MINUTES)
    }
}

/// Owns login state and decides when re-authentication is required.
///
/// State machine: no session -> valid -> expired -> no session. The inner
/// mutex is held across the login await, which gives `ensure_valid`
/// single-flight semantics: the first caller performs the login and every
/// concurrent caller queues behind it, then observes the fresh session.
#[derive(Debug)]
pub struct SessionManager {
    client: ConnectClient,
    username: String,
    password: SecretString,
    state: Mutex<Option<Session>>,
}

impl SessionManager {
    pub fn new(client: ConnectClient, username: String, password: SecretString) -> Self {
        Self {
            client,
            username,
            password,
            state: Mutex::new(None),
        }
    }

    /// Return a valid session, logging in if there is none or it expired.
    ///
    /// Structural failures during login (undecryptable blob, unusable
    /// response shape) mean the credentials were rejected and surface as
    /// [`Error::Authentication`]; transport failures pass through so the
    /// caller can retry on the next cycle.
    pub async fn ensure_valid(&self) -> Result<Session, Error> {
        let mut state = self.state.lock().await;

        if let Some(session) = state.as_ref() {
            if !session.is_expired() {
                return Ok(session.clone());
            }
            debug!("session expired, re-authenticating");
            *state = None;
        }

        let data = self
            .client
            .login(&self.username, &self.password)
            .await
            .map_err(login_error)?;

        let session = Session {
            token: data.token,
            projects: data.projects,
            issued_at: Utc::now(),
        };
        info!(projects = session.projects.len(), "portal session established");

        *state = Some(session.clone());
        Ok(session)
    }

    /// Drop the current session so the next call re-authenticates.
    pub async fn invalidate(&self) {
        *self.state.lock().await = None;
    }
}

/// Classify a login failure: anything structural means bad credentials.
fn login_error(e: Error) -> Error {
    match e {
        Error::Decryption(_) | Error::Parse(_) | Error::Protocol { .. } => Error::Authentication {
            message: e.to_string(),
        },
        other => other,
    }
}

// ── Polling coordinator ──
//
// Produces one consistent Snapshot per polling cycle: ensures a valid
// session, fans out device-list fetches per project, fans out status
// fetches per device, merges the tri-state results against the previous
// snapshot, and publishes the new value atomically. Also owns the
// optimistic write path and the background poll loop.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::future::join_all;
use secrecy::SecretString;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use aquaflow_api::transport::TransportConfig;
use aquaflow_api::{
    AttributeMap, CommandValue, ConnectClient, Portal, SessionManager, StatisticsKind,
    StatusPayload,
};

use crate::error::CoreError;
use crate::model::{Device, Project, Snapshot};

const EVENT_CHANNEL_SIZE: usize = 64;

// ── Configuration ────────────────────────────────────────────────

/// Everything the coordinator needs for one portal account.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    pub username: String,
    pub password: SecretString,
    pub portal: Portal,
    pub transport: TransportConfig,
    /// Period of the background poll loop started by [`Coordinator::start`].
    pub poll_interval: Duration,
}

impl AccountConfig {
    /// Cloud-portal account with default transport and a 60 s poll period.
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
            portal: Portal::Cloud,
            transport: TransportConfig::default(),
            poll_interval: Duration::from_secs(60),
        }
    }
}

// ── Observable state ─────────────────────────────────────────────

/// Account state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No cycle has completed yet.
    Starting,
    /// The last cycle published a snapshot.
    Ready,
    /// Login was rejected; polling again will not help until the
    /// operator re-enters credentials.
    AuthRequired,
    /// The portal could not be reached; the next cycle retries.
    Unreachable,
}

/// Per-device availability transitions, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Offline { serial: String },
    Restored { serial: String },
}

// ── Coordinator ──────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<Inner>`. Hosts read [`snapshot()`]
/// (self-consistent, atomically replaced), subscribe to change and
/// device-event channels, and write through [`set_value()`].
///
/// [`snapshot()`]: Coordinator::snapshot
/// [`set_value()`]: Coordinator::set_value
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    client: ConnectClient,
    session: SessionManager,
    snapshot: ArcSwap<Snapshot>,
    /// Version counter, bumped on every published snapshot.
    version: watch::Sender<u64>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<DeviceEvent>,
    cancel: CancellationToken,
    poll_interval: Duration,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    /// Create a coordinator for one account. Does not poll -- call
    /// [`poll_cycle()`](Self::poll_cycle) or [`start()`](Self::start).
    pub fn new(config: AccountConfig) -> Result<Self, CoreError> {
        let base_url = config.portal.base_url()?;
        let client = ConnectClient::new(base_url, &config.transport)?;
        let session = SessionManager::new(client.clone(), config.username, config.password);

        let (version, _) = watch::channel(0u64);
        let (state, _) = watch::channel(ConnectionState::Starting);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                session,
                snapshot: ArcSwap::from_pointee(Snapshot::default()),
                version,
                state,
                events,
                cancel: CancellationToken::new(),
                poll_interval: config.poll_interval,
                tasks: std::sync::Mutex::new(Vec::new()),
            }),
        })
    }

    // ── Read surface ─────────────────────────────────────────────

    /// The current snapshot (cheap `Arc` clone, always self-consistent).
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot.load_full()
    }

    /// Subscribe to snapshot version bumps.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    /// Subscribe to per-device availability transitions.
    pub fn subscribe_events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.events.subscribe()
    }

    /// Observe the account connection state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    // ── Polling ──────────────────────────────────────────────────

    /// Run one polling cycle and publish the resulting snapshot.
    ///
    /// Login failures abort the cycle (nothing can proceed without a
    /// session). Per-project and per-device failures degrade only their
    /// own contribution. A cancelled cycle publishes nothing.
    pub async fn poll_cycle(&self) -> Result<(), CoreError> {
        let inner = &self.inner;

        let session = match inner.session.ensure_valid().await {
            Ok(session) => session,
            Err(e) => {
                let next = if e.is_auth() {
                    ConnectionState::AuthRequired
                } else {
                    ConnectionState::Unreachable
                };
                inner.state.send_modify(|s| *s = next);
                return Err(e.into());
            }
        };
        let token = session.token.clone();
        let projects: Vec<Project> = session.projects.into_iter().map(Project::from).collect();

        // Phase 1: one device-list fetch per project. Failures are
        // captured, not propagated: the failed project's devices are
        // simply absent from this cycle's snapshot.
        let list_futs = projects.iter().map(|project| {
            let client = inner.client.clone();
            let token = token.clone();
            let project_id = project.id.clone();
            async move {
                let result = client.device_list(&token, &project_id).await;
                (project_id, result)
            }
        });
        let listed = tokio::select! {
            () = inner.cancel.cancelled() => return Err(CoreError::Cancelled),
            results = join_all(list_futs) => results,
        };

        let mut wire_devices = Vec::new();
        for (project_id, result) in listed {
            match result {
                Ok(list) => {
                    wire_devices.extend(list.into_iter().map(|d| (project_id.clone(), d)));
                }
                Err(e) => warn!(
                    project = %project_id,
                    error = %e,
                    "device list fetch failed; project absent this cycle"
                ),
            }
        }

        // Phase 2: one status fetch per device across all listed projects.
        let previous = inner.snapshot.load_full();
        let status_futs = wire_devices.into_iter().map(|(project_id, wire)| {
            let client = inner.client.clone();
            let token = token.clone();
            async move {
                let outcome = client.device_status(&token, &wire.control_id).await;
                (project_id, wire, outcome)
            }
        });
        let outcomes = tokio::select! {
            () = inner.cancel.cancelled() => return Err(CoreError::Cancelled),
            results = join_all(status_futs) => results,
        };

        let mut devices = Vec::with_capacity(outcomes.len());
        for (project_id, wire, outcome) in outcomes {
            let mut device = Device::from_wire(wire, &project_id);
            let prior = previous.device(&device.serial);

            match outcome {
                Ok(StatusPayload::Telemetry(map)) => {
                    device.status = map;
                    device.available = true;
                }
                Ok(StatusPayload::Incomplete) => {
                    // No new information. Carry the last known status
                    // forward rather than flickering to empty/unavailable
                    // on a transient truncated response.
                    if let Some(prior) = prior {
                        device.status = prior.status.clone();
                    }
                    device.available = true;
                }
                Err(e) => {
                    warn!(serial = %device.serial, error = %e, "device status fetch failed");
                    device.available = false;
                }
            }

            let was_available = prior.is_none_or(|p| p.available);
            if was_available && !device.available {
                let _ = inner.events.send(DeviceEvent::Offline {
                    serial: device.serial.clone(),
                });
            } else if !was_available && device.available {
                let _ = inner.events.send(DeviceEvent::Restored {
                    serial: device.serial.clone(),
                });
            }

            devices.push(device);
        }

        // A torn-down coordinator must not publish a partial cycle.
        if inner.cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        debug!(
            devices = devices.len(),
            projects = projects.len(),
            "publishing snapshot"
        );
        self.publish(Snapshot { devices, projects });
        inner.state.send_modify(|s| *s = ConnectionState::Ready);
        Ok(())
    }

    // ── Write surface ────────────────────────────────────────────

    /// Write a control command to a device and optimistically reflect it.
    ///
    /// The matching `get…` attribute is updated on a deep copy of the
    /// snapshot immediately; a fire-and-forget reconcile cycle follows to
    /// bring authoritative portal state. A write to an unknown device
    /// fails with [`CoreError::DeviceNotFound`] and mutates nothing.
    pub async fn set_value(
        &self,
        serial: &str,
        command: &str,
        value: CommandValue,
    ) -> Result<(), CoreError> {
        let snapshot = self.inner.snapshot.load_full();
        let device = snapshot
            .device(serial)
            .ok_or_else(|| CoreError::DeviceNotFound {
                serial: serial.to_owned(),
            })?;
        let control_id = device.control_id.clone();

        let session = self.inner.session.ensure_valid().await?;
        self.inner
            .client
            .set_status(&session.token, &control_id, command, &value)
            .await?;

        let mut next = Snapshot::clone(&snapshot);
        if let Some(device) = next.device_mut(serial) {
            device
                .status
                .insert(feedback_attribute(command), value.to_string());
        }
        self.publish(next);
        info!(serial, command, "command written, reconcile scheduled");

        // Reconciliation is decoupled from the caller: its only sink is
        // the log.
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.poll_cycle().await {
                warn!(error = %e, "reconcile cycle after write failed");
            }
        });

        Ok(())
    }

    /// Fetch a consumption statistics series for a known device.
    pub async fn statistics(
        &self,
        serial: &str,
        kind: StatisticsKind,
    ) -> Result<AttributeMap, CoreError> {
        let snapshot = self.inner.snapshot.load_full();
        let device = snapshot
            .device(serial)
            .ok_or_else(|| CoreError::DeviceNotFound {
                serial: serial.to_owned(),
            })?;
        let control_id = device.control_id.clone();

        let session = self.inner.session.ensure_valid().await?;
        let map = self
            .inner
            .client
            .statistics(&session.token, &control_id, kind)
            .await?;
        Ok(map)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the background poll loop.
    pub fn start(&self) {
        let this = self.clone();
        let cancel = self.inner.cancel.clone();
        let period = self.inner.poll_interval;
        let handle = tokio::spawn(poll_task(this, period, cancel));
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            tasks.push(handle);
        }
    }

    /// Tear down: cancel in-flight work and await the poll loop.
    ///
    /// Any cycle in flight is abandoned without publishing.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = match self.inner.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    // ── Private helpers ──────────────────────────────────────────

    fn publish(&self, snapshot: Snapshot) {
        self.inner.snapshot.store(Arc::new(snapshot));
        self.inner.version.send_modify(|v| *v += 1);
    }
}

/// The attribute a successful command is mirrored into: `setX` reports
/// back as `getX`; a bare stem is prefixed.
fn feedback_attribute(command: &str) -> String {
    command
        .strip_prefix("set")
        .map_or_else(|| format!("get{command}"), |stem| format!("get{stem}"))
}

/// Background poll loop. The first tick fires immediately, so hosts get
/// an initial snapshot without waiting a full period.
async fn poll_task(coordinator: Coordinator, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("poll task stopping");
                break;
            }
            _ = interval.tick() => {
                match coordinator.poll_cycle().await {
                    Ok(()) => {}
                    Err(e) if e.is_auth() => {
                        warn!(error = %e, "login rejected; waiting for new credentials");
                    }
                    Err(e) => {
                        warn!(error = %e, "poll cycle failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_attribute_mirrors_set_commands() {
        assert_eq!(feedback_attribute("setAB"), "getAB");
        assert_eq!(feedback_attribute("PRS"), "getPRS");
    }
}

//! Connection lifecycle of the slave.
//!
//! Every connect attempt is tagged with a generation number. `disconnect`,
//! `cancel` and a lost connection bump the generation, so a connect result
//! or read completion belonging to an older generation is discarded instead
//! of resurrecting the session.

use log::{debug, error, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::device_state::{ConnectionInfo, ConnectionStatus, DeviceState};
use crate::config::Config;
use crate::modbus::client::{ClientFactory, RegisterClient};
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionCommand {
    Raise,
    Lower,
}

impl fmt::Display for MotionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionCommand::Raise => write!(f, "raise"),
            MotionCommand::Lower => write!(f, "lower"),
        }
    }
}

/// Fixed per-session transport parameters.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub port: u16,
    pub unit_id: u8,
    pub connect_timeout: Duration,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            port: config.port,
            unit_id: config.unit_id,
            connect_timeout: config.connect_timeout(),
        }
    }
}

/// An established link, valid while its generation is current.
#[derive(Clone)]
pub struct ActiveLink {
    pub generation: u64,
    pub client: Arc<dyn RegisterClient>,
}

struct SessionInner {
    ip_address: String,
    target_address: Option<String>,
    status: ConnectionStatus,
    last_connect_failed: bool,
    generation: u64,
    client: Option<Arc<dyn RegisterClient>>,
    connect_task: Option<JoinHandle<()>>,
}

pub struct Session {
    settings: SessionSettings,
    factory: Arc<dyn ClientFactory>,
    state: Arc<DeviceState>,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub fn new(
        ip_address: impl Into<String>,
        settings: SessionSettings,
        factory: Arc<dyn ClientFactory>,
        state: Arc<DeviceState>,
    ) -> Self {
        let session = Self {
            settings,
            factory,
            state,
            inner: Mutex::new(SessionInner {
                ip_address: ip_address.into(),
                target_address: None,
                status: ConnectionStatus::Disconnected,
                last_connect_failed: false,
                generation: 0,
                client: None,
                connect_task: None,
            }),
        };
        session.publish(&session.lock());
        session
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &SessionInner) {
        self.state.set_connection(ConnectionInfo {
            ip_address: inner.ip_address.clone(),
            target_address: inner.target_address.clone(),
            status: inner.status,
            last_connect_failed: inner.last_connect_failed,
        });
    }

    pub fn status(&self) -> ConnectionStatus {
        self.lock().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn connect_busy(&self) -> bool {
        self.status() == ConnectionStatus::Connecting
    }

    pub fn last_connect_failed(&self) -> bool {
        self.lock().last_connect_failed
    }

    pub fn ip_address(&self) -> String {
        self.lock().ip_address.clone()
    }

    /// Changes the address used by the next connect. A running session keeps
    /// the address it captured.
    pub fn set_address(&self, ip_address: impl Into<String>) {
        let mut inner = self.lock();
        inner.ip_address = ip_address.into();
        info!("Slave address set to {}", inner.ip_address);
        self.publish(&inner);
    }

    /// Dismisses the latched connect-failure notice.
    pub fn acknowledge_connect_failure(&self) {
        let mut inner = self.lock();
        if inner.last_connect_failed {
            inner.last_connect_failed = false;
            self.publish(&inner);
        }
    }

    /// Starts a connect attempt and returns immediately.
    ///
    /// A pending attempt is cancelled first. Must be called from within a
    /// tokio runtime.
    pub fn connect(self: &Arc<Self>) {
        let mut inner = self.lock();

        match inner.status {
            ConnectionStatus::Connected => {
                warn!("Already connected to {}", inner.target_address.as_deref().unwrap_or("?"));
                return;
            }
            ConnectionStatus::Connecting => {
                info!("Restarting pending connect attempt");
                if let Some(stale) = self.teardown(&mut inner) {
                    tokio::spawn(close_client(stale));
                }
            }
            ConnectionStatus::Disconnected => {}
        }

        inner.generation += 1;
        let generation = inner.generation;
        let address = inner.ip_address.clone();
        let client = self.factory.new_client();

        inner.target_address = Some(address.clone());
        inner.client = Some(Arc::clone(&client));
        inner.status = ConnectionStatus::Connecting;
        self.publish(&inner);

        info!("🔌 Connecting to {}:{} (attempt {})", address, self.settings.port, generation);

        let session = Arc::clone(self);
        let port = self.settings.port;
        let unit_id = self.settings.unit_id;
        let connect_timeout = self.settings.connect_timeout;

        inner.connect_task = Some(tokio::spawn(async move {
            let result = match timeout(connect_timeout, client.connect(&address, port, unit_id)).await {
                Ok(result) => result,
                Err(elapsed) => Err(elapsed.into()),
            };
            session.finish_connect(generation, client, result).await;
        }));
    }

    async fn finish_connect(
        &self,
        generation: u64,
        client: Arc<dyn RegisterClient>,
        result: Result<(), ModbusError>,
    ) {
        let stale = {
            let mut inner = self.lock();
            if inner.generation != generation {
                true
            } else {
                inner.connect_task = None;
                let address = inner.target_address.clone().unwrap_or_default();
                match &result {
                    Ok(()) => {
                        inner.status = ConnectionStatus::Connected;
                        inner.last_connect_failed = false;
                        info!("✅ Connected to {}", address);
                    }
                    Err(e) => {
                        inner.status = ConnectionStatus::Disconnected;
                        inner.last_connect_failed = true;
                        inner.client = None;
                        error!("❌ Failed to connect to {}. {} ({})", address, e, e.kind(true));
                    }
                }
                self.publish(&inner);
                false
            }
        };

        if stale {
            debug!("Discarding result of cancelled connect attempt {}", generation);
            if result.is_ok() {
                close_client(client).await;
            }
        }
    }

    /// Ends the session from any state. Also cancels a pending connect.
    pub async fn disconnect(&self) {
        let client = {
            let mut inner = self.lock();
            let was = inner.status;
            let client = self.teardown(&mut inner);
            self.publish(&inner);
            if was != ConnectionStatus::Disconnected {
                info!("Disconnected from {}", inner.target_address.as_deref().unwrap_or("?"));
            }
            client
        };

        if let Some(client) = client {
            close_client(client).await;
        }
    }

    pub async fn cancel(&self) {
        if self.connect_busy() {
            info!("Cancelling connect attempt");
        }
        self.disconnect().await;
    }

    fn teardown(&self, inner: &mut SessionInner) -> Option<Arc<dyn RegisterClient>> {
        inner.generation += 1;
        if let Some(task) = inner.connect_task.take() {
            task.abort();
        }
        inner.status = ConnectionStatus::Disconnected;
        inner.client.take()
    }

    /// The established link, if the session is connected.
    pub fn active_link(&self) -> Option<ActiveLink> {
        let inner = self.lock();
        if inner.status != ConnectionStatus::Connected {
            return None;
        }
        inner.client.as_ref().map(|client| ActiveLink {
            generation: inner.generation,
            client: Arc::clone(client),
        })
    }

    /// Runs `apply` while `generation` is still the connected session.
    /// Returns false without running it otherwise.
    pub(crate) fn run_if_current(&self, generation: u64, apply: impl FnOnce()) -> bool {
        let inner = self.lock();
        if inner.status == ConnectionStatus::Connected && inner.generation == generation {
            apply();
            true
        } else {
            false
        }
    }

    /// Treats a failed read on `generation` as a lost connection. No failure
    /// latch is set. Returns false if that session had already ended.
    pub(crate) async fn connection_lost(&self, generation: u64, error: &ModbusError) -> bool {
        let client = {
            let mut inner = self.lock();
            if inner.status != ConnectionStatus::Connected || inner.generation != generation {
                return false;
            }
            error!(
                "❌ Could not update registers from {}: {} ({})",
                inner.target_address.as_deref().unwrap_or("?"),
                error,
                error.kind(false)
            );
            let client = self.teardown(&mut inner);
            self.publish(&inner);
            client
        };

        if let Some(client) = client {
            close_client(client).await;
        }
        true
    }

    /// Motion requests are accepted but have no register mapping yet.
    pub async fn send_motion(&self, command: MotionCommand) -> Result<(), ModbusError> {
        if !self.is_connected() {
            debug!("Motion command '{}' ignored: not connected", command);
            return Ok(());
        }
        info!("Motion command '{}' requested; no register mapping defined", command);
        Ok(())
    }
}

async fn close_client(client: Arc<dyn RegisterClient>) {
    if let Err(e) = client.disconnect().await {
        warn!("Error while closing register client: {}", e);
    }
}

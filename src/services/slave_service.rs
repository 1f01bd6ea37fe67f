use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::commands::SlaveCommand;
use super::device_state::{ConnectionStatus, DeviceSnapshot, DeviceState};
use super::poller::{Poller, TickOutcome};
use super::session::{MotionCommand, Session, SessionSettings};
use crate::config::Config;
use crate::devices::{SlaveData, SlaveDevice};
use crate::modbus::client::{ClientFactory, TcpClientFactory};
use crate::utils::error::ModbusError;

/// Owns the device state, the session and the poller of one slave.
pub struct SlaveService {
    config: Config,
    state: Arc<DeviceState>,
    session: Arc<Session>,
    poller: Arc<Poller>,
}

impl SlaveService {
    pub fn new(config: Config, factory: Arc<dyn ClientFactory>) -> Result<Self, ModbusError> {
        config.validate()?;

        info!("🚀 Initializing slave service");
        info!(
            "📡 Slave {}:{} (unit {}), polling every {} ms",
            config.ip_address, config.port, config.unit_id, config.update_interval_ms
        );

        let state = Arc::new(DeviceState::new(config.ip_address.clone()));
        let session = Arc::new(Session::new(
            config.ip_address.clone(),
            SessionSettings::from(&config),
            factory,
            Arc::clone(&state),
        ));
        let poller = Arc::new(Poller::new(
            Arc::clone(&session),
            Arc::clone(&state),
            SlaveDevice::new(),
            config.read_timeout(),
        ));

        Ok(Self {
            config,
            state,
            session,
            poller,
        })
    }

    /// Service talking Modbus TCP.
    pub fn with_tcp(config: Config) -> Result<Self, ModbusError> {
        Self::new(config, Arc::new(TcpClientFactory))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> Arc<DeviceState> {
        Arc::clone(&self.state)
    }

    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.state.snapshot()
    }

    /// Applies a consumer command. Returns false once the consumer asked to quit.
    pub async fn handle_command(&self, command: SlaveCommand) -> Result<bool, ModbusError> {
        debug!("Command: {}", command);
        match command {
            SlaveCommand::Connect => self.session.connect(),
            SlaveCommand::Disconnect => self.session.disconnect().await,
            SlaveCommand::Cancel => self.session.cancel().await,
            SlaveCommand::Toggle => match self.session.status() {
                ConnectionStatus::Connected => self.session.disconnect().await,
                ConnectionStatus::Connecting => self.session.cancel().await,
                ConnectionStatus::Disconnected => self.session.connect(),
            },
            SlaveCommand::SetAddress(address) => {
                let address = address.trim().to_string();
                if address.is_empty() {
                    return Err(ModbusError::ConfigError("Slave address is empty".to_string()));
                }
                self.session.set_address(address);
            }
            SlaveCommand::AcknowledgeFailure => self.session.acknowledge_connect_failure(),
            SlaveCommand::Raise => self.session.send_motion(MotionCommand::Raise).await?,
            SlaveCommand::Lower => self.session.send_motion(MotionCommand::Lower).await?,
            SlaveCommand::Status => {}
            SlaveCommand::Quit => {
                self.session.disconnect().await;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Drives the poller from a periodic timer until `shutdown` resolves.
    ///
    /// Each tick's read runs on its own task so a slow slave never delays
    /// the timer; the poller drops ticks that would overlap.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.config.update_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("🔄 Polling loop started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let poller = Arc::clone(&self.poller);
                    tokio::spawn(async move {
                        poller.on_tick().await;
                    });
                }
            }
        }

        self.session.disconnect().await;
        info!("🛑 Polling loop stopped");
    }

    /// Connects, polls once and disconnects.
    pub async fn read_once(&self) -> Result<SlaveData, ModbusError> {
        let mut rx = self.state.subscribe();
        self.session.connect();

        let snapshot = rx
            .wait_for(|s| s.status != ConnectionStatus::Connecting)
            .await
            .map_err(|_| ModbusError::ConnectionError("Device state closed".to_string()))?
            .clone();

        if !snapshot.is_connected() {
            let notice = snapshot
                .connect_failure_notice()
                .unwrap_or_else(|| "Connect attempt cancelled".to_string());
            return Err(ModbusError::ConnectionError(notice));
        }

        let outcome = self.poller.on_tick().await;
        self.session.disconnect().await;

        match outcome {
            TickOutcome::Updated => Ok(self.state.snapshot().data),
            other => {
                warn!("Single read did not complete: {:?}", other);
                Err(ModbusError::CommunicationError(format!(
                    "Could not read registers from {}",
                    self.session.ip_address()
                )))
            }
        }
    }
}

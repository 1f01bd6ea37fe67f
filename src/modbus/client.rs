use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::lookup_host;
use tokio::sync::Mutex;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

use crate::utils::error::ModbusError;

/// Register-oriented request/response link to one slave.
///
/// A client is allocated per connection attempt and is dropped when the
/// session ends. Methods take `&self` so the handle can be shared between
/// the session and an in-flight read.
#[async_trait]
pub trait RegisterClient: Send + Sync {
    async fn connect(&self, address: &str, port: u16, unit_id: u8) -> Result<(), ModbusError>;

    async fn disconnect(&self) -> Result<(), ModbusError>;

    async fn read_holding_registers(
        &self,
        start_addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError>;
}

/// Allocates a fresh, unconnected [`RegisterClient`] for every connect attempt.
pub trait ClientFactory: Send + Sync {
    fn new_client(&self) -> Arc<dyn RegisterClient>;
}

/// Modbus TCP implementation backed by `tokio-modbus`.
///
/// A read takes the context out of the lock for the duration of the request,
/// so `disconnect` never waits behind a stalled read. A context returned by a
/// read after `disconnect` is dropped, which closes the socket.
#[derive(Default)]
pub struct TcpRegisterClient {
    context: Mutex<Option<Context>>,
    closed: AtomicBool,
}

impl TcpRegisterClient {
    pub fn new() -> Self {
        Self::default()
    }

    async fn resolve(address: &str, port: u16) -> Result<SocketAddr, ModbusError> {
        let mut addrs = lookup_host((address, port)).await.map_err(|e| {
            ModbusError::ConnectionError(format!("Cannot resolve {}:{}: {}", address, port, e))
        })?;

        addrs.next().ok_or_else(|| {
            ModbusError::ConnectionError(format!("No address found for {}:{}", address, port))
        })
    }
}

#[async_trait]
impl RegisterClient for TcpRegisterClient {
    async fn connect(&self, address: &str, port: u16, unit_id: u8) -> Result<(), ModbusError> {
        let socket_addr = Self::resolve(address, port).await?;
        debug!("Opening Modbus TCP link to {} (unit {})", socket_addr, unit_id);

        let ctx = tcp::connect_slave(socket_addr, Slave(unit_id))
            .await
            .map_err(|e| {
                error!("❌ Failed to open Modbus TCP link to {}: {}", socket_addr, e);
                ModbusError::ConnectionError(format!("Failed to connect to {}: {}", socket_addr, e))
            })?;

        *self.context.lock().await = Some(ctx);
        self.closed.store(false, Ordering::SeqCst);
        info!("🔌 Modbus TCP link established to {}", socket_addr);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ModbusError> {
        self.closed.store(true, Ordering::SeqCst);
        let ctx = self.context.lock().await.take();
        if let Some(mut ctx) = ctx {
            if let Err(e) = ctx.disconnect().await {
                warn!("Error while closing Modbus TCP link: {}", e);
                return Err(ModbusError::CommunicationError(format!("Disconnect failed: {}", e)));
            }
        }
        Ok(())
    }

    async fn read_holding_registers(
        &self,
        start_addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        let mut ctx = self
            .context
            .lock()
            .await
            .take()
            .ok_or(ModbusError::NotConnected)?;

        debug!("📊 Reading {} holding registers starting at {}", count, start_addr);
        let result = ctx.read_holding_registers(start_addr, count).await;

        if self.closed.load(Ordering::SeqCst) {
            debug!("Link closed during read, dropping context");
        } else {
            *self.context.lock().await = Some(ctx);
        }

        result
            .map_err(|e| ModbusError::CommunicationError(format!("Read failed: {}", e)))?
            .map_err(|code| ModbusError::DeviceException(format!("{:?}", code)))
    }
}

/// Produces [`TcpRegisterClient`] handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpClientFactory;

impl ClientFactory for TcpClientFactory {
    fn new_client(&self) -> Arc<dyn RegisterClient> {
        Arc::new(TcpRegisterClient::new())
    }
}

//! Scripted register client for session and poller tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use super::client::{ClientFactory, RegisterClient};
use super::protocol::BLOCK_REGISTER_COUNT;
use crate::utils::error::ModbusError;

pub(crate) struct MockRegisterClient {
    fail_connect: AtomicBool,
    fail_read: AtomicBool,
    // true while the gate is open
    connect_gate: watch::Sender<bool>,
    read_gate: watch::Sender<bool>,
    registers: Mutex<Vec<u16>>,
    pub connect_calls: AtomicUsize,
    pub read_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
    pub last_target: Mutex<Option<(String, u16, u8)>>,
}

impl MockRegisterClient {
    pub fn new() -> Arc<Self> {
        let (connect_gate, _) = watch::channel(true);
        let (read_gate, _) = watch::channel(true);
        Arc::new(Self {
            fail_connect: AtomicBool::new(false),
            fail_read: AtomicBool::new(false),
            connect_gate,
            read_gate,
            registers: Mutex::new(vec![0; BLOCK_REGISTER_COUNT as usize]),
            connect_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            last_target: Mutex::new(None),
        })
    }

    pub fn set_registers(&self, registers: Vec<u16>) {
        *self.registers.lock().unwrap() = registers;
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_read(&self, fail: bool) {
        self.fail_read.store(fail, Ordering::SeqCst);
    }

    /// Connect attempts wait for [`release_connect`](Self::release_connect).
    pub fn hold_connect(&self, hold: bool) {
        self.connect_gate.send_replace(!hold);
    }

    /// Reads wait for [`release_read`](Self::release_read).
    pub fn hold_read(&self, hold: bool) {
        self.read_gate.send_replace(!hold);
    }

    pub fn release_connect(&self) {
        self.connect_gate.send_replace(true);
    }

    pub fn release_read(&self) {
        self.read_gate.send_replace(true);
    }

    pub fn connects(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegisterClient for MockRegisterClient {
    async fn connect(&self, address: &str, port: u16, unit_id: u8) -> Result<(), ModbusError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_target.lock().unwrap() = Some((address.to_string(), port, unit_id));

        wait_open(&self.connect_gate).await;

        if self.fail_connect.load(Ordering::SeqCst) {
            Err(ModbusError::ConnectionError("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    async fn disconnect(&self) -> Result<(), ModbusError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read_holding_registers(
        &self,
        _start_addr: u16,
        _count: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);

        wait_open(&self.read_gate).await;

        if self.fail_read.load(Ordering::SeqCst) {
            Err(ModbusError::CommunicationError("connection reset".to_string()))
        } else {
            Ok(self.registers.lock().unwrap().clone())
        }
    }
}

async fn wait_open(gate: &watch::Sender<bool>) {
    let mut rx = gate.subscribe();
    let _ = rx.wait_for(|open| *open).await;
}

/// Hands out the same scripted client for every attempt and counts allocations.
pub(crate) struct MockFactory {
    pub client: Arc<MockRegisterClient>,
    created: AtomicUsize,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            client: MockRegisterClient::new(),
            created: AtomicUsize::new(0),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ClientFactory for MockFactory {
    fn new_client(&self) -> Arc<dyn RegisterClient> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.client.clone()
    }
}

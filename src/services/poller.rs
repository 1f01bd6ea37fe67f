use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use super::device_state::DeviceState;
use super::session::Session;
use crate::devices::SlaveDevice;
use crate::utils::error::{FailureKind, ModbusError};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Session not connected; nothing happened.
    Idle,
    /// The previous tick's read is still outstanding.
    Skipped,
    /// A full block was read, decoded and published.
    Updated,
    /// The read completed after its session ended; the result was dropped.
    Discarded,
    /// The read or decode failed and the session was marked disconnected.
    ConnectionLost(FailureKind),
}

/// Issues one block read per tick while the session is connected.
pub struct Poller {
    session: Arc<Session>,
    state: Arc<DeviceState>,
    device: SlaveDevice,
    read_timeout: Duration,
    read_in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Poller {
    pub fn new(
        session: Arc<Session>,
        state: Arc<DeviceState>,
        device: SlaveDevice,
        read_timeout: Duration,
    ) -> Self {
        Self {
            session,
            state,
            device,
            read_timeout,
            read_in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_reading(&self) -> bool {
        self.read_in_flight.load(Ordering::Acquire)
    }

    pub async fn on_tick(&self) -> TickOutcome {
        debug!("tick");

        let link = match self.session.active_link() {
            Some(link) => link,
            None => return TickOutcome::Idle,
        };

        if self.read_in_flight.swap(true, Ordering::AcqRel) {
            debug!("Previous read still outstanding, skipping tick");
            return TickOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.read_in_flight);

        let result = match timeout(self.read_timeout, self.device.read_data(link.client.as_ref())).await {
            Ok(result) => result,
            Err(elapsed) => Err(ModbusError::from(elapsed)),
        };

        match result {
            Ok(data) => {
                let applied = self
                    .session
                    .run_if_current(link.generation, || self.state.apply_readings(data));
                if applied {
                    debug!(
                        "Registers updated: build {}, servo {:.2} V, actuator {:.2} V, diag 0x{:04x}",
                        data.firmware_label(),
                        data.servo_voltage,
                        data.actuator_voltage,
                        data.diag_flags
                    );
                    TickOutcome::Updated
                } else {
                    TickOutcome::Discarded
                }
            }
            Err(e) => {
                let kind = e.kind(false);
                if self.session.connection_lost(link.generation, &e).await {
                    info!("Polling stopped until the next connect");
                    TickOutcome::ConnectionLost(kind)
                } else {
                    TickOutcome::Discarded
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::mock::MockFactory;
    use crate::services::device_state::ConnectionStatus;
    use crate::services::session::SessionSettings;

    struct Fixture {
        factory: Arc<MockFactory>,
        session: Arc<Session>,
        state: Arc<DeviceState>,
        poller: Arc<Poller>,
    }

    fn fixture() -> Fixture {
        let factory = MockFactory::new();
        let state = Arc::new(DeviceState::new("192.168.0.180"));
        let session = Arc::new(Session::new(
            "192.168.0.180",
            SessionSettings {
                port: 502,
                unit_id: 1,
                connect_timeout: Duration::from_secs(5),
            },
            factory.clone(),
            Arc::clone(&state),
        ));
        let poller = Arc::new(Poller::new(
            Arc::clone(&session),
            Arc::clone(&state),
            SlaveDevice::new(),
            Duration::from_secs(2),
        ));
        Fixture {
            factory,
            session,
            state,
            poller,
        }
    }

    async fn connected() -> Fixture {
        let fx = fixture();
        let mut rx = fx.state.subscribe();
        fx.session.connect();
        timeout(Duration::from_secs(10), rx.wait_for(|s| s.is_connected()))
            .await
            .expect("connect did not complete")
            .expect("state channel closed");
        fx
    }

    fn sample_block() -> Vec<u16> {
        let mut regs = vec![0u16; 30];
        regs[0] = 0x0001;
        regs[1] = 0x0002;
        regs[9] = 0x0030;
        regs[10] = 512;
        regs[21] = 400;
        regs
    }

    #[tokio::test]
    async fn test_tick_is_noop_when_disconnected() {
        let fx = fixture();
        let before = fx.state.snapshot();

        assert_eq!(fx.poller.on_tick().await, TickOutcome::Idle);

        assert_eq!(fx.factory.client.reads(), 0);
        assert_eq!(fx.state.snapshot(), before);
    }

    #[tokio::test]
    async fn test_tick_is_noop_while_connecting() {
        let fx = fixture();
        fx.factory.client.hold_connect(true);
        fx.session.connect();

        assert_eq!(fx.poller.on_tick().await, TickOutcome::Idle);
        assert_eq!(fx.factory.client.reads(), 0);
    }

    #[tokio::test]
    async fn test_tick_publishes_decoded_block() {
        let fx = connected().await;
        fx.factory.client.set_registers(sample_block());

        assert_eq!(fx.poller.on_tick().await, TickOutcome::Updated);

        let snapshot = fx.state.snapshot();
        assert_eq!(snapshot.data.firmware_build, 0x0001_0002);
        assert_eq!(snapshot.data.diag_flags, 0x0030);
        assert!((snapshot.data.servo_voltage - 42.94).abs() < 0.01);
        assert_eq!(snapshot.poll_count, 1);
        assert!(snapshot.updated_at.is_some());
        assert_eq!(fx.factory.client.reads(), 1);
    }

    #[tokio::test]
    async fn test_read_failure_disconnects_and_keeps_values() {
        let fx = connected().await;
        fx.factory.client.set_registers(sample_block());
        assert_eq!(fx.poller.on_tick().await, TickOutcome::Updated);
        let before = fx.state.snapshot().data;

        fx.factory.client.fail_read(true);
        assert_eq!(
            fx.poller.on_tick().await,
            TickOutcome::ConnectionLost(FailureKind::Read)
        );

        let snapshot = fx.state.snapshot();
        assert_eq!(snapshot.status, ConnectionStatus::Disconnected);
        assert!(!snapshot.last_connect_failed);
        assert_eq!(snapshot.data, before);
        assert_eq!(fx.factory.client.disconnects(), 1);

        // no reconnect: later ticks stay idle
        fx.factory.client.fail_read(false);
        assert_eq!(fx.poller.on_tick().await, TickOutcome::Idle);
        assert_eq!(fx.factory.client.reads(), 2);
    }

    #[tokio::test]
    async fn test_short_block_treated_as_read_failure() {
        let fx = connected().await;
        fx.factory.client.set_registers(vec![0x0001, 0x0002, 0, 0, 0]);

        assert_eq!(
            fx.poller.on_tick().await,
            TickOutcome::ConnectionLost(FailureKind::Decode)
        );

        let snapshot = fx.state.snapshot();
        assert_eq!(snapshot.status, ConnectionStatus::Disconnected);
        assert_eq!(snapshot.data.firmware_build, 0);
        assert_eq!(snapshot.poll_count, 0);
    }

    #[tokio::test]
    async fn test_overlapping_ticks_are_skipped() {
        let fx = connected().await;
        fx.factory.client.set_registers(sample_block());
        fx.factory.client.hold_read(true);

        let first = {
            let poller = Arc::clone(&fx.poller);
            tokio::spawn(async move { poller.on_tick().await })
        };
        while fx.factory.client.reads() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(fx.poller.is_reading());

        assert_eq!(fx.poller.on_tick().await, TickOutcome::Skipped);

        fx.factory.client.release_read();
        assert_eq!(first.await.unwrap(), TickOutcome::Updated);
        assert_eq!(fx.factory.client.reads(), 1);
        assert!(!fx.poller.is_reading());
    }

    #[tokio::test]
    async fn test_read_finishing_after_disconnect_is_discarded() {
        let fx = connected().await;
        fx.factory.client.set_registers(sample_block());
        fx.factory.client.hold_read(true);

        let first = {
            let poller = Arc::clone(&fx.poller);
            tokio::spawn(async move { poller.on_tick().await })
        };
        while fx.factory.client.reads() == 0 {
            tokio::task::yield_now().await;
        }

        fx.session.disconnect().await;
        fx.factory.client.release_read();

        assert_eq!(first.await.unwrap(), TickOutcome::Discarded);
        assert_eq!(fx.state.snapshot().poll_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_is_a_read_failure() {
        let fx = connected().await;
        fx.factory.client.hold_read(true);

        assert_eq!(
            fx.poller.on_tick().await,
            TickOutcome::ConnectionLost(FailureKind::Read)
        );
        assert_eq!(fx.session.status(), ConnectionStatus::Disconnected);
    }
}

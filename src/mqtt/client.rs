//! Broker connection lifecycle and raw publishing.
//!
//! One `MqttBridge` owns one rumqttc client plus the background thread that
//! drains its network events. Connection state changes only in response to
//! those events (ConnAck, broker disconnect, transport error), never from
//! publish calls. There is no reconnect policy: when the link drops, the
//! loop ends and the caller decides whether to call `connect` again.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use rumqttc::{Client, ConnectReturnCode, Event, LastWill, MqttOptions, Outgoing, Packet, QoS};

use crate::config::BrokerSettings;
use crate::device::DeviceIdentity;
use crate::mqtt::discovery;
use crate::mqtt::topics::{self, PAYLOAD_OFFLINE};

const KEEP_ALIVE_SECS: u64 = 60;
const CHANNEL_CAPACITY: usize = 10;

/// Connection status of the bridge, driven by transport events only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Transport events that drive the state machine.
#[derive(Debug)]
pub(crate) enum LinkEvent {
    ConnAck(ConnectReturnCode),
    /// Connection ended for any reason: broker disconnect, refused
    /// connection, OS-level network error.
    Closed(String),
}

/// State shared between the bridge handle and its event-loop thread.
pub(crate) struct BridgeInner {
    broker: Mutex<BrokerSettings>,
    state: Mutex<ConnectionState>,
    device: Mutex<Option<DeviceIdentity>>,
    client: Mutex<Option<Client>>,
}

impl BridgeInner {
    fn new(broker: BrokerSettings) -> Self {
        Self {
            broker: Mutex::new(broker),
            state: Mutex::new(ConnectionState::Disconnected),
            device: Mutex::new(None),
            client: Mutex::new(None),
        }
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub(crate) fn device(&self) -> Option<DeviceIdentity> {
        lock(&self.device).clone()
    }

    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    /// Apply one transport event and return the resulting state. Successful
    /// ConnAck triggers the announcement sequence: retained online status,
    /// connectivity discovery, static entity discoveries.
    pub(crate) fn handle_link_event(&self, event: LinkEvent) -> ConnectionState {
        match event {
            LinkEvent::ConnAck(ConnectReturnCode::Success) => {
                let broker = lock(&self.broker);
                log::info!(
                    "connected successfully to broker {}:{}",
                    broker.host,
                    broker.port
                );
                drop(broker);
                self.set_state(ConnectionState::Connected);
                discovery::publish_connect_announcements(self);
            }
            LinkEvent::ConnAck(code) => {
                log::error!("connection failed with code {:?}", code);
                self.set_state(ConnectionState::Disconnected);
            }
            LinkEvent::Closed(reason) => {
                log::info!("disconnected from broker: {}", reason);
                self.set_state(ConnectionState::Disconnected);
            }
        }
        self.connection_state()
    }

    /// Enqueue a publish on the live connection. Returns false, without
    /// raising, when not connected or when the transport refuses the message.
    pub(crate) fn publish_raw(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> bool {
        if !self.is_connected() {
            log::warn!("not connected, cannot publish to {}", topic);
            return false;
        }
        // Clone the client out of the lock: publish can block on the
        // transport's bounded queue, and nothing else may wait on the lock
        // for that long.
        let client = lock(&self.client).clone();
        match client {
            Some(client) => match client.publish(topic, qos, retain, payload) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("failed to enqueue message for topic {}: {}", topic, e);
                    false
                }
            },
            None => {
                log::warn!("no active client, cannot publish to {}", topic);
                false
            }
        }
    }
}

/// Single shared MQTT connection to the Home Assistant broker.
///
/// Publish operations may be called from any thread; `connect`/`disconnect`
/// take `&mut self` because lifecycle transitions must be serialized by a
/// single owner.
pub struct MqttBridge {
    inner: Arc<BridgeInner>,
    event_loop: Option<JoinHandle<()>>,
}

impl MqttBridge {
    pub fn new(broker: BrokerSettings) -> Self {
        Self {
            inner: Arc::new(BridgeInner::new(broker)),
            event_loop: None,
        }
    }

    pub(crate) fn inner(&self) -> &BridgeInner {
        &self.inner
    }

    /// Replace the broker settings. Ignored, with a warning, while a
    /// connection is active; reconfiguring requires a fresh connect cycle.
    pub fn configure(&mut self, broker: BrokerSettings) {
        if self.inner.connection_state() != ConnectionState::Disconnected {
            log::warn!("broker settings ignored while connection is active");
            return;
        }
        *lock(&self.inner.broker) = broker;
    }

    /// Set the device identity used for discovery and state topics. Must be
    /// called before any discovery publish.
    pub fn set_device_identity(&self, identity: DeviceIdentity) {
        log::info!(
            "device identity set: {} ({})",
            identity.device_id(),
            identity.address().unwrap_or("N/A")
        );
        *lock(&self.inner.device) = Some(identity);
    }

    /// Thread-safe view of the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection_state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Open the broker connection and start the background network loop.
    ///
    /// No-op when already connected or connecting. Registers the last-will
    /// (retained `offline` on the status topic, QoS 1) before opening the
    /// transport. Connection failures are logged and leave the state at
    /// `Disconnected`; nothing is returned to the caller.
    pub fn connect(&mut self) {
        if self.inner.connection_state() != ConnectionState::Disconnected {
            log::debug!("connect requested but connection already active");
            return;
        }
        self.reap_event_loop();

        let broker = lock(&self.inner.broker).clone();
        log::info!(
            "attempting to connect to broker {}:{}",
            broker.host,
            broker.port
        );

        let mut options = MqttOptions::new(&broker.client_id, &broker.host, broker.port);
        options.set_keep_alive(Duration::from_secs(KEEP_ALIVE_SECS));
        options.set_clean_session(true);
        if let Some(username) = &broker.username {
            options.set_credentials(username, broker.password.as_deref().unwrap_or_default());
        }
        options.set_last_will(LastWill::new(
            topics::status_topic(),
            PAYLOAD_OFFLINE,
            QoS::AtLeastOnce,
            true,
        ));

        let (client, mut connection) = Client::new(options, CHANNEL_CAPACITY);
        *lock(&self.inner.client) = Some(client);
        self.inner.set_state(ConnectionState::Connecting);

        let inner = Arc::clone(&self.inner);
        self.event_loop = Some(std::thread::spawn(move || {
            for event in connection.iter() {
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        let state = inner.handle_link_event(LinkEvent::ConnAck(ack.code));
                        if state == ConnectionState::Disconnected {
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        inner.handle_link_event(LinkEvent::Closed(
                            "disconnect requested by broker".to_string(),
                        ));
                        break;
                    }
                    // Our own disconnect request has been written out; stop
                    // here instead of waiting for the broker to drop the
                    // socket.
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        inner.handle_link_event(LinkEvent::Closed(
                            "disconnect requested locally".to_string(),
                        ));
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        inner.handle_link_event(LinkEvent::Closed(e.to_string()));
                        break;
                    }
                }
            }
        }));
    }

    /// Close the connection and stop the network loop.
    ///
    /// No-op when already disconnected. The retained status is left to the
    /// last-will on ungraceful loss; a graceful disconnect drops the will at
    /// the broker, so the connectivity entity goes stale rather than offline.
    pub fn disconnect(&mut self) {
        if self.inner.connection_state() == ConnectionState::Disconnected {
            log::debug!("disconnect requested but not connected");
            self.reap_event_loop();
            return;
        }

        if let Some(client) = lock(&self.inner.client).as_ref() {
            if let Err(e) = client.disconnect() {
                log::warn!("disconnect request failed: {}", e);
            }
        }
        self.reap_event_loop();
        self.inner.set_state(ConnectionState::Disconnected);
        *lock(&self.inner.client) = None;
        log::info!("gracefully disconnected");
    }

    /// Publish a raw payload. Returns false, without raising, when not
    /// connected or when the transport refuses the message.
    pub fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> bool {
        self.inner.publish_raw(topic, payload.to_vec(), qos, retain)
    }

    fn reap_event_loop(&mut self) {
        if let Some(handle) = self.event_loop.take() {
            if handle.join().is_err() {
                log::error!("mqtt event loop thread panicked");
            }
        }
    }
}

impl Drop for MqttBridge {
    fn drop(&mut self) {
        if self.inner.connection_state() != ConnectionState::Disconnected {
            self.disconnect();
        }
    }
}

// Mutex poisoning only happens if a holder panicked; the guarded values are
// all safe to keep using, so recover instead of propagating the panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inner() -> BridgeInner {
        BridgeInner::new(BrokerSettings::default())
    }

    #[test]
    fn initial_state_is_disconnected() {
        assert_eq!(inner().connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn conn_ack_success_transitions_to_connected() {
        let inner = inner();
        let state = inner.handle_link_event(LinkEvent::ConnAck(ConnectReturnCode::Success));
        assert_eq!(state, ConnectionState::Connected);
        assert!(inner.is_connected());
    }

    #[test]
    fn conn_ack_failure_transitions_to_disconnected() {
        let inner = inner();
        inner.set_state(ConnectionState::Connecting);
        let state =
            inner.handle_link_event(LinkEvent::ConnAck(ConnectReturnCode::BadUserNamePassword));
        assert_eq!(state, ConnectionState::Disconnected);
    }

    #[test]
    fn link_loss_transitions_to_disconnected_from_any_state() {
        let inner = inner();
        inner.set_state(ConnectionState::Connected);
        let state = inner.handle_link_event(LinkEvent::Closed("connection reset".to_string()));
        assert_eq!(state, ConnectionState::Disconnected);

        inner.set_state(ConnectionState::Connecting);
        let state = inner.handle_link_event(LinkEvent::Closed("refused".to_string()));
        assert_eq!(state, ConnectionState::Disconnected);
    }

    #[test]
    fn publish_without_connection_returns_false() {
        let inner = inner();
        assert!(!inner.publish_raw("t", b"x".to_vec(), QoS::AtMostOnce, false));
    }
}

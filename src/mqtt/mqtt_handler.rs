//! Broker session lifecycle with statum state machine
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected
//!      ▲              │               │
//!      │   (refused)  │               │ (connection lost)
//!      └──────────────┴───────────────┘
//! ```
//!
//! The first `Disconnected → Connected` transition is the initial connect;
//! failing it is fatal. Every later `Disconnected` state is left through
//! [`MqttSession::reconnect`], which waits a fixed interval and retries until
//! the broker accepts the session again.

use std::time::Duration;

use chrono::{DateTime, Local};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, Transport,
};
use statum::{machine, state};
use tracing::{debug, error, info, warn};

use super::config::BrokerConfig;
use super::message_router::InboundMessage;
use super::subscriptions::SubscriptionSet;

const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to read TLS file {path}: {reason}")]
    TlsMaterial { path: String, reason: String },

    #[error("TLS client certificate and key must be configured together")]
    IncompleteClientAuth,

    #[error("Initial connection to {broker} failed: {reason}")]
    Initial { broker: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DisconnectError {
    #[error("Connection lost: {0}")]
    Lost(String),

    #[error("Broker refused the session: {0:?}")]
    Refused(ConnectReturnCode),

    #[error("Broker closed the session")]
    BrokerDisconnect,
}

/// Counters kept across reconnects, logged on every state change
#[derive(Clone, Debug, Default)]
pub struct SessionStatus {
    pub connects: u64,
    pub disconnects: u64,
    pub messages_received: u64,
    pub last_error: Option<String>,
    pub last_activity: Option<DateTime<Local>>,
}

#[state]
#[derive(Debug, Clone)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

#[machine]
pub struct MqttSession<S: SessionState> {
    client: AsyncClient,
    eventloop: EventLoop,
    broker: String,
    subscriptions: SubscriptionSet,
    reconnect_interval: Duration,
    status: SessionStatus,
}

impl<S: SessionState> MqttSession<S> {
    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }
}

impl MqttSession<Disconnected> {
    /// Builds the client and its event loop; no network I/O happens yet.
    ///
    /// Returns the session together with a client handle the pipeline uses
    /// to publish commands.
    pub async fn create(
        config: &BrokerConfig,
        subscriptions: SubscriptionSet,
    ) -> Result<(Self, AsyncClient), ConnectionError> {
        debug!("Creating MQTT session with {:?}", config);

        let mut options =
            MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options
            .set_keep_alive(config.keep_alive())
            .set_clean_session(true);
        if config.has_credentials() {
            options.set_credentials(config.user.clone(), config.password.clone());
        }
        options.set_transport(build_transport(config).await?);

        let (client, eventloop) = AsyncClient::new(options, config.request_capacity);

        info!(
            "MQTT session prepared for {} with {} topics",
            config,
            subscriptions.len()
        );
        let session = Self::new(
            client.clone(),
            eventloop,
            config.to_string(),
            subscriptions,
            config.reconnect_interval(),
            SessionStatus::default(),
        );
        Ok((session, client))
    }

    /// Initial connect. Any failure here is a [`ConnectionError`].
    pub async fn connect(self) -> Result<MqttSession<Connected>, ConnectionError> {
        info!("Connecting to MQTT broker {}", self.broker);
        let broker = self.broker.clone();
        let connecting: MqttSession<Connecting> = self.transition();

        connecting
            .await_connack()
            .await
            .map_err(|(_, reason)| {
                error!("Could not connect to MQTT broker {}: {}", broker, reason);
                ConnectionError::Initial {
                    broker,
                    reason: reason.to_string(),
                }
            })
    }

    /// Waits the fixed reconnect interval, then retries until connected.
    pub async fn reconnect(self) -> MqttSession<Connected> {
        let mut session = self;
        loop {
            info!(
                "Reconnecting to {} in {} s",
                session.broker,
                session.reconnect_interval.as_secs()
            );
            tokio::time::sleep(session.reconnect_interval).await;

            let connecting: MqttSession<Connecting> = session.transition();
            match connecting.await_connack().await {
                Ok(connected) => return connected,
                Err((disconnected, reason)) => {
                    warn!("Reconnect attempt failed: {}", reason);
                    session = disconnected;
                }
            }
        }
    }
}

impl MqttSession<Connecting> {
    async fn await_connack(
        mut self,
    ) -> Result<MqttSession<Connected>, (MqttSession<Disconnected>, DisconnectError)> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        let reason = DisconnectError::Refused(ack.code);
                        self.status.last_error = Some(reason.to_string());
                        return Err((self.transition(), reason));
                    }

                    self.status.connects += 1;
                    self.status.last_activity = Some(Local::now());
                    info!(
                        "Connected to MQTT broker {} (connect #{})",
                        self.broker, self.status.connects
                    );

                    let mut connected: MqttSession<Connected> = self.transition();
                    connected.on_connected();
                    return Ok(connected);
                }
                Ok(event) => debug!("Event while connecting: {:?}", event),
                Err(e) => {
                    let reason = match e {
                        rumqttc::ConnectionError::ConnectionRefused(code) => {
                            DisconnectError::Refused(code)
                        }
                        other => DisconnectError::Lost(other.to_string()),
                    };
                    self.status.last_error = Some(reason.to_string());
                    return Err((self.transition(), reason));
                }
            }
        }
    }
}

impl MqttSession<Connected> {
    /// Subscribes to the full topic set. Runs after every ConnAck.
    fn on_connected(&mut self) {
        if let Err(e) = self.subscriptions.apply(&self.client) {
            error!("Failed to subscribe after connect: {}", e);
            self.status.last_error = Some(e.to_string());
        }
    }

    /// Drives the event loop until the next publish arrives.
    ///
    /// Returns `Ok(None)` for protocol traffic that carries no message.
    pub async fn next_message(&mut self) -> Result<Option<InboundMessage>, DisconnectError> {
        match self.eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                self.status.messages_received += 1;
                self.status.last_activity = Some(Local::now());
                debug!(
                    "Received {} bytes on {}",
                    publish.payload.len(),
                    publish.topic
                );
                Ok(Some(InboundMessage::new(
                    publish.topic,
                    publish.payload.to_vec(),
                )))
            }
            Ok(Event::Incoming(Packet::Disconnect)) => Err(DisconnectError::BrokerDisconnect),
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                debug!("Subscription acknowledged: {:?}", ack.return_codes);
                Ok(None)
            }
            Ok(_) => Ok(None),
            Err(e) => Err(DisconnectError::Lost(e.to_string())),
        }
    }

    pub fn disconnected(mut self, reason: &DisconnectError) -> MqttSession<Disconnected> {
        self.status.disconnects += 1;
        self.status.last_error = Some(reason.to_string());
        warn!(
            "Disconnected from MQTT broker {}: {} (disconnect #{}, {} messages so far)",
            self.broker, reason, self.status.disconnects, self.status.messages_received
        );
        self.transition()
    }

    /// Sends DISCONNECT and flushes it through the event loop.
    pub async fn shutdown(mut self) -> MqttSession<Disconnected> {
        info!("Closing MQTT session with {}", self.broker);
        if let Err(e) = self.client.try_disconnect() {
            warn!("Failed to queue DISCONNECT: {}", e);
            return self.transition();
        }

        let flush = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, flush).await.is_err() {
            warn!("DISCONNECT was not flushed within {:?}", SHUTDOWN_FLUSH_TIMEOUT);
        }
        self.transition()
    }
}

async fn build_transport(config: &BrokerConfig) -> Result<Transport, ConnectionError> {
    let tls = &config.tls;
    if !tls.enabled {
        warn!("TLS disabled, connecting to {} in plain text", config);
        return Ok(Transport::tcp());
    }

    let client_auth = match (&tls.client_cert, &tls.client_key) {
        (Some(cert), Some(key)) => Some((read_tls_file(cert).await?, read_tls_file(key).await?)),
        (None, None) => None,
        _ => return Err(ConnectionError::IncompleteClientAuth),
    };

    match &tls.ca_cert {
        Some(ca) => Ok(Transport::tls(read_tls_file(ca).await?, client_auth, None)),
        None if client_auth.is_none() => Ok(Transport::tls_with_default_config()),
        None => Err(ConnectionError::TlsMaterial {
            path: "<ca_cert>".to_string(),
            reason: "a CA certificate is required with a client certificate".to_string(),
        }),
    }
}

async fn read_tls_file(path: &std::path::Path) -> Result<Vec<u8>, ConnectionError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| ConnectionError::TlsMaterial {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::config::{TlsConfig, TopicConfig};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::io::Write;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;
    use tokio::time::{timeout, Instant};

    const CONNECT: u8 = 1;
    const SUBSCRIBE: u8 = 8;
    const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
    const TEST_TIMEOUT: Duration = Duration::from_secs(10);

    fn plain_config(port: u16) -> BrokerConfig {
        BrokerConfig {
            host: "127.0.0.1".to_string(),
            port,
            tls: TlsConfig {
                enabled: false,
                ..TlsConfig::default()
            },
            ..BrokerConfig::default()
        }
    }

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn initial_connect_failure_is_fatal() {
        let config = plain_config(closed_port());
        let subscriptions = SubscriptionSet::from_config(&TopicConfig::default());

        let (session, _client) = MqttSession::create(&config, subscriptions).await.unwrap();
        let result = session.connect().await;

        assert!(matches!(result, Err(ConnectionError::Initial { .. })));
    }

    #[tokio::test]
    async fn session_keeps_the_configured_subscriptions() {
        let subscriptions = SubscriptionSet::from_config(&TopicConfig::default());
        let (session, _client) = MqttSession::create(&plain_config(1883), subscriptions.clone())
            .await
            .unwrap();

        assert_eq!(session.subscriptions(), &subscriptions);
        assert_eq!(session.status().connects, 0);
    }

    #[tokio::test]
    async fn missing_ca_file_is_reported() {
        let mut config = plain_config(8883);
        config.tls = TlsConfig {
            enabled: true,
            ca_cert: Some("/nonexistent/ca.pem".into()),
            ..TlsConfig::default()
        };

        let result =
            MqttSession::create(&config, SubscriptionSet::from_config(&TopicConfig::default()))
                .await;
        assert!(matches!(result, Err(ConnectionError::TlsMaterial { .. })));
    }

    #[tokio::test]
    async fn client_cert_without_key_is_rejected() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        writeln!(cert, "-----BEGIN CERTIFICATE-----").unwrap();

        let mut config = plain_config(8883);
        config.tls = TlsConfig {
            enabled: true,
            ca_cert: None,
            client_cert: Some(cert.path().to_path_buf()),
            client_key: None,
        };

        let result =
            MqttSession::create(&config, SubscriptionSet::from_config(&TopicConfig::default()))
                .await;
        assert!(matches!(result, Err(ConnectionError::IncompleteClientAuth)));
    }

    async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
        let header = stream.read_u8().await?;
        let mut remaining = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await?;
            remaining |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0; remaining];
        stream.read_exact(&mut body).await?;
        Ok((header >> 4, body))
    }

    // SUBSCRIBE body: packet id, then (length, filter, qos) entries
    fn subscribed_filters(body: &[u8]) -> Vec<String> {
        let mut filters = Vec::new();
        let mut pos = 2;
        while pos + 2 <= body.len() {
            let len = u16::from_be_bytes([body[pos], body[pos + 1]]) as usize;
            pos += 2;
            filters.push(String::from_utf8(body[pos..pos + len].to_vec()).unwrap());
            pos += len + 1;
        }
        filters
    }

    /// Broker that accepts two sessions and reports the topics each one
    /// subscribed to. The first socket is closed once `expected` topics arrived.
    async fn flaky_broker(
        listener: TcpListener,
        expected: usize,
        sets: mpsc::UnboundedSender<BTreeSet<String>>,
    ) {
        for session in 0..2 {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut topics = BTreeSet::new();
            while topics.len() < expected {
                let (kind, body) = read_packet(&mut stream).await.unwrap();
                match kind {
                    CONNECT => stream.write_all(&CONNACK_ACCEPTED).await.unwrap(),
                    SUBSCRIBE => {
                        let filters = subscribed_filters(&body);
                        let mut ack = vec![0x90, 2 + filters.len() as u8, body[0], body[1]];
                        ack.extend(std::iter::repeat(0x00).take(filters.len()));
                        stream.write_all(&ack).await.unwrap();
                        topics.extend(filters);
                    }
                    _ => {}
                }
            }
            sets.send(topics).unwrap();

            if session == 1 {
                let _open = stream;
                std::future::pending::<()>().await;
            }
        }
    }

    #[tokio::test]
    async fn reconnect_waits_the_interval_and_restores_every_subscription() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = plain_config(listener.local_addr().unwrap().port());
        config.reconnect_interval_secs = 1;

        let subscriptions = SubscriptionSet::from_config(&TopicConfig::default());
        let expected: BTreeSet<String> = subscriptions.topics().map(str::to_string).collect();
        let (sets_tx, mut sets) = mpsc::unbounded_channel();
        tokio::spawn(flaky_broker(listener, expected.len(), sets_tx));

        let (session, _client) = MqttSession::create(&config, subscriptions).await.unwrap();
        let mut session = session.connect().await.unwrap();

        let reason = timeout(TEST_TIMEOUT, async {
            loop {
                if let Err(reason) = session.next_message().await {
                    break reason;
                }
            }
        })
        .await
        .unwrap();
        let first = sets.recv().await.unwrap();

        let disconnected = session.disconnected(&reason);
        assert_eq!(disconnected.status().disconnects, 1);

        let started = Instant::now();
        let mut session = timeout(TEST_TIMEOUT, disconnected.reconnect()).await.unwrap();
        assert!(started.elapsed() >= config.reconnect_interval());

        let second = timeout(TEST_TIMEOUT, async {
            loop {
                tokio::select! {
                    set = sets.recv() => break set.unwrap(),
                    _ = session.next_message() => {}
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(first, expected);
        assert_eq!(second, first);
        assert_eq!(session.status().connects, 2);
    }
}

//! Broker side of the gateway: the transport trait, the MQTT client and an
//! in-memory broker used by tests and the simulator.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, trace, warn};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, StateError,
};
use thiserror::Error;

use crate::config::BrokerConfig;

// mosquitto error codes, kept so supervisors see the same exit statuses
pub const CODE_PROTOCOL: i32 = 2;
pub const CODE_CONN_REFUSED: i32 = 5;
pub const CODE_CONN_LOST: i32 = 7;
pub const CODE_ERRNO: i32 = 14;

/// Upper bound on events handled by one `service_events` call.
const MAX_EVENTS_PER_SERVICE: usize = 32;

const REQUEST_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker transport init failure: {0}")]
    TransportInit(String),

    #[error("broker failure (code {code}): {reason}")]
    Fatal { code: i32, reason: String },

    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
}

impl From<ConnectionError> for BrokerError {
    fn from(err: ConnectionError) -> Self {
        let code = match &err {
            ConnectionError::ConnectionRefused(_) => CODE_CONN_REFUSED,
            // rumqttc reports a peer close as a state error wrapping the io error
            ConnectionError::MqttState(StateError::Io(_)) => CODE_CONN_LOST,
            ConnectionError::MqttState(_) => CODE_PROTOCOL,
            ConnectionError::Io(_) => CODE_ERRNO,
            _ => CODE_CONN_LOST,
        };
        BrokerError::Fatal { code, reason: err.to_string() }
    }
}

/// Receives inbound messages as `(topic, payload)`.
pub type MessageHandler<'h> = dyn for<'t, 'p> FnMut(&'t str, &'p [u8]) + 'h;

/// Broker operations the gateway loop consumes.
#[async_trait(?Send)]
pub trait BrokerTransport {
    /// Waits at most `timeout` for broker activity and passes every inbound
    /// message to `handler` as `(topic, payload)`.
    async fn service_events(
        &mut self,
        timeout: Duration,
        handler: &mut MessageHandler<'_>,
    ) -> Result<(), BrokerError>;

    /// QoS 0, not retained. Does not wait for the broker.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;

    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError>;
}

pub struct MqttBroker {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttBroker {
    /// Connects and waits for the broker's CONNACK.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let mut options =
            MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keepalive_secs));
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        info!("Connecting to {}:{} as {}", config.host, config.port, config.client_id);
        match tokio::time::timeout(config.connect_timeout, wait_connack(&mut eventloop)).await {
            Ok(Ok(())) => {
                info!("Connect succeed");
                Ok(Self { client, eventloop })
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(BrokerError::TransportInit(format!(
                "no CONNACK from {}:{} within {:?}",
                config.host, config.port, config.connect_timeout
            ))),
        }
    }

    fn dispatch(&self, event: Event, handler: &mut MessageHandler<'_>) {
        match event {
            Event::Incoming(Packet::Publish(publish)) => {
                handler(publish.topic.as_str(), &publish.payload[..])
            }
            Event::Incoming(Packet::SubAck(_)) => info!("-- subscribed successfully"),
            Event::Outgoing(Outgoing::Publish(_)) => trace!("-- published successfully"),
            other => trace!("broker event: {:?}", other),
        }
    }
}

async fn wait_connack(eventloop: &mut EventLoop) -> Result<(), BrokerError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(BrokerError::TransportInit(format!(
                    "connection refused: {:?}",
                    ack.code
                )));
            }
            Ok(_) => continue,
            Err(err) => return Err(BrokerError::TransportInit(err.to_string())),
        }
    }
}

#[async_trait(?Send)]
impl BrokerTransport for MqttBroker {
    async fn service_events(
        &mut self,
        timeout: Duration,
        handler: &mut MessageHandler<'_>,
    ) -> Result<(), BrokerError> {
        let mut wait = timeout;
        for _ in 0..MAX_EVENTS_PER_SERVICE {
            let event = match tokio::time::timeout(wait, self.eventloop.poll()).await {
                Err(_) => break,
                Ok(polled) => polled?,
            };
            self.dispatch(event, handler);
            // only the first poll may block; afterwards drain what is ready
            wait = Duration::ZERO;
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| BrokerError::Publish { topic: topic.to_string(), reason: e.to_string() })
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| BrokerError::TransportInit(format!("subscribe {}: {}", topic, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Bytes,
}

impl Published {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("<binary>")
    }
}

/// Broker that lives in memory: inbound messages are queued by the caller,
/// publishes are recorded.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    subscriptions: Vec<String>,
    inbound: VecDeque<(String, Bytes)>,
    published: Vec<Published>,
    fatal: Option<(i32, String)>,
    fail_publishes: bool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a message as if another client had published it.
    pub fn inject(&mut self, topic: &str, payload: impl Into<Bytes>) {
        self.inbound.push_back((topic.to_string(), payload.into()));
    }

    /// The next `service_events` call fails with `code`.
    pub fn fail_with(&mut self, code: i32, reason: &str) {
        self.fatal = Some((code, reason.to_string()));
    }

    pub fn set_fail_publishes(&mut self, fail: bool) {
        self.fail_publishes = fail;
    }

    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    pub fn published(&self) -> &[Published] {
        &self.published
    }

    pub fn take_published(&mut self) -> Vec<Published> {
        std::mem::take(&mut self.published)
    }

    fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.iter().any(|filter| topic_matches(filter, topic))
    }
}

#[async_trait(?Send)]
impl BrokerTransport for MemoryBroker {
    async fn service_events(
        &mut self,
        _timeout: Duration,
        handler: &mut MessageHandler<'_>,
    ) -> Result<(), BrokerError> {
        if let Some((code, reason)) = self.fatal.take() {
            return Err(BrokerError::Fatal { code, reason });
        }
        while let Some((topic, payload)) = self.inbound.pop_front() {
            if self.is_subscribed(&topic) {
                handler(topic.as_str(), &payload[..]);
            } else {
                debug!("No subscription for {}, dropping", topic);
            }
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        if self.fail_publishes {
            return Err(BrokerError::Publish {
                topic: topic.to_string(),
                reason: "simulated failure".into(),
            });
        }
        self.published.push(Published {
            topic: topic.to_string(),
            payload: Bytes::copy_from_slice(payload),
        });
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        if topic.is_empty() {
            warn!("Refusing empty subscription");
            return Err(BrokerError::TransportInit("empty topic filter".into()));
        }
        self.subscriptions.push(topic.to_string());
        Ok(())
    }
}

/// MQTT topic filter matching with `+` and `#` wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut levels = topic.split('/');
    for part in filter.split('/') {
        match part {
            "#" => return true,
            "+" => {
                if levels.next().is_none() {
                    return false;
                }
            }
            literal => {
                if levels.next() != Some(literal) {
                    return false;
                }
            }
        }
    }
    levels.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_matches() {
        assert!(topic_matches("0731", "0731"));
        assert!(!topic_matches("0731", "0732"));
        assert!(topic_matches("+", "0731"));
        assert!(!topic_matches("+", "a/b"));
        assert!(topic_matches("#", "a/b"));
        assert!(topic_matches("a/+/c", "a/b/c"));
        assert!(!topic_matches("a/+", "a"));
    }

    #[test]
    fn test_connection_error_codes() {
        use std::io::{Error, ErrorKind};

        let refused =
            BrokerError::from(ConnectionError::ConnectionRefused(ConnectReturnCode::NotAuthorized));
        assert!(matches!(refused, BrokerError::Fatal { code: CODE_CONN_REFUSED, .. }));

        let io = BrokerError::from(ConnectionError::Io(Error::from(ErrorKind::ConnectionReset)));
        assert!(matches!(io, BrokerError::Fatal { code: CODE_ERRNO, .. }));

        let closed = BrokerError::from(ConnectionError::MqttState(StateError::Io(Error::new(
            ErrorKind::ConnectionAborted,
            "connection closed by peer",
        ))));
        assert!(matches!(closed, BrokerError::Fatal { code: CODE_CONN_LOST, .. }));

        let protocol = BrokerError::from(ConnectionError::MqttState(StateError::AwaitPingResp));
        assert!(matches!(protocol, BrokerError::Fatal { code: CODE_PROTOCOL, .. }));

        let timeout = BrokerError::from(ConnectionError::NetworkTimeout);
        assert!(matches!(timeout, BrokerError::Fatal { code: CODE_CONN_LOST, .. }));
    }

    #[tokio::test]
    async fn test_mqtt_broker_against_local_server() {
        use std::time::Instant;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;
        use tokio::sync::oneshot;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (publish_tx, publish_rx) = oneshot::channel::<()>();
        let (close_tx, close_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(buf[0] >> 4, 1, "expected CONNECT, got {:02x?}", &buf[..n]);
            stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

            publish_rx.await.unwrap();
            // QoS 0 PUBLISH, topic "073", payload "1"
            stream.write_all(&[0x30, 0x06, 0x00, 0x03, b'0', b'7', b'3', b'1']).await.unwrap();

            close_rx.await.unwrap();
            drop(stream);
        });

        let config = BrokerConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let mut broker = MqttBroker::connect(&config).await.unwrap();
        let mut seen: Vec<(String, Vec<u8>)> = Vec::new();

        // idle broker: returns once the timeout expires
        let started = Instant::now();
        broker
            .service_events(Duration::from_millis(50), &mut |topic: &str, payload: &[u8]| {
                seen.push((topic.to_string(), payload.to_vec()))
            })
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(seen.is_empty());

        publish_tx.send(()).unwrap();
        broker
            .service_events(Duration::from_secs(2), &mut |topic: &str, payload: &[u8]| {
                seen.push((topic.to_string(), payload.to_vec()))
            })
            .await
            .unwrap();
        assert_eq!(seen, vec![("073".to_string(), b"1".to_vec())]);

        close_tx.send(()).unwrap();
        let result = broker
            .service_events(Duration::from_secs(2), &mut |_: &str, _: &[u8]| {})
            .await;
        assert!(
            matches!(result, Err(BrokerError::Fatal { code: CODE_CONN_LOST, .. })),
            "unexpected result: {:?}",
            result
        );

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_broker_delivers_subscribed_only() {
        let mut broker = MemoryBroker::new();
        broker.subscribe("0731").unwrap();
        broker.inject("0731", &b"1"[..]);
        broker.inject("9999", &b"2"[..]);

        let mut seen = Vec::new();
        broker
            .service_events(Duration::from_millis(10), &mut |topic: &str, payload: &[u8]| {
                seen.push((topic.to_string(), payload.to_vec()))
            })
            .await
            .unwrap();
        assert_eq!(seen, vec![("0731".to_string(), b"1".to_vec())]);
    }

    #[tokio::test]
    async fn test_memory_broker_fatal_error() {
        let mut broker = MemoryBroker::new();
        broker.fail_with(CODE_CONN_LOST, "gone");
        let result = broker.service_events(Duration::ZERO, &mut |_: &str, _: &[u8]| {}).await;
        assert!(matches!(result, Err(BrokerError::Fatal { code: CODE_CONN_LOST, .. })));

        // reported once
        assert!(broker.service_events(Duration::ZERO, &mut |_: &str, _: &[u8]| {}).await.is_ok());
    }

    #[test]
    fn test_memory_broker_records_publishes() {
        let mut broker = MemoryBroker::new();
        broker.publish("0521", b"0123").unwrap();
        assert_eq!(broker.published()[0].payload_str(), "0123");

        broker.set_fail_publishes(true);
        assert!(matches!(broker.publish("0522", b"x"), Err(BrokerError::Publish { .. })));
        assert_eq!(broker.take_published().len(), 1);
    }
}

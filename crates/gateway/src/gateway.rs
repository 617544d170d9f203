//! The gateway loop: services the broker, polls the radio and translates
//! between the two.

use std::time::Duration;

use log::{debug, error, info, warn};
use pigateway_core::{decode_frame, translate_command, translate_reception};
use pigateway_radio::{RadioError, RadioTransport, Reception};
use thiserror::Error;

use crate::broker::{BrokerError, BrokerTransport, CODE_CONN_LOST};
use crate::config::GatewayConfig;

/// Every this many ack requests (starting with the first) also gets a probe.
const PROBE_EVERY: u64 = 3;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transport init failure: {0}")]
    TransportInit(String),

    #[error("broker loop failure (code {code}): {reason}")]
    BrokerLoop { code: i32, reason: String },
}

impl GatewayError {
    /// Process exit status for this failure, never 0.
    pub fn exit_code(&self) -> u8 {
        match self {
            GatewayError::TransportInit(_) => 1,
            GatewayError::BrokerLoop { code, .. } => (*code).clamp(1, 255) as u8,
        }
    }
}

impl From<BrokerError> for GatewayError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::TransportInit(reason) => GatewayError::TransportInit(reason),
            BrokerError::Fatal { code, reason } => GatewayError::BrokerLoop { code, reason },
            other => GatewayError::BrokerLoop { code: CODE_CONN_LOST, reason: other.to_string() },
        }
    }
}

impl From<RadioError> for GatewayError {
    fn from(err: RadioError) -> Self {
        GatewayError::TransportInit(format!("radio: {}", err))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GatewayStats {
    pub frames_received: u64,
    pub frames_malformed: u64,
    pub readings_rejected: u64,
    pub publishes: u64,
    pub publish_failures: u64,
    pub acks_sent: u64,
    pub probes_sent: u64,
    pub radio_failures: u64,
    pub commands_sent: u64,
    pub commands_rejected: u64,
}

/// Owns both transports and the ack counter; everything runs on the caller's
/// task, one iteration at a time.
pub struct Gateway<R, B> {
    radio: R,
    broker: B,
    promiscuous: bool,
    service_timeout: Duration,
    stats_interval: u64,
    ack_count: u64,
    stats: GatewayStats,
}

impl<R: RadioTransport, B: BrokerTransport> Gateway<R, B> {
    pub fn new(radio: R, broker: B, config: &GatewayConfig) -> Self {
        Self {
            radio,
            broker,
            promiscuous: config.radio.promiscuous,
            service_timeout: config.service_timeout,
            stats_interval: config.stats_interval,
            ack_count: 0,
            stats: GatewayStats::default(),
        }
    }

    pub fn subscribe_commands(&mut self, topics: &[String]) -> Result<(), GatewayError> {
        if topics.is_empty() {
            warn!("No command topics configured, broker to radio direction is idle");
        }
        for topic in topics {
            self.broker.subscribe(topic)?;
            info!("Subscribed to {}", topic);
        }
        Ok(())
    }

    /// Runs until the broker reports a fatal error.
    pub async fn run(&mut self) -> Result<(), GatewayError> {
        info!("setup complete");
        loop {
            self.step().await?;
        }
    }

    /// One loop iteration: service broker events, then poll the radio once.
    pub async fn step(&mut self) -> Result<(), GatewayError> {
        let Self { radio, broker, stats, service_timeout, .. } = self;
        let mut on_message =
            |topic: &str, payload: &[u8]| handle_command(radio, stats, topic, payload);
        if let Err(err) = broker.service_events(*service_timeout, &mut on_message).await {
            error!("Broker loop failed: {}", err);
            return Err(err.into());
        }

        match self.radio.try_receive() {
            Ok(Some(reception)) => self.handle_reception(reception),
            Ok(None) => {}
            Err(err) => {
                self.stats.radio_failures += 1;
                warn!("Radio receive failed: {}", err);
            }
        }
        Ok(())
    }

    fn handle_reception(&mut self, reception: Reception) {
        self.stats.frames_received += 1;
        if self.promiscuous {
            debug!(
                "[{}] to [{}] {}",
                reception.sender_id,
                reception.target_id,
                hex::encode(reception.frame_bytes())
            );
        } else {
            debug!("[{}] {}", reception.sender_id, hex::encode(reception.frame_bytes()));
        }

        // nodes only wait a few ms for the ack, so it goes out before publishing
        if reception.ack_requested {
            self.acknowledge(reception.sender_id);
        }

        let frame = match decode_frame(reception.frame_bytes()) {
            Ok(frame) => frame,
            Err(err) => {
                self.stats.frames_malformed += 1;
                warn!("[{}] {}", reception.sender_id, err);
                return;
            }
        };

        info!(
            "Received Node ID = {} Device ID = {} Time = {}  RSSI = {} var2 = {:.6} var3 = {:.6}",
            frame.node_id,
            frame.sensor_id,
            frame.reading1,
            reception.rssi,
            frame.reading2,
            frame.reading3
        );

        let publishes = match translate_reception(frame, reception.rssi) {
            Ok(publishes) => publishes,
            Err(err) => {
                self.stats.readings_rejected += 1;
                warn!("Reading from node {} not published: {}", reception.sender_id, err);
                return;
            }
        };

        for publish in &publishes {
            match self.broker.publish(&publish.topic, publish.payload.as_bytes()) {
                Ok(()) => self.stats.publishes += 1,
                Err(err) => {
                    self.stats.publish_failures += 1;
                    warn!("{}", err);
                }
            }
        }

        if self.stats_interval > 0 && self.stats.frames_received % self.stats_interval == 0 {
            info!("Gateway stats: {:?}", self.stats);
        }
    }

    fn acknowledge(&mut self, node: u8) {
        match self.radio.send_ack(node) {
            Ok(()) => self.stats.acks_sent += 1,
            Err(err) => {
                self.stats.radio_failures += 1;
                warn!("Ack to node {} failed: {}", node, err);
            }
        }

        // 1st, 4th, 7th, ... ack request also exercises the node's receive path
        let probe = self.ack_count % PROBE_EVERY == 0;
        self.ack_count += 1;
        if probe {
            debug!("Pinging node {} - ACK...", node);
            match self.radio.send_probe(node) {
                Ok(()) => self.stats.probes_sent += 1,
                Err(err) => {
                    self.stats.radio_failures += 1;
                    warn!("Probe to node {} failed: {}", node, err);
                }
            }
        }
    }

    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut B {
        &mut self.broker
    }
}

fn handle_command<R: RadioTransport>(
    radio: &mut R,
    stats: &mut GatewayStats,
    topic: &str,
    payload: &[u8],
) {
    info!(
        "-- got message @ {}: ({}) '{}'",
        topic,
        payload.len(),
        String::from_utf8_lossy(payload)
    );

    let out = match translate_command(topic, payload) {
        Ok(out) => out,
        Err(err) => {
            stats.commands_rejected += 1;
            warn!("Discarding message on {:?}: {}", topic, err);
            return;
        }
    };

    match radio.send(out.node_id, &out.frame) {
        Ok(()) => {
            stats.commands_sent += 1;
            info!("-- sent message to node {}", out.node_id);
        }
        Err(err) => {
            stats.radio_failures += 1;
            warn!("Send to node {} failed: {}", out.node_id, err);
        }
    }
}

//! radio link layer for piGateway

use std::net::SocketAddr;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod simulated;
pub mod udp;

pub use simulated::{SimulatedRadio, Transmission};
pub use udp::UdpRadio;

pub type NodeAddress = u8;

/// Largest payload an RFM69 packet can carry.
pub const RADIO_MTU: usize = 61;

/// Node address that every radio accepts.
pub const BROADCAST_ADDRESS: NodeAddress = 255;

/// Data carried by a reverse probe.
pub const PROBE_PAYLOAD: &[u8] = b"ACK TEST";

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("Packet too large for radio MTU: {0} bytes")]
    PacketTooLarge(usize),

    #[error("Radio transmission failed")]
    TransmissionFailed,

    #[error("Radio I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One completed reception, handed over by [`RadioTransport::try_receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reception {
    pub sender_id: NodeAddress,
    pub target_id: NodeAddress,
    pub rssi: i16,
    pub ack_requested: bool,
    pub data: Vec<u8>,
}

impl Reception {
    pub fn frame_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Radio operations the gateway loop consumes. Implementations own any
/// ack-wait or retry behaviour; none of it is visible here.
pub trait RadioTransport {
    /// Returns the next buffered reception without blocking.
    fn try_receive(&mut self) -> Result<Option<Reception>, RadioError>;

    fn send_ack(&mut self, node: NodeAddress) -> Result<(), RadioError>;

    /// Asks `node` for an ack as a liveness check.
    fn send_probe(&mut self, node: NodeAddress) -> Result<(), RadioError>;

    fn send(&mut self, node: NodeAddress, data: &[u8]) -> Result<(), RadioError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub node_id: NodeAddress,
    pub network_id: u8,
    pub frequency_mhz: u16,
    pub promiscuous: bool,
    /// How long a node waits for our ack before retrying.
    #[serde(with = "millis")]
    pub ack_time: Duration,
    /// Local socket the radio-modem bridge sends datagrams to.
    pub bind: SocketAddr,
    /// Where the radio-modem bridge accepts outbound datagrams.
    pub modem: SocketAddr,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            network_id: 101,
            frequency_mhz: 915,
            promiscuous: false,
            ack_time: Duration::from_millis(30),
            bind: SocketAddr::from(([0, 0, 0, 0], 7101)),
            modem: SocketAddr::from(([127, 0, 0, 1], 7100)),
        }
    }
}

pub mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms: u64 = Deserialize::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

pub(crate) fn check_mtu(data: &[u8]) -> Result<(), RadioError> {
    if data.len() > RADIO_MTU {
        return Err(RadioError::PacketTooLarge(data.len()));
    }
    Ok(())
}

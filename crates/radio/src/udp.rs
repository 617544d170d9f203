//! RFM69 radio-modem bridge reached over UDP.
//!
//! Each datagram carries one radio packet:
//!
//! ```text
//! [network_id:1][sender:1][target:1][ctl:1][rssi:i16 LE][data:0..=61]
//! ```
//!
//! `ctl` uses the RFM69 control bits: 0x80 marks an ack, 0x40 asks the
//! receiver for one. The bridge fills in `rssi` on receptions; the gateway
//! sends 0.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Instant;
use log::{debug, info, trace, warn};

use crate::{
    check_mtu, NodeAddress, RadioConfig, RadioError, RadioTransport, Reception,
    BROADCAST_ADDRESS, PROBE_PAYLOAD, RADIO_MTU,
};

pub const HEADER_SIZE: usize = 6;
pub const CTL_ACK: u8 = 0x80;
pub const CTL_REQUEST_ACK: u8 = 0x40;

pub struct UdpRadio {
    socket: UdpSocket,
    config: RadioConfig,
    pending_probe: Option<(NodeAddress, Instant)>,
    buf: Vec<u8>,
}

impl UdpRadio {
    pub fn bind(config: RadioConfig) -> Result<Self, RadioError> {
        let socket = UdpSocket::bind(config.bind)?;
        socket.set_nonblocking(true)?;
        info!(
            "Listening at {} Mhz on {} (node {}, network {}, modem {})",
            config.frequency_mhz,
            socket.local_addr()?,
            config.node_id,
            config.network_id,
            config.modem
        );
        Ok(Self {
            socket,
            config,
            pending_probe: None,
            // room for one oversized packet so we can tell it apart
            buf: vec![0u8; HEADER_SIZE + RADIO_MTU + 1],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RadioError> {
        Ok(self.socket.local_addr()?)
    }

    fn transmit(&mut self, target: NodeAddress, ctl: u8, data: &[u8]) -> Result<(), RadioError> {
        check_mtu(data)?;
        let datagram =
            encode_datagram(self.config.network_id, self.config.node_id, target, ctl, 0, data);
        let sent = self.socket.send_to(&datagram, self.config.modem)?;
        if sent != datagram.len() {
            return Err(RadioError::TransmissionFailed);
        }
        trace!("Sent {} bytes to node {} (ctl 0x{:02x})", data.len(), target, ctl);
        Ok(())
    }

    fn expire_probe(&mut self) {
        if let Some((node, deadline)) = self.pending_probe {
            if Instant::now() >= deadline {
                debug!("Probe to node {} got no ack", node);
                self.pending_probe = None;
            }
        }
    }

    fn accepts(&self, network_id: u8, target: NodeAddress) -> bool {
        network_id == self.config.network_id
            && (self.config.promiscuous
                || target == self.config.node_id
                || target == BROADCAST_ADDRESS)
    }
}

impl RadioTransport for UdpRadio {
    fn try_receive(&mut self) -> Result<Option<Reception>, RadioError> {
        loop {
            let (len, from) = match self.socket.recv_from(&mut self.buf) {
                Ok(r) => r,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.expire_probe();
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

            let datagram = &self.buf[..len];
            if len < HEADER_SIZE {
                warn!("Runt datagram from {}: {} bytes", from, len);
                continue;
            }
            if len > HEADER_SIZE + RADIO_MTU {
                warn!("Oversized datagram from {} dropped", from);
                continue;
            }

            let (network_id, sender_id, target_id, ctl) =
                (datagram[0], datagram[1], datagram[2], datagram[3]);
            if !self.accepts(network_id, target_id) {
                trace!("Ignoring packet for node {} on network {}", target_id, network_id);
                continue;
            }

            if ctl & CTL_ACK != 0 {
                match self.pending_probe {
                    Some((node, deadline)) if node == sender_id && Instant::now() < deadline => {
                        debug!("Probe ack from node {}", sender_id);
                        self.pending_probe = None;
                    }
                    _ => trace!("Unsolicited ack from node {}", sender_id),
                }
                continue;
            }

            return Ok(Some(Reception {
                sender_id,
                target_id,
                rssi: i16::from_le_bytes([datagram[4], datagram[5]]),
                ack_requested: ctl & CTL_REQUEST_ACK != 0,
                data: datagram[HEADER_SIZE..].to_vec(),
            }));
        }
    }

    fn send_ack(&mut self, node: NodeAddress) -> Result<(), RadioError> {
        self.transmit(node, CTL_ACK, &[])
    }

    fn send_probe(&mut self, node: NodeAddress) -> Result<(), RadioError> {
        self.transmit(node, CTL_REQUEST_ACK, PROBE_PAYLOAD)?;
        self.pending_probe = Some((node, Instant::now() + self.config.ack_time));
        Ok(())
    }

    fn send(&mut self, node: NodeAddress, data: &[u8]) -> Result<(), RadioError> {
        self.transmit(node, 0, data)
    }
}

pub fn encode_datagram(
    network_id: u8,
    sender: NodeAddress,
    target: NodeAddress,
    ctl: u8,
    rssi: i16,
    data: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + data.len());
    out.extend_from_slice(&[network_id, sender, target, ctl]);
    out.extend_from_slice(&rssi.to_le_bytes());
    out.extend_from_slice(data);
    out
}

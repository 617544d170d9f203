//! Simulated radio for testing

use std::collections::VecDeque;
use log::{debug, trace};

use crate::{check_mtu, NodeAddress, RadioError, RadioTransport, Reception};

/// Everything the gateway put on the air, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transmission {
    Ack { node: NodeAddress },
    Probe { node: NodeAddress },
    Data { node: NodeAddress, data: Vec<u8> },
}

#[derive(Debug, Default)]
pub struct SimulatedRadio {
    inbox: VecDeque<Reception>,
    transmissions: Vec<Transmission>,
    fail_sends: bool,
}

impl SimulatedRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reception that the next `try_receive` will return.
    pub fn inject(&mut self, reception: Reception) {
        trace!("Injecting {} bytes from node {}", reception.data.len(), reception.sender_id);
        self.inbox.push_back(reception);
    }

    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    pub fn transmissions(&self) -> &[Transmission] {
        &self.transmissions
    }

    pub fn take_transmissions(&mut self) -> Vec<Transmission> {
        std::mem::take(&mut self.transmissions)
    }

    /// Makes every outbound operation fail until switched back.
    pub fn set_fail_sends(&mut self, fail: bool) {
        self.fail_sends = fail;
    }

    fn transmit(&mut self, tx: Transmission) -> Result<(), RadioError> {
        if self.fail_sends {
            debug!("Simulated transmission failure: {:?}", tx);
            return Err(RadioError::TransmissionFailed);
        }
        self.transmissions.push(tx);
        Ok(())
    }
}

impl RadioTransport for SimulatedRadio {
    fn try_receive(&mut self) -> Result<Option<Reception>, RadioError> {
        Ok(self.inbox.pop_front())
    }

    fn send_ack(&mut self, node: NodeAddress) -> Result<(), RadioError> {
        self.transmit(Transmission::Ack { node })
    }

    fn send_probe(&mut self, node: NodeAddress) -> Result<(), RadioError> {
        self.transmit(Transmission::Probe { node })
    }

    fn send(&mut self, node: NodeAddress, data: &[u8]) -> Result<(), RadioError> {
        check_mtu(data)?;
        self.transmit(Transmission::Data { node, data: data.to_vec() })
    }
}

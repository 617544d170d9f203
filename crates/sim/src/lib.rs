//! simulation tools for piGateway

pub mod node;
pub mod scenarios;

/// Radio conditions between the simulated nodes and the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConditions {
    pub packet_loss: f32,
    pub rssi_mean: f32,
    pub rssi_stddev: f32,
    /// Share of delivered packets that arrive truncated.
    pub corrupt_rate: f32,
    pub ack_request_rate: f32,
}

pub struct SimulationPresets;

impl SimulationPresets {
    pub fn good_conditions() -> LinkConditions {
        LinkConditions {
            packet_loss: 0.02,
            rssi_mean: -45.0,
            rssi_stddev: 4.0,
            corrupt_rate: 0.0,
            ack_request_rate: 1.0,
        }
    }

    pub fn average_conditions() -> LinkConditions {
        LinkConditions {
            packet_loss: 0.10,
            rssi_mean: -70.0,
            rssi_stddev: 6.0,
            corrupt_rate: 0.02,
            ack_request_rate: 0.8,
        }
    }

    pub fn poor_conditions() -> LinkConditions {
        LinkConditions {
            packet_loss: 0.30,
            rssi_mean: -92.0,
            rssi_stddev: 5.0, // close to the RFM69 sensitivity floor
            corrupt_rate: 0.08,
            ack_request_rate: 0.5,
        }
    }
}

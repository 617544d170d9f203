//! Simulated sensor node producing the same frames as the field firmware.

use pigateway_core::{encode_frame, SensorFrame, FRAME_SIZE};
use pigateway_radio::Reception;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::LinkConditions;

/// What happened to one transmission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Lost,
    Corrupted(Reception),
    Delivered(Reception),
}

pub struct SensorNodeSim {
    pub node_id: u8,
    pub sensor_id: u8,
    gateway_id: u8,
    counter: u32,
    temperature: Normal<f32>,
}

impl SensorNodeSim {
    pub fn new(node_id: u8, sensor_id: u8, gateway_id: u8) -> Self {
        Self {
            node_id,
            sensor_id,
            gateway_id,
            counter: 0,
            temperature: Normal::new(21.0, 2.0).expect("valid temperature distribution"),
        }
    }

    pub fn next_frame<G: Rng>(&mut self, rng: &mut G) -> SensorFrame {
        self.counter += 1;
        SensorFrame {
            node_id: i16::from(self.node_id),
            sensor_id: i16::from(self.sensor_id),
            reading1: self.counter,
            reading2: self.temperature.sample(rng),
            reading3: rng.random_range(30.0..60.0),
        }
    }

    pub fn transmit<G: Rng>(&mut self, conditions: &LinkConditions, rng: &mut G) -> Delivery {
        let frame = self.next_frame(rng);
        if rng.random::<f32>() < conditions.packet_loss {
            return Delivery::Lost;
        }

        let rssi = Normal::new(conditions.rssi_mean, conditions.rssi_stddev)
            .map(|d| d.sample(rng))
            .unwrap_or(conditions.rssi_mean);
        let mut reception = Reception {
            sender_id: self.node_id,
            target_id: self.gateway_id,
            rssi: rssi.round() as i16,
            ack_requested: rng.random::<f32>() < conditions.ack_request_rate,
            data: encode_frame(&frame).to_vec(),
        };

        if rng.random::<f32>() < conditions.corrupt_rate {
            reception.data.truncate(rng.random_range(1..FRAME_SIZE));
            return Delivery::Corrupted(reception);
        }
        Delivery::Delivered(reception)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pigateway_core::decode_frame;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_counter_increments() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut node = SensorNodeSim::new(12, 3, 1);
        assert_eq!(node.next_frame(&mut rng).reading1, 1);
        let frame = node.next_frame(&mut rng);
        assert_eq!(frame.reading1, 2);
        assert_eq!((frame.node_id, frame.sensor_id), (12, 3));
        assert!((30.0..60.0).contains(&frame.reading3));
    }

    #[test]
    fn test_clean_link_delivers_valid_frames() {
        let mut rng = StdRng::seed_from_u64(1);
        let conditions = LinkConditions {
            packet_loss: 0.0,
            rssi_mean: -50.0,
            rssi_stddev: 0.0,
            corrupt_rate: 0.0,
            ack_request_rate: 1.0,
        };
        let mut node = SensorNodeSim::new(4, 1, 1);
        for _ in 0..10 {
            let Delivery::Delivered(r) = node.transmit(&conditions, &mut rng) else {
                panic!("clean link dropped a frame");
            };
            assert_eq!(r.rssi, -50);
            assert!(r.ack_requested);
            assert!(decode_frame(&r.data).is_ok());
        }
    }

    #[test]
    fn test_corrupted_frames_are_short() {
        let mut rng = StdRng::seed_from_u64(3);
        let conditions = LinkConditions {
            packet_loss: 0.0,
            rssi_mean: -50.0,
            rssi_stddev: 1.0,
            corrupt_rate: 1.0,
            ack_request_rate: 0.0,
        };
        let mut node = SensorNodeSim::new(4, 1, 1);
        let Delivery::Corrupted(r) = node.transmit(&conditions, &mut rng) else {
            panic!("expected corruption");
        };
        assert!(r.data.len() < FRAME_SIZE);
    }
}

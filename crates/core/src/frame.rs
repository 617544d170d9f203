//! Fixed 16-byte sensor frame exchanged with the radio nodes.
//!
//! Layout (little-endian, no padding):
//!
//! ```text
//! [node_id:i16][sensor_id:i16][reading1:u32][reading2:f32][reading3:f32]
//! ```
//!
//! The deployed node firmware casts this layout straight out of a C struct,
//! so field order and widths must never change.

use thiserror::Error;

use crate::types::{NodeId, SensorId, FRAME_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Invalid payload received, not matching frame size: got {actual} bytes, expected {expected}")]
    Malformed { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorFrame {
    pub node_id: i16,
    pub sensor_id: i16,
    pub reading1: u32,
    pub reading2: f32,
    pub reading3: f32,
}

/// Frame sent back to a node in response to a broker command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    pub node_id: NodeId,
    pub sensor_id: SensorId,
    pub reading1: u32,
}

impl CommandFrame {
    pub fn to_sensor_frame(&self) -> SensorFrame {
        SensorFrame {
            node_id: i16::from(self.node_id),
            sensor_id: i16::from(self.sensor_id),
            reading1: self.reading1,
            reading2: 0.0,
            reading3: 0.0,
        }
    }

    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        encode_frame(&self.to_sensor_frame())
    }
}

pub fn decode_frame(bytes: &[u8]) -> Result<SensorFrame, FrameError> {
    let buf: &[u8; FRAME_SIZE] = bytes.try_into().map_err(|_| FrameError::Malformed {
        expected: FRAME_SIZE,
        actual: bytes.len(),
    })?;

    Ok(SensorFrame {
        node_id: i16::from_le_bytes([buf[0], buf[1]]),
        sensor_id: i16::from_le_bytes([buf[2], buf[3]]),
        reading1: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        reading2: f32::from_bits(u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]])),
        reading3: f32::from_bits(u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]])),
    })
}

pub fn encode_frame(frame: &SensorFrame) -> [u8; FRAME_SIZE] {
    let mut out = [0u8; FRAME_SIZE];
    out[0..2].copy_from_slice(&frame.node_id.to_le_bytes());
    out[2..4].copy_from_slice(&frame.sensor_id.to_le_bytes());
    out[4..8].copy_from_slice(&frame.reading1.to_le_bytes());
    // bit-exact so NaN payloads survive a round trip
    out[8..12].copy_from_slice(&frame.reading2.to_bits().to_le_bytes());
    out[12..16].copy_from_slice(&frame.reading3.to_bits().to_le_bytes());
    out
}

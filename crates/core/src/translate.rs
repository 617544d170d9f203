//! RX and TX translation between radio frames and broker messages.

use thiserror::Error;

use crate::frame::{CommandFrame, SensorFrame};
use crate::topic::{decode_topic, encode_topic, TopicError};
use crate::types::{
    LinkQuality, NodeId, COMMAND_PAYLOAD_OFFSET, FRAME_SIZE, VAR_LINK_QUALITY, VAR_READING1,
    VAR_READING2, VAR_READING3,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("invalid command topic: {0}")]
    InvalidTopic(#[from] TopicError),

    #[error("command payload is empty")]
    EmptyPayload,
}

/// A sensor frame plus the RSSI the radio measured when it arrived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichedReading {
    pub frame: SensorFrame,
    pub link_quality: LinkQuality,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCommand {
    pub node_id: NodeId,
    pub command: CommandFrame,
    pub frame: [u8; FRAME_SIZE],
}

impl EnrichedReading {
    pub fn publishes(&self) -> Result<[Publish; 4], TopicError> {
        let node = i32::from(self.frame.node_id);
        let sensor = i32::from(self.frame.sensor_id);
        let publish = |variable: u8, payload: String| -> Result<Publish, TopicError> {
            Ok(Publish {
                topic: encode_topic(node, sensor, i32::from(variable))?,
                payload,
            })
        };

        Ok([
            publish(VAR_READING1, format!("{:04}", self.frame.reading1))?,
            publish(VAR_READING2, fixed6(self.frame.reading2))?,
            publish(VAR_READING3, fixed6(self.frame.reading3))?,
            publish(VAR_LINK_QUALITY, padded_signed(self.link_quality))?,
        ])
    }
}

/// Six decimals, with NaN spelled the way printf's `%f` spells it.
fn fixed6(value: f32) -> String {
    if value.is_nan() {
        let sign = if value.is_sign_negative() { "-" } else { "" };
        format!("{}nan", sign)
    } else {
        format!("{:.6}", value)
    }
}

/// Four digits after the sign, so -60 renders as "-0060".
fn padded_signed(value: LinkQuality) -> String {
    if value < 0 {
        format!("-{:04}", value.unsigned_abs())
    } else {
        format!("{:04}", value)
    }
}

pub fn translate_reception(
    frame: SensorFrame,
    link_quality: LinkQuality,
) -> Result<[Publish; 4], TopicError> {
    EnrichedReading { frame, link_quality }.publishes()
}

/// Builds the radio frame for a command received on `topic`.
///
/// The first four payload bytes are read as a little-endian `i32` (shorter
/// payloads are zero-extended) and 48 is subtracted, so a single ASCII digit
/// payload such as `"1"` reaches the node as the integer 1. Nodes in the field
/// depend on this offset; it is part of the protocol.
pub fn translate_command(topic: &str, payload: &[u8]) -> Result<OutboundCommand, CommandError> {
    let addr = decode_topic(topic)?;
    if payload.is_empty() {
        return Err(CommandError::EmptyPayload);
    }

    let mut raw = [0u8; 4];
    let n = payload.len().min(4);
    raw[..n].copy_from_slice(&payload[..n]);
    let value = i32::from_le_bytes(raw) as u32;

    let command = CommandFrame {
        node_id: addr.node_id,
        sensor_id: addr.sensor_id,
        reading1: value.wrapping_sub(COMMAND_PAYLOAD_OFFSET),
    };

    Ok(OutboundCommand {
        node_id: addr.node_id,
        command,
        frame: command.encode(),
    })
}

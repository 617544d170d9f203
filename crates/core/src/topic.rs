//! Four-digit broker topics: two digits node, one digit sensor, one digit variable.

use thiserror::Error;

use crate::types::{
    NodeId, SensorId, VariableIndex, MAX_TOPIC_NODE, MAX_TOPIC_SENSOR, MAX_TOPIC_VARIABLE,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("topic {0:?} is shorter than 3 characters")]
    TooShort(String),

    #[error("topic {0:?} has a non-digit in its node/sensor positions")]
    NotNumeric(String),

    #[error("address out of range: node {node} (0-99), sensor {sensor} (0-9), variable {variable} (0-9)")]
    OutOfRange { node: i32, sensor: i32, variable: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicAddress {
    pub node_id: NodeId,
    pub sensor_id: SensorId,
    /// Only known when the topic carries a fourth digit.
    pub variable: Option<VariableIndex>,
}

pub fn encode_topic(node: i32, sensor: i32, variable: i32) -> Result<String, TopicError> {
    let in_range = (0..=i32::from(MAX_TOPIC_NODE)).contains(&node)
        && (0..=i32::from(MAX_TOPIC_SENSOR)).contains(&sensor)
        && (0..=i32::from(MAX_TOPIC_VARIABLE)).contains(&variable);
    if !in_range {
        return Err(TopicError::OutOfRange { node, sensor, variable });
    }
    Ok(format!("{:02}{:01}{:01}", node, sensor, variable))
}

pub fn decode_topic(topic: &str) -> Result<TopicAddress, TopicError> {
    let bytes = topic.as_bytes();
    if bytes.len() < 3 {
        return Err(TopicError::TooShort(topic.to_string()));
    }

    let digit = |b: u8| -> Result<u8, TopicError> {
        if b.is_ascii_digit() {
            Ok(b - b'0')
        } else {
            Err(TopicError::NotNumeric(topic.to_string()))
        }
    };

    let node_id = digit(bytes[0])? * 10 + digit(bytes[1])?;
    let sensor_id = digit(bytes[2])?;
    let variable = bytes.get(3).copied().filter(u8::is_ascii_digit).map(|b| b - b'0');

    Ok(TopicAddress { node_id, sensor_id, variable })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_zero_pads() {
        assert_eq!(encode_topic(5, 2, 1).unwrap(), "0521");
        assert_eq!(encode_topic(0, 0, 0).unwrap(), "0000");
        assert_eq!(encode_topic(99, 9, 9).unwrap(), "9999");
    }

    #[test]
    fn test_round_trip_full_range() {
        for node in 0..=99 {
            for sensor in 0..=9 {
                for variable in 0..=9 {
                    let topic = encode_topic(node, sensor, variable).unwrap();
                    assert_eq!(topic.len(), 4);
                    let addr = decode_topic(&topic).unwrap();
                    assert_eq!(i32::from(addr.node_id), node);
                    assert_eq!(i32::from(addr.sensor_id), sensor);
                }
            }
        }
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(matches!(encode_topic(100, 0, 1), Err(TopicError::OutOfRange { .. })));
        assert!(matches!(encode_topic(-1, 0, 1), Err(TopicError::OutOfRange { .. })));
        assert!(matches!(encode_topic(1, 10, 1), Err(TopicError::OutOfRange { .. })));
        assert!(matches!(encode_topic(1, 1, 10), Err(TopicError::OutOfRange { .. })));
    }

    #[test]
    fn test_short_topic() {
        assert_eq!(decode_topic("12"), Err(TopicError::TooShort("12".into())));
        assert_eq!(decode_topic(""), Err(TopicError::TooShort("".into())));
    }

    #[test]
    fn test_non_digit_topic() {
        assert!(matches!(decode_topic("XXXX"), Err(TopicError::NotNumeric(_))));
        assert!(matches!(decode_topic("0a3"), Err(TopicError::NotNumeric(_))));
        assert!(matches!(decode_topic("07-"), Err(TopicError::NotNumeric(_))));
    }

    #[test]
    fn test_three_digit_topic_has_no_variable() {
        let addr = decode_topic("073").unwrap();
        assert_eq!(addr, TopicAddress { node_id: 7, sensor_id: 3, variable: None });

        let addr = decode_topic("0734").unwrap();
        assert_eq!(addr.variable, Some(4));
    }
}

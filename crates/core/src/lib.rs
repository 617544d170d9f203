//! core codecs and translators for piGateway

pub mod frame;
pub mod topic;
pub mod translate;
pub mod types;

pub use frame::{decode_frame, encode_frame, CommandFrame, FrameError, SensorFrame};
pub use topic::{decode_topic, encode_topic, TopicAddress, TopicError};
pub use translate::{
    translate_command, translate_reception, CommandError, EnrichedReading, OutboundCommand,
    Publish,
};
pub use types::*;

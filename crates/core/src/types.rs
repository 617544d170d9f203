pub type NodeId = u8;
pub type SensorId = u8;
pub type VariableIndex = u8;
pub type LinkQuality = i16;

/// Wire size of a sensor frame: i16 + i16 + u32 + f32 + f32, no padding.
pub const FRAME_SIZE: usize = 16;

pub const MAX_TOPIC_NODE: NodeId = 99;
pub const MAX_TOPIC_SENSOR: SensorId = 9;
pub const MAX_TOPIC_VARIABLE: VariableIndex = 9;

/// Subtracted from the integer carried by an inbound command payload.
pub const COMMAND_PAYLOAD_OFFSET: u32 = 48;

pub const VAR_READING1: VariableIndex = 1;
pub const VAR_READING2: VariableIndex = 2;
pub const VAR_READING3: VariableIndex = 3;
pub const VAR_LINK_QUALITY: VariableIndex = 4;

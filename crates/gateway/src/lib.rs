//! RFM69 to MQTT gateway

pub mod broker;
pub mod config;
pub mod gateway;

pub use broker::{
    BrokerError, BrokerTransport, MemoryBroker, MessageHandler, MqttBroker, Published,
};
pub use config::{BrokerConfig, ConfigError, GatewayConfig};
pub use gateway::{Gateway, GatewayError, GatewayStats};

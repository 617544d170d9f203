//! Gateway configuration: built-in defaults, an optional JSON file named by
//! `PIGATEWAY_CONFIG`, then `PIGATEWAY_*` environment overrides.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use pigateway_radio::{millis, RadioConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_PATH_VAR: &str = "PIGATEWAY_CONFIG";
const ENV_PREFIX: &str = "PIGATEWAY_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {var}")]
    Env { var: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keepalive_secs: u64,
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "arduinoClient".to_string(),
            keepalive_secs: 60,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub broker: BrokerConfig,
    pub radio: RadioConfig,
    /// Longest the loop waits on the broker before polling the radio again.
    #[serde(with = "millis")]
    pub service_timeout: Duration,
    /// Topic filters carrying commands for the nodes.
    pub command_topics: Vec<String>,
    /// Log gateway counters every this many receptions; 0 disables.
    pub stats_interval: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            radio: RadioConfig::default(),
            service_timeout: Duration::from_millis(1000),
            command_topics: Vec::new(),
            stats_interval: 100,
        }
    }
}

impl GatewayConfig {
    /// Reads the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        Ok(config)
    }

    pub fn from_file(path: PathBuf) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = get("BROKER_HOST") {
            self.broker.host = v;
        }
        if let Some(v) = get("CLIENT_ID") {
            self.broker.client_id = v;
        }
        override_parsed(&get, "BROKER_PORT", &mut self.broker.port)?;
        override_parsed(&get, "KEEPALIVE_SECS", &mut self.broker.keepalive_secs)?;

        let mut timeout_ms = self.service_timeout.as_millis() as u64;
        override_parsed(&get, "SERVICE_TIMEOUT_MS", &mut timeout_ms)?;
        self.service_timeout = Duration::from_millis(timeout_ms);

        if let Some(v) = get("COMMAND_TOPICS") {
            self.command_topics = v
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }

        override_parsed(&get, "NODE_ID", &mut self.radio.node_id)?;
        override_parsed(&get, "NETWORK_ID", &mut self.radio.network_id)?;
        override_parsed(&get, "FREQUENCY_MHZ", &mut self.radio.frequency_mhz)?;
        override_parsed(&get, "PROMISCUOUS", &mut self.radio.promiscuous)?;
        override_parsed(&get, "RADIO_BIND", &mut self.radio.bind)?;
        override_parsed(&get, "RADIO_MODEM", &mut self.radio.modem)?;
        Ok(())
    }
}

fn override_parsed<T, G>(get: &G, name: &str, slot: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    if let Some(value) = get(name) {
        *slot = value.trim().parse().map_err(|_| ConfigError::Env {
            var: format!("{}{}", ENV_PREFIX, name),
            value,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_gateway_constants() {
        let config = GatewayConfig::load_with(env(&[])).unwrap();
        assert_eq!(config.broker.host, "localhost");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.client_id, "arduinoClient");
        assert_eq!(config.broker.keepalive_secs, 60);
        assert_eq!(config.radio.node_id, 1);
        assert_eq!(config.radio.network_id, 101);
        assert_eq!(config.radio.frequency_mhz, 915);
        assert_eq!(config.radio.ack_time, Duration::from_millis(30));
        assert_eq!(config.service_timeout, Duration::from_millis(1000));
        assert!(config.command_topics.is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let config = GatewayConfig::load_with(env(&[
            ("PIGATEWAY_BROKER_HOST", "mqtt.lan"),
            ("PIGATEWAY_BROKER_PORT", "8883"),
            ("PIGATEWAY_SERVICE_TIMEOUT_MS", "250"),
            ("PIGATEWAY_COMMAND_TOPICS", "0731, 0732,,"),
            ("PIGATEWAY_PROMISCUOUS", "true"),
            ("PIGATEWAY_RADIO_MODEM", "10.0.0.2:7100"),
        ]))
        .unwrap();
        assert_eq!(config.broker.host, "mqtt.lan");
        assert_eq!(config.broker.port, 8883);
        assert_eq!(config.service_timeout, Duration::from_millis(250));
        assert_eq!(config.command_topics, vec!["0731", "0732"]);
        assert!(config.radio.promiscuous);
        assert_eq!(config.radio.modem, "10.0.0.2:7100".parse::<std::net::SocketAddr>().unwrap());
    }

    #[test]
    fn test_bad_env_value() {
        let err = GatewayConfig::load_with(env(&[("PIGATEWAY_NODE_ID", "300")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref var, .. } if var == "PIGATEWAY_NODE_ID"));
    }

    #[test]
    fn test_json_file_then_env() {
        let file_name = format!("pigateway-config-{}.json", std::process::id());
        let path = std::env::temp_dir().join(file_name);
        std::fs::write(
            &path,
            r#"{
                "broker": { "host": "filehost", "port": 1884 },
                "command_topics": ["0101"],
                "service_timeout": 50
            }"#,
        )
        .unwrap();

        let path_str = path.to_string_lossy().to_string();
        let config = GatewayConfig::load_with(env(&[
            (CONFIG_PATH_VAR, path_str.as_str()),
            ("PIGATEWAY_BROKER_PORT", "1999"),
        ]))
        .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.broker.host, "filehost");
        assert_eq!(config.broker.port, 1999);
        assert_eq!(config.broker.client_id, "arduinoClient");
        assert_eq!(config.command_topics, vec!["0101"]);
        assert_eq!(config.service_timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_missing_file() {
        let err = GatewayConfig::load_with(env(&[(CONFIG_PATH_VAR, "/nonexistent/pigateway.json")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

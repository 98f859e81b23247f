//! Configuration data model, plus YAML loading.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_timeout() -> u64 {
    15
}

fn default_port() -> u16 {
    6667
}

fn default_nick() -> String {
    "KGB".to_string()
}

fn default_username() -> String {
    "kgb".to_string()
}

fn default_ircname() -> String {
    "KGB bot".to_string()
}

fn default_service_name() -> String {
    "KGB".to_string()
}

fn default_queue_limit() -> usize {
    150
}

fn default_min_protocol_ver() -> i64 {
    1
}

/// A KGB server the client may submit a commit to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRef {
    pub uri: String,
    /// Defaults to `uri + "?session=KGB"`; filled in by [`ServerRef::normalize`].
    #[serde(default)]
    pub proxy: Option<String>,
    pub password: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub verbose: bool,
}

impl ServerRef {
    /// The actual HTTP endpoint to call.
    pub fn proxy_url(&self) -> String {
        self.proxy
            .clone()
            .unwrap_or_else(|| format!("{}?session=KGB", self.uri))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Per-repository access control and channel routing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Empty string means unauthenticated.
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub channels: Vec<String>,
}

/// TLS is an explicit Non-goal: this field round-trips through
/// config parsing but is never consulted by the connector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// One IRC network KGB maintains a session on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_nick")]
    pub nick: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_ircname")]
    pub ircname: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub nickserv_password: Option<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

/// A channel on a network, and the repositories that post to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub network: String,
    #[serde(default)]
    pub repos: Vec<String>,
    #[serde(default)]
    pub smart_answers: Option<Vec<String>>,
    #[serde(default)]
    pub smart_answers_polygen: Option<String>,
}

/// Global, server-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub rpc_addr: String,
    pub rpc_port: u16,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_queue_limit")]
    pub queue_limit: usize,
    #[serde(default = "default_min_protocol_ver")]
    pub min_protocol_ver: i64,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub colors: HashMap<String, String>,
    #[serde(default)]
    pub smart_answers: Vec<String>,
}

/// Top-level config file: everything the supervisor loads and
/// hot-reloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub global: GlobalConfig,
    #[serde(default)]
    pub repos: HashMap<String, RepoConfig>,
    #[serde(default)]
    pub networks: HashMap<String, NetworkConfig>,
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,
}

impl Config {
    pub fn from_str(s: &str) -> crate::error::Result<Config> {
        let config: Config = serde_yaml::from_str(s)?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> crate::error::Result<Config> {
        let data = std::fs::read_to_string(path)?;
        Config::from_str(&data)
    }

    /// Derived index: repo id → channel names posting it, populated
    /// once at load.
    pub fn repo_channels(&self) -> HashMap<String, Vec<String>> {
        let mut index: HashMap<String, Vec<String>> = HashMap::new();
        for channel in self.channels.values() {
            for repo in &channel.repos {
                index.entry(repo.clone()).or_default().push(channel.name.clone());
            }
        }
        index
    }

    /// Whether `proto` is an accepted protocol version (supported
    /// versions are {0,1,2}; 0 is rejected unless `min_protocol_ver <= 0`).
    pub fn accepts_protocol(&self, proto: i64) -> bool {
        matches!(proto, 0 | 1 | 2) && proto >= self.global.min_protocol_ver
    }
}

/// Whether the RPC bind triple changed between two configs (a
/// changed bind forces a restart via the `QUIT` path rather than a
/// hot swap).
pub fn rpc_bind_changed(old: &GlobalConfig, new: &GlobalConfig) -> bool {
    old.rpc_addr != new.rpc_addr
        || old.rpc_port != new.rpc_port
        || old.service_name != new.service_name
}

/// Whether a network's connection parameters changed enough to
/// require tearing the session down and respawning it, as opposed to
/// just reconciling channel membership.
pub fn network_identity_changed(old: &NetworkConfig, new: &NetworkConfig) -> bool {
    old.server != new.server
        || old.port != new.port
        || old.nick != new.nick
        || old.ircname != new.ircname
        || old.username != new.username
        || old.password != new.password
        || old.nickserv_password != new.nickserv_password
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
global:
  rpc_addr: "0.0.0.0"
  rpc_port: 9999
  queue_limit: 150
  admins:
    - "admin!*@*"
repos:
  test:
    password: "v,sjflir"
    channels: ["#test"]
networks:
  freenode:
    server: "irc.example.org"
    channels: ["#test"]
channels:
  "#test":
    name: "#test"
    network: "freenode"
    repos: ["test"]
"#;

    #[test]
    fn parses_sample_config() {
        let cfg = Config::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.global.rpc_port, 9999);
        assert_eq!(cfg.global.min_protocol_ver, 1);
        assert_eq!(cfg.repos["test"].password, "v,sjflir");
        assert_eq!(cfg.networks["freenode"].port, 6667);
        assert_eq!(cfg.networks["freenode"].nick, "KGB");
    }

    #[test]
    fn repo_channels_index_is_populated() {
        let cfg = Config::from_str(SAMPLE).unwrap();
        let idx = cfg.repo_channels();
        assert_eq!(idx["test"], vec!["#test".to_string()]);
    }

    #[test]
    fn protocol_v0_rejected_by_default() {
        let cfg = Config::from_str(SAMPLE).unwrap();
        assert!(!cfg.accepts_protocol(0));
        assert!(cfg.accepts_protocol(1));
        assert!(cfg.accepts_protocol(2));
        assert!(!cfg.accepts_protocol(3));
    }

    #[test]
    fn server_ref_defaults_proxy_to_uri_plus_session() {
        let s = ServerRef {
            uri: "http://example.org/".to_string(),
            proxy: None,
            password: "pw".to_string(),
            timeout_secs: 15,
            verbose: false,
        };
        assert_eq!(s.proxy_url(), "http://example.org/?session=KGB");
    }

    #[test]
    fn rpc_bind_change_detected() {
        let mut a = Config::from_str(SAMPLE).unwrap().global;
        let b = a.clone();
        assert!(!rpc_bind_changed(&a, &b));
        a.rpc_port = 1234;
        assert!(rpc_bind_changed(&a, &b));
    }
}

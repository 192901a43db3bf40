//! Settings consumed by the core components
//!
//! Settings live in `config.toml` under the state directory and are loaded by
//! [`crate::state::AppState`]. Components never read this file themselves;
//! they receive plain config structs built from these sections at
//! composition time, so a settings reload means rebuilding the components.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub node: NodeSettings,
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub encryption: EncryptionSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Which upstream the fetcher tries first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Gateways first, local node as a last resort
    #[default]
    Gateway,
    /// Local node first, gateways as fallback
    Api,
}

/// Storage-node and fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Node binary, used for the daemon and for one-shot commands
    #[serde(default = "default_node_binary")]
    pub binary: String,
    /// Per-attempt timeout in milliseconds, for gateway fetches and one-shot
    /// node commands
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Attempts for one-shot node commands (resolve, key management)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub connection_mode: ConnectionMode,
    #[serde(default = "default_gateway_url")]
    pub gateway_url: Url,
    #[serde(default = "default_fallback_gateways")]
    pub fallback_gateways: Vec<Url>,
    #[serde(default = "default_true")]
    pub use_fallback_gateways: bool,
    /// Pass `--offline` to name resolution
    #[serde(default)]
    pub allow_offline: bool,
    /// When false the daemon is started with `--offline`
    #[serde(default = "default_true")]
    pub allow_online: bool,
    #[serde(default = "default_true")]
    pub pin_enabled: bool,
    #[serde(default = "default_true")]
    pub pin_recursive: bool,
    /// Timeout string handed to `name resolve --timeout`
    #[serde(default = "default_name_resolve_timeout")]
    pub name_resolve_timeout: String,
    /// Milliseconds to wait for the daemon's readiness marker
    #[serde(default = "default_daemon_startup_timeout")]
    pub daemon_startup_timeout: u64,
    /// Name of the node key that owns the naming pointer
    #[serde(default = "default_ipns_key_name")]
    pub ipns_key_name: String,
    /// Node repository directory holding the lock files (default: ~/.ipfs)
    #[serde(default)]
    pub repo_dir: Option<PathBuf>,
    /// Pid-file path (default: `node.pid` in the state directory)
    #[serde(default)]
    pub pid_file: Option<PathBuf>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            binary: default_node_binary(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            connection_mode: ConnectionMode::default(),
            gateway_url: default_gateway_url(),
            fallback_gateways: default_fallback_gateways(),
            use_fallback_gateways: true,
            allow_offline: false,
            allow_online: true,
            pin_enabled: true,
            pin_recursive: true,
            name_resolve_timeout: default_name_resolve_timeout(),
            daemon_startup_timeout: default_daemon_startup_timeout(),
            ipns_key_name: default_ipns_key_name(),
            repo_dir: None,
            pid_file: None,
        }
    }
}

/// Process-handling grace periods, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Grace period after SIGTERM before stray processes are force-killed
    #[serde(default = "default_process_kill_timeout")]
    pub process_kill_timeout: u64,
    /// Pause between lock cleanup and daemon spawn
    #[serde(default = "default_cleanup_wait_timeout")]
    pub cleanup_wait_timeout: u64,
    /// Grace period for the supervised daemon on shutdown
    #[serde(default = "default_daemon_shutdown_timeout")]
    pub daemon_shutdown_timeout: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            process_kill_timeout: default_process_kill_timeout(),
            cleanup_wait_timeout: default_cleanup_wait_timeout(),
            daemon_shutdown_timeout: default_daemon_shutdown_timeout(),
        }
    }
}

/// Envelope decryption settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionSettings {
    #[serde(default = "default_cipher")]
    pub default_cipher: String,
    /// Symmetric key size in bits; `key_size / 8` bytes of the unwrapped
    /// material are used as the content key
    #[serde(default = "default_key_size")]
    pub key_size: u32,
    #[serde(default = "default_oaep_hash")]
    pub oaep_hash: String,
    /// RSA modulus size for generated keys
    #[serde(default = "default_key_gen_bits")]
    pub key_gen_bits: u32,
    /// Content decryption key (default: `key.pem` in the state directory)
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,
    /// File holding the naming pointer's peer id (default: `naming.key` in
    /// the state directory)
    #[serde(default)]
    pub ipns_key_file: Option<PathBuf>,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            default_cipher: default_cipher(),
            key_size: default_key_size(),
            oaep_hash: default_oaep_hash(),
            key_gen_bits: default_key_gen_bits(),
            private_key_file: None,
            ipns_key_file: None,
        }
    }
}

/// Log rendering and output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_sort_field")]
    pub sort_field: String,
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
    /// Directory for service logs and fetched-bundle output (default:
    /// `logs/` in the state directory)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// JSON-lines file fetched entries are appended to
    #[serde(default = "default_output_file")]
    pub output_file: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            sort_field: default_sort_field(),
            sort_order: default_sort_order(),
            log_dir: None,
            output_file: default_output_file(),
        }
    }
}

fn default_node_binary() -> String {
    "ipfs".to_string()
}

fn default_timeout() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_gateway_url() -> Url {
    Url::parse("https://ipfs.io/ipfs/").expect("hardcoded URL must parse")
}

fn default_fallback_gateways() -> Vec<Url> {
    vec![
        Url::parse("https://cloudflare-ipfs.com/ipfs/").expect("hardcoded URL must parse"),
        Url::parse("https://dweb.link/ipfs/").expect("hardcoded URL must parse"),
    ]
}

fn default_true() -> bool {
    true
}

fn default_name_resolve_timeout() -> String {
    "30s".to_string()
}

fn default_daemon_startup_timeout() -> u64 {
    30_000
}

fn default_ipns_key_name() -> String {
    "loglink".to_string()
}

fn default_process_kill_timeout() -> u64 {
    1_000
}

fn default_cleanup_wait_timeout() -> u64 {
    1_000
}

fn default_daemon_shutdown_timeout() -> u64 {
    5_000
}

fn default_cipher() -> String {
    "aes-256-gcm".to_string()
}

fn default_key_size() -> u32 {
    256
}

fn default_oaep_hash() -> String {
    "sha256".to_string()
}

fn default_key_gen_bits() -> u32 {
    2048
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sort_field() -> String {
    "event_id".to_string()
}

fn default_sort_order() -> String {
    "desc".to_string()
}

fn default_output_file() -> String {
    "bundles.jsonl".to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.node.binary, "ipfs");
        assert_eq!(settings.node.connection_mode, ConnectionMode::Gateway);
        assert!(settings.node.use_fallback_gateways);
        assert_eq!(settings.encryption.default_cipher, "aes-256-gcm");
        assert_eq!(settings.encryption.key_size, 256);
        assert_eq!(settings.logging.sort_field, "event_id");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [node]
            connection_mode = "api"
            timeout = 5000
            "#,
        )
        .unwrap();
        assert_eq!(settings.node.connection_mode, ConnectionMode::Api);
        assert_eq!(settings.node.timeout, 5000);
        assert_eq!(settings.node.max_retries, 3);
        assert_eq!(settings.network.daemon_shutdown_timeout, 5000);
    }

    #[test]
    fn test_round_trips_through_toml() {
        let settings = Settings::default();
        let text = toml::to_string_pretty(&settings).unwrap();
        let back: Settings = toml::from_str(&text).unwrap();
        assert_eq!(back.node.gateway_url, settings.node.gateway_url);
        assert_eq!(back.logging.output_file, settings.logging.output_file);
    }
}

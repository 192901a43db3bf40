use std::{fs, path::PathBuf, time::Duration};

use common::bundle::{SortField, SortOrder};
use common::crypto::{CipherKind, CryptoConfig, OaepDigest};
use common::prelude::ContentId;

use crate::config::Settings;
use crate::fetch::FetchConfig;
use crate::node::supervisor::SupervisorConfig;
use crate::node::NodeClient;
use crate::resolve::ResolveConfig;

pub const APP_NAME: &str = "loglink";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const PRIVATE_KEY_FILE_NAME: &str = "key.pem";
pub const NAMING_KEY_FILE_NAME: &str = "naming.key";
pub const CHAIN_FILE_NAME: &str = "chain";
pub const PID_FILE_NAME: &str = "node.pid";
pub const LOG_DIR_NAME: &str = "logs";

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the loglink directory (~/.loglink)
    pub dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded settings
    pub settings: Settings,
}

impl AppState {
    /// Get the state directory path (custom or default ~/.loglink)
    pub fn state_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        settings: Option<Settings>,
    ) -> Result<Self, StateError> {
        let dir = Self::state_dir(custom_path)?;

        if dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&dir)?;

        let settings = settings.unwrap_or_default();
        let config_path = dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&settings)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            dir,
            config_path,
            settings,
        })
    }

    /// Load existing state from the state directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let dir = Self::state_dir(custom_path)?;

        if !dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let settings: Settings = toml::from_str(&config_toml)?;

        Ok(Self {
            dir,
            config_path,
            settings,
        })
    }

    /// Content decryption key path
    pub fn private_key_file(&self) -> PathBuf {
        self.settings
            .encryption
            .private_key_file
            .clone()
            .unwrap_or_else(|| self.dir.join(PRIVATE_KEY_FILE_NAME))
    }

    /// File holding the naming pointer's peer id
    pub fn naming_key_file(&self) -> PathBuf {
        self.settings
            .encryption
            .ipns_key_file
            .clone()
            .unwrap_or_else(|| self.dir.join(NAMING_KEY_FILE_NAME))
    }

    /// Pid-file for the supervised node daemon
    pub fn pid_file(&self) -> PathBuf {
        self.settings
            .node
            .pid_file
            .clone()
            .unwrap_or_else(|| self.dir.join(PID_FILE_NAME))
    }

    /// Node repository directory holding the lock files
    pub fn repo_dir(&self) -> Result<PathBuf, StateError> {
        if let Some(dir) = &self.settings.node.repo_dir {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(".ipfs"))
    }

    /// Directory for service logs and fetched-bundle output
    pub fn log_dir(&self) -> PathBuf {
        self.settings
            .logging
            .log_dir
            .clone()
            .unwrap_or_else(|| self.dir.join(LOG_DIR_NAME))
    }

    fn chain_file(&self) -> PathBuf {
        self.dir.join(CHAIN_FILE_NAME)
    }

    /// Read the persisted back-link, if any
    ///
    /// A missing file and an empty file both mean "no back-link recorded".
    pub fn read_chain(&self) -> Result<Option<ContentId>, StateError> {
        match fs::read_to_string(self.chain_file()) {
            Ok(contents) => {
                let trimmed = contents.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(ContentId::from(trimmed)))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the back-link of the last fetched bundle
    ///
    /// `None` records the beginning-of-history sentinel as an empty file.
    pub fn write_chain(&self, prev: Option<&ContentId>) -> Result<(), StateError> {
        let contents = prev.map(|id| id.as_str()).unwrap_or_default();
        fs::write(self.chain_file(), contents)?;
        Ok(())
    }

    /// Client for one-shot node commands
    pub fn node_client(&self) -> NodeClient {
        NodeClient::new(
            self.settings.node.binary.clone(),
            Duration::from_millis(self.settings.node.timeout),
            self.settings.node.max_retries,
        )
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            mode: self.settings.node.connection_mode,
            gateway_url: self.settings.node.gateway_url.clone(),
            fallback_gateways: self.settings.node.fallback_gateways.clone(),
            use_fallback_gateways: self.settings.node.use_fallback_gateways,
            timeout: Duration::from_millis(self.settings.node.timeout),
        }
    }

    pub fn crypto_config(&self) -> Result<CryptoConfig, StateError> {
        let cipher = self
            .settings
            .encryption
            .default_cipher
            .parse::<CipherKind>()
            .map_err(|e| StateError::InvalidSetting(e.to_string()))?;
        let oaep_digest = self
            .settings
            .encryption
            .oaep_hash
            .parse::<OaepDigest>()
            .map_err(|e| StateError::InvalidSetting(e.to_string()))?;

        Ok(CryptoConfig {
            cipher,
            key_size: self.settings.encryption.key_size,
            oaep_digest,
            private_key_file: self.private_key_file(),
        })
    }

    pub fn supervisor_config(&self) -> Result<SupervisorConfig, StateError> {
        Ok(SupervisorConfig {
            binary: self.settings.node.binary.clone(),
            repo_dir: self.repo_dir()?,
            pid_file: self.pid_file(),
            allow_online: self.settings.node.allow_online,
            startup_timeout: Duration::from_millis(self.settings.node.daemon_startup_timeout),
            kill_timeout: Duration::from_millis(self.settings.network.process_kill_timeout),
            cleanup_wait: Duration::from_millis(self.settings.network.cleanup_wait_timeout),
            shutdown_timeout: Duration::from_millis(
                self.settings.network.daemon_shutdown_timeout,
            ),
        })
    }

    pub fn resolve_config(&self) -> ResolveConfig {
        ResolveConfig {
            key_file: self.naming_key_file(),
            resolve_timeout: self.settings.node.name_resolve_timeout.clone(),
            allow_offline: self.settings.node.allow_offline,
        }
    }

    /// Sort parameters for bundle rendering; unknown values warn and fall
    /// back to the defaults
    pub fn sort_params(&self) -> (SortField, SortOrder) {
        let field = self
            .settings
            .logging
            .sort_field
            .parse::<SortField>()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "unknown sort_field, using default");
                SortField::default()
            });
        let order = self
            .settings
            .logging
            .sort_order
            .parse::<SortOrder>()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "unknown sort_order, using default");
                SortOrder::default()
            });
        (field, order)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("loglink directory not initialized. Run 'loglink init' first")]
    NotInitialized,

    #[error("loglink directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

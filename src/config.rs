use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use jws_lib::{KeyError, KeyPair};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

/// Overrides `client.host` when set.
pub const HOST_ENV: &str = "JWS_API_HOST";
/// Path of the TOML config file; defaults to [`default_config_path`].
pub const CONFIG_ENV: &str = "JWS_API_CONFIG";

pub const DEFAULT_HOST: &str = "http://localhost:3001";

pub const CLIENT_PRIVATE_BIN: &str = "client_private_key.bin";
pub const CLIENT_PUBLIC_BIN: &str = "client_public_key.bin";
pub const SERVER_PRIVATE_BIN: &str = "server_private_key.bin";
pub const SERVER_PUBLIC_BIN: &str = "server_public_key.bin";

/// Certificate handling for HTTPS hosts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    #[default]
    Verify,
    /// Accept any certificate. Local test servers only.
    TrustAll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub tls: TlsMode,
    pub private_key: PathBuf,
    pub public_key: PathBuf,
    /// Public key responses must be signed with.
    pub server_public_key: PathBuf,
    /// Sign bodies with `b64: false` instead of base64url-encoding them.
    pub unencoded_payload: bool,
    /// Trust a response only if it is signed for the request it answers
    /// (`jti` echoed). Turn off for servers that sign with their own ids.
    pub bind_responses: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            tls: TlsMode::Verify,
            private_key: PathBuf::from(CLIENT_PRIVATE_BIN),
            public_key: PathBuf::from(CLIENT_PUBLIC_BIN),
            server_public_key: PathBuf::from(SERVER_PUBLIC_BIN),
            unencoded_payload: false,
            bind_responses: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub private_key: PathBuf,
    pub public_key: PathBuf,
    /// Public keys requests must be signed with.
    pub trusted_client_keys: Vec<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 3001)),
            private_key: PathBuf::from(SERVER_PRIVATE_BIN),
            public_key: PathBuf::from(SERVER_PUBLIC_BIN),
            trusted_client_keys: vec![PathBuf::from(CLIENT_PUBLIC_BIN)],
        }
    }
}

/// Whole config file: a `[client]` and a `[server]` table, both optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub client: ClientConfig,
    pub server: ServerConfig,
}

impl Settings {
    /// Load from `$JWS_API_CONFIG` or the default location, falling back to
    /// defaults when no file exists, then apply `$JWS_API_HOST`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_config_path);

        let settings = if path.exists() {
            info!("Loading config from {}", path.display());
            Self::from_file(&path)?
        } else {
            info!("No config at {}, using defaults", path.display());
            Self::default()
        };

        Ok(settings.with_host_override(env::var(HOST_ENV).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Replace the client host unless `host` is `None` or blank.
    pub fn with_host_override(mut self, host: Option<String>) -> Self {
        if let Some(host) = host.filter(|h| !h.trim().is_empty()) {
            self.client.host = host;
        }
        self
    }
}

/// `<config dir>/jws-api-client/config.toml`, or `./config.toml` when the
/// platform has no config dir.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("jws-api-client").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// Use the `.bin` files as the source of truth.
///
/// A lost public key is rebuilt from the private key. Only when the private
/// key is missing is a fresh pair generated and saved.
pub fn load_or_generate_keys(private_key: &Path, public_key: &Path) -> Result<KeyPair, KeyError> {
    if private_key.exists() {
        if public_key.exists() {
            return KeyPair::load_from_files(private_key, public_key);
        }

        let keypair = KeyPair::load_private_key(private_key)?;
        warn!(
            "Public key {} missing, rebuilt it from {}",
            public_key.display(),
            private_key.display()
        );
        keypair.save_to_files(private_key, public_key)?;
        return Ok(keypair);
    }

    if public_key.exists() {
        warn!(
            "Private key {} missing, replacing the orphaned public key {}",
            private_key.display(),
            public_key.display()
        );
    }

    let keypair = KeyPair::generate();
    keypair.save_to_files(private_key, public_key)?;
    info!(
        "Generated key pair {} ({}, {})",
        keypair.key_id(),
        private_key.display(),
        public_key.display()
    );
    Ok(keypair)
}

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "./image_vault.toml";

/// Environment variable prefix (`IMAGE_VAULT_PORT`, ...)
pub const ENV_PREFIX: &str = "IMAGE_VAULT_";

/// Vault server and tool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VaultConfig {
    /// Bind address
    pub bind_address: String,
    /// Port to listen on
    pub port: u16,
    /// Directory holding `.enc` containers and album subdirectories
    pub storage_dir: PathBuf,
    /// Static frontend directory
    pub public_dir: PathBuf,
    /// Maximum upload body in megabytes
    pub max_upload_mb: usize,
    /// Minimum passphrase length for new images
    pub min_passphrase_len: usize,
    /// Structured JSON logs instead of pretty output
    pub json_logs: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 3000,
            storage_dir: PathBuf::from("./encrypted"),
            public_dir: PathBuf::from("./public"),
            max_upload_mb: 50,
            min_passphrase_len: crate::storage::MIN_PASSPHRASE_LEN,
            json_logs: false,
        }
    }
}

/// Values given explicitly on the command line. Unset fields do not
/// override lower layers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_logs: Option<bool>,
}

impl VaultConfig {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (IMAGE_VAULT_*) < CLI args
    pub fn load(
        config_file: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, figment::Error> {
        Self::figment(config_file, overrides).extract()
    }

    fn figment(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Figment {
        let file = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        Figment::new()
            .merge(Serialized::defaults(VaultConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides))
    }

    /// Maximum upload body in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::adapters::Credential;
use crate::core::hasher::HashAlgorithm;
use crate::core::sizing::SizePolicy;
use crate::core::transfer_engine::CopyEngineType;

/// Fixed, well-known mount point for evidence containers on macOS
pub const DEFAULT_MOUNT_POINT: &str = "/Volumes/ForensicData";
/// Simulated mounts live inside the destination so attach and detach are
/// same-filesystem renames
pub const SIMULATED_MOUNT_DIR: &str = ".ForensicData";
const ENV_PREFIX: &str = "FSBC_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory for per-run log files
    pub log_directory: PathBuf,
    /// Override for the container mount point
    pub mount_point: Option<PathBuf>,
    pub hash_algorithm: HashAlgorithm,
    pub copy_engine: CopyEngineType,
    pub minimum_size_mb: u64,
    pub size_margin_percent: u32,
    /// Name of the environment variable holding the container passphrase
    pub passphrase_env: String,
    pub simulation: bool,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_directory: default_log_directory(),
            mount_point: None,
            hash_algorithm: HashAlgorithm::default(),
            copy_engine: CopyEngineType::default(),
            minimum_size_mb: SizePolicy::default().minimum_mb,
            size_margin_percent: SizePolicy::default().margin_percent,
            passphrase_env: "FSBC_PASSPHRASE".to_string(),
            simulation: false,
            verbose: false,
            json_logs: false,
        }
    }
}

fn default_log_directory() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("forensic_logs"))
        .unwrap_or_else(|| PathBuf::from("./forensic_logs"))
}

/// Default location of the config file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fsbc").join("config.toml"))
}

impl AppConfig {
    /// Layer defaults, the TOML file, `FSBC_*` environment variables and CLI
    /// overrides, in that order.
    pub fn new<T: Serialize>(config_file: Option<&Path>, overrides: Option<&T>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        match config_file {
            Some(path) => {
                if !path.is_file() {
                    bail!("Config file not found: {}", path.display());
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(path) = default_config_path() {
                    figment = figment.merge(Toml::file(path));
                }
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["passphrase"]));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let config: AppConfig = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.minimum_size_mb == 0 {
            bail!("minimum_size_mb must be at least 1");
        }
        if let Some(mount_point) = &self.mount_point {
            if !mount_point.is_absolute() {
                bail!(
                    "mount_point must be an absolute path, got {}",
                    mount_point.display()
                );
            }
        }
        Ok(())
    }

    /// Effective mount point for a run writing into `destination`.
    /// Simulated runs never touch `/Volumes`.
    pub fn mount_point(&self, destination: &Path) -> PathBuf {
        match &self.mount_point {
            Some(p) => p.clone(),
            None if self.simulation => destination.join(SIMULATED_MOUNT_DIR),
            None => PathBuf::from(DEFAULT_MOUNT_POINT),
        }
    }

    pub fn size_policy(&self) -> SizePolicy {
        SizePolicy {
            minimum_mb: self.minimum_size_mb,
            margin_percent: self.size_margin_percent,
        }
    }

    /// Passphrase from the configured environment variable, or an
    /// interactive prompt by the driver when it is unset.
    pub fn credential(&self) -> Credential {
        match std::env::var(&self.passphrase_env) {
            Ok(p) if !p.is_empty() => Credential::Passphrase(p),
            _ => Credential::Interactive,
        }
    }
}

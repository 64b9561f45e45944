// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support.
//!
//! `xev.toml` is looked up in this order:
//! 1. Path given via `--config`
//! 2. `./xev.toml`
//! 3. `~/.config/xev/xev.toml`
//! 4. `/etc/xev/xev.toml`
//!
//! Every section and field has a default, so an absent file is a valid
//! configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity and site settings.
    pub general: GeneralConfig,
    /// xPL network settings.
    pub xpl: XplConfig,
    /// Admin TCP listener.
    pub admin: AdminConfig,
    /// Persistent state file.
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Instance id of the hosted xPL service.
    pub instance: String,
    /// Vendor component of the service tag.
    pub vendor: String,
    /// Device component of the service tag.
    pub device: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: Option<String>,
    /// Site latitude for the astronomical scheduler (decimal degrees).
    pub latitude: Option<f64>,
    /// Site longitude (decimal degrees, east positive).
    pub longitude: Option<f64>,
    /// Abort the daemon on script parse or run errors.
    pub exit_on_error: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            instance: "main".to_string(),
            vendor: "xev".to_string(),
            device: "event".to_string(),
            log_level: None,
            latitude: None,
            longitude: None,
            exit_on_error: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct XplConfig {
    /// Local interface address to bind and advertise.
    pub ip: IpAddr,
    /// Broadcast destination address.
    pub broadcast: IpAddr,
    /// xPL UDP port.
    pub port: u16,
    /// Confirmed-state heartbeat interval, seconds.
    pub heartbeat_interval: u32,
    /// Include the daemon version in heartbeats.
    pub advertise_version: bool,
}

impl Default for XplConfig {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            broadcast: IpAddr::V4(Ipv4Addr::BROADCAST),
            port: 3865,
            heartbeat_interval: 300,
            advertise_version: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Accept admin connections at all.
    pub enabled: bool,
    /// Admin listener address.
    pub listen: IpAddr,
    /// Admin listener port.
    pub port: u16,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 1130,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the state file.
    pub path: PathBuf,
    /// Backoff between store write retries, milliseconds.
    pub backoff_ms: u64,
    /// Write attempts before a store call fails.
    pub max_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./xev-state.json"),
            backoff_ms: 25,
            max_retries: 10,
        }
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Walk the default search paths; all-defaults when nothing is found.
    pub fn load_from_default_paths() -> Result<(Config, Option<PathBuf>), ConfigError> {
        let mut candidates = vec![PathBuf::from("./xev.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("xev").join("xev.toml"));
        }
        candidates.push(PathBuf::from("/etc/xev/xev.toml"));

        for path in candidates {
            if path.is_file() {
                let cfg = Self::load_from_file(&path)?;
                return Ok((cfg, Some(path)));
            }
        }
        Ok((Config::default(), None))
    }

    /// Render the default configuration as an annotated example.
    pub fn example_toml() -> String {
        let body = toml::to_string_pretty(&Config::default())
            .unwrap_or_else(|_| unreachable!("default config always serializes"));
        format!("# xev example configuration\n\n{body}")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_component("general.vendor", &self.general.vendor, 8)?;
        check_component("general.device", &self.general.device, 8)?;
        check_component("general.instance", &self.general.instance, 16)?;

        if self.xpl.port == 0 {
            return Err(ConfigError::Invalid("xpl.port must be nonzero".into()));
        }
        if self.xpl.heartbeat_interval == 0 || self.xpl.heartbeat_interval > 172_800 {
            return Err(ConfigError::Invalid(
                "xpl.heartbeat_interval must be within 1..=172800 seconds".into(),
            ));
        }

        match (self.general.latitude, self.general.longitude) {
            (None, None) => {}
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) {
                    return Err(ConfigError::Invalid(
                        "general.latitude out of range".into(),
                    ));
                }
                if !(-180.0..=180.0).contains(&lon) {
                    return Err(ConfigError::Invalid(
                        "general.longitude out of range".into(),
                    ));
                }
            }
            _ => {
                return Err(ConfigError::Invalid(
                    "general.latitude and general.longitude must be set together".into(),
                ));
            }
        }

        if self.store.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "store.max_retries must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn check_component(what: &str, value: &str, max: usize) -> Result<(), ConfigError> {
    if value.is_empty() || value.len() > max {
        return Err(ConfigError::Invalid(format!(
            "{what} must be 1..={max} characters"
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ConfigError::Invalid(format!(
            "{what} may only contain ASCII letters, digits, and '_'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn example_toml_parses_back() {
        let example = Config::example_toml();
        let cfg: Config = toml::from_str(&example).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.xpl.port, 3865);
        assert_eq!(cfg.admin.port, 1130);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: Config = toml::from_str(
            "[general]\ninstance = \"den\"\n\n[xpl]\nip = \"192.168.1.10\"\n",
        )
        .unwrap();
        assert_eq!(cfg.general.instance, "den");
        assert_eq!(cfg.general.vendor, "xev");
        assert_eq!(cfg.xpl.ip.to_string(), "192.168.1.10");
        assert_eq!(cfg.xpl.port, 3865);
    }

    #[test]
    fn rejects_oversize_vendor() {
        let mut cfg = Config::default();
        cfg.general.vendor = "waytoolongvendor".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_half_configured_site() {
        let mut cfg = Config::default();
        cfg.general.latitude = Some(33.0);
        assert!(cfg.validate().is_err());
        cfg.general.longitude = Some(-117.0);
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_bad_heartbeat_interval() {
        let mut cfg = Config::default();
        cfg.xpl.heartbeat_interval = 0;
        assert!(cfg.validate().is_err());
        cfg.xpl.heartbeat_interval = 200_000;
        assert!(cfg.validate().is_err());
    }
}

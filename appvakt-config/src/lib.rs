//! # Appvakt Configuration System
//!
//! Hierarchical configuration for the access controller plus the durable
//! blocked-set store.
//!
//! ## Features
//! - **Unified Configuration**: one document covering controller and driver
//!   knobs
//! - **Validation**: runtime validation of every critical parameter
//! - **Environment Awareness**: `APPVAKT_*` variables override files

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod controller;
mod error;
mod firewall;
mod registry;
mod validation;

pub use controller::ControllerConfig;
pub use error::ConfigError;
pub use firewall::FirewallConfig;
pub use registry::JsonBlockedSetStore;

/// Top-level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default)]
pub struct AppvaktConfig {
    /// Reconciliation cadence and listing behavior.
    #[validate(nested)]
    pub controller: ControllerConfig,

    /// Firewall driver parameters (chain name, rule prefix, timeouts).
    #[validate(nested)]
    pub firewall: FirewallConfig,
}

impl AppvaktConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/appvakt.yaml` - base settings. If missing, defaults are used.
    /// 3. `APPVAKT_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(AppvaktConfig::default()));

        if Path::new("config/appvakt.yaml").exists() {
            figment = figment.merge(Yaml::file("config/appvakt.yaml"));
        }

        figment
            .merge(Env::prefixed("APPVAKT_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }

    /// Load configuration from a specific path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        Figment::from(Serialized::defaults(AppvaktConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("APPVAKT_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}

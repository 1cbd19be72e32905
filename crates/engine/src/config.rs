// TPD - Test Plan Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Debugger configuration.
//!
//! Configuration is read from a TOML file, either the one named by
//! [`TPD_CONFIG`](tpd_common::env::TPD_CONFIG) or `tpd/debugger.toml` under
//! the platform configuration directory, and then adjusted by environment
//! overrides. Every field has a default, so a partial file is valid.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use tpd_common::env::{TPD_CONFIG, TPD_LOOPS, TPD_PAUSE_ON_START};
use tracing::debug;

use crate::ConfigError;

/// Options of a [`Debugger`](crate::Debugger)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Iterations forced on the selected thread group
    pub loops: u32,
    /// Pause before the first unit
    pub pause_on_start: bool,
    /// Deliver `status_refresh` after every `frozen_at`
    pub refresh_on_pause: bool,
    /// Name of the worker thread
    pub worker_name: String,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            loops: 1,
            pause_on_start: false,
            refresh_on_pause: true,
            worker_name: "tpd-debugger".to_string(),
        }
    }
}

impl DebuggerConfig {
    /// Set the number of iterations of the selected thread group
    pub fn with_loops(mut self, loops: u32) -> Self {
        self.loops = loops;
        self
    }

    /// Pause before the first unit
    pub fn with_pause_on_start(mut self, pause_on_start: bool) -> Self {
        self.pause_on_start = pause_on_start;
        self
    }

    /// Deliver `status_refresh` after every pause
    pub fn with_refresh_on_pause(mut self, refresh_on_pause: bool) -> Self {
        self.refresh_on_pause = refresh_on_pause;
        self
    }

    /// Set the worker thread name
    pub fn with_worker_name(mut self, worker_name: impl Into<String>) -> Self {
        self.worker_name = worker_name.into();
        self
    }

    /// Default location of the configuration file, if the platform has a
    /// configuration directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tpd").join("debugger.toml"))
    }

    /// Read and validate a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as TOML: {}", path.display()))?;
        config.validate()?;

        debug!("Loaded debugger configuration from {}", path.display());
        Ok(config)
    }

    /// Load the configuration file, if any, then apply environment overrides.
    ///
    /// A file named by `TPD_CONFIG` must exist; a missing default file falls
    /// back to the defaults.
    pub fn load() -> Result<Self> {
        let config = match env::var_os(TPD_CONFIG) {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None => match Self::default_path().filter(|path| path.is_file()) {
                Some(path) => Self::from_file(path)?,
                None => Self::default(),
            },
        };

        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TPD_LOOPS` and `TPD_PAUSE_ON_START` when set.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(value) = env::var(TPD_LOOPS) {
            self.loops = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { var: TPD_LOOPS, value: value.clone() })?;
        }
        if let Ok(value) = env::var(TPD_PAUSE_ON_START) {
            self.pause_on_start = parse_flag(&value)
                .ok_or(ConfigError::InvalidEnv { var: TPD_PAUSE_ON_START, value: value.clone() })?;
        }
        Ok(self)
    }

    /// Check the values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loops == 0 {
            return Err(ConfigError::ZeroLoops);
        }
        if self.worker_name.trim().is_empty() {
            return Err(ConfigError::EmptyWorkerName);
        }
        Ok(())
    }

    /// Write the configuration as TOML, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        debug!("Saved debugger configuration to {}", path.display());
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

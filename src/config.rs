// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Configuration file handling.
//!
//! Reads the threshold tables from TOML. Default path:
//! `/etc/default/argonone.toml`, overridable with the `CONFIG_FILE`
//! environment variable or the `--config` flag.
//!
//! ```toml
//! [cpu_temp]
//! enabled = true
//! fan_speed = { 55 = 10, 60 = 55, 65 = 100 }
//!
//! [hdd_temp]
//! enabled = true
//! fan_speed = { 35 = 25, 40 = 50, 45 = 100 }
//! ```

use crate::threshold::ThresholdTable;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/default/argonone.toml";

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "CONFIG_FILE";

/// Section name for processor temperature thresholds.
pub const CPU_SECTION: &str = "cpu_temp";

/// Section name for storage temperature thresholds.
pub const HDD_SECTION: &str = "hdd_temp";

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Config {
    /// Processor temperature source.
    pub cpu_temp: TempSection,

    /// Storage temperature source.
    pub hdd_temp: TempSection,
}

/// One temperature source: whether it is monitored and its threshold table.
///
/// The default (`enabled = false`, empty table) stands in for any section
/// that is missing or malformed.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TempSection {
    pub enabled: bool,
    pub fan_speed: ThresholdTable,
}

impl TempSection {
    /// Normalize a raw TOML section.
    ///
    /// Returns the disabled default unless the section is a table with
    /// `enabled = true` and a `fan_speed` table whose every key and value
    /// parses as a number.
    pub fn normalize(name: &str, raw: Option<&Value>) -> Self {
        let Some(section) = raw else {
            log::info!("No [{name}] section, {name} monitoring disabled");
            return Self::default();
        };
        let Some(section) = section.as_table() else {
            log::warn!("[{name}] is not a table, {name} monitoring disabled");
            return Self::default();
        };

        if section.get("enabled").and_then(Value::as_bool) != Some(true) {
            log::info!("{name} monitoring disabled in config");
            return Self::default();
        }

        let Some(speeds) = section.get("fan_speed").and_then(Value::as_table) else {
            log::warn!("[{name}] has no fan_speed table, {name} monitoring disabled");
            return Self::default();
        };

        let mut pairs = Vec::with_capacity(speeds.len());
        for (key, value) in speeds {
            let Some(temp_c) = parse_temperature(key) else {
                log::warn!("[{name}] invalid temperature {key:?}, {name} monitoring disabled");
                return Self::default();
            };
            let Some(speed) = parse_speed(value) else {
                log::warn!("[{name}] invalid speed {value} for {key}, {name} monitoring disabled");
                return Self::default();
            };
            pairs.push((temp_c, speed));
        }

        Self {
            enabled: true,
            fan_speed: ThresholdTable::from_pairs(pairs),
        }
    }

    /// Enabled and has at least one threshold.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.fan_speed.is_empty()
    }
}

impl Config {
    /// Build a normalized config from a parsed TOML document.
    pub fn from_table(doc: &Table) -> Self {
        Self {
            cpu_temp: TempSection::normalize(CPU_SECTION, doc.get(CPU_SECTION)),
            hdd_temp: TempSection::normalize(HDD_SECTION, doc.get(HDD_SECTION)),
        }
    }

    /// Parse and normalize a TOML string.
    pub fn parse(contents: &str) -> io::Result<Self> {
        let doc: Table = toml::from_str(contents).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to parse config: {e}"),
            )
        })?;
        Ok(Self::from_table(&doc))
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load config from a TOML file.
///
/// Unlike section-level problems, an unreadable or unparsable file is an
/// error: the daemon must not run without a config.
pub fn load_config(path: &Path) -> io::Result<Config> {
    let contents = fs::read_to_string(path)?;
    let config = Config::parse(&contents)?;
    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Resolve the config file path from the CLI arg (or `CONFIG_FILE`, which
/// the CLI declares as its fallback), or the default. Empty paths are ignored.
pub fn resolve_config_path(cli_path: Option<&str>) -> PathBuf {
    cli_path
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_temperature(key: &str) -> Option<f64> {
    key.trim().parse::<f64>().ok().filter(|t| t.is_finite())
}

fn parse_speed(value: &Value) -> Option<i32> {
    match value {
        Value::Integer(i) => i32::try_from(*i).ok(),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    }
}

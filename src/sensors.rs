// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Temperature sources.
//!
//! The processor temperature comes from the kernel thermal zone. Storage
//! temperature comes from SMART data, one `smartctl` call per disk, with the
//! disks discovered through `lsblk`.
//!
//! Every read failure turns into a 0.0 reading, which the threshold tables
//! map to "fan off". A broken sensor therefore looks cold.
// TODO: add an opt-in fail-safe mode that maps unreadable sensors to full speed.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Kernel thermal zone for the SoC, in millidegrees Celsius.
pub const CPU_TEMP_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

pub const LSBLK_PATH: &str = "/usr/bin/lsblk";
pub const SMARTCTL_PATH: &str = "/usr/sbin/smartctl";

/// SMART attribute carrying the drive temperature.
const SMART_TEMP_ATTRIBUTE: &str = "Temperature_Celsius";

/// Zero-based column of the raw value in `smartctl -A` attribute rows.
const SMART_RAW_VALUE_COLUMN: usize = 9;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Something that yields a temperature in degrees Celsius.
#[async_trait]
pub trait TemperatureSensor: Send + Sync {
    /// Current reading. Never fails; unreadable sensors report 0.0.
    async fn read_celsius(&self) -> f64;
}

/// Discovers the storage devices whose temperature should be monitored.
#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    /// Device names such as `sda`, or `None` when enumeration is impossible
    /// or finds nothing.
    async fn list_devices(&self) -> Option<Vec<String>>;
}

/// Reads the diagnostic temperature of one storage device.
#[async_trait]
pub trait DiagnosticTemperatureReader: Send + Sync {
    async fn read_temperature(&self, device: &str) -> io::Result<f64>;
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// A sysfs thermal zone.
#[derive(Debug, Clone)]
pub struct ThermalZone {
    path: PathBuf,
}

impl ThermalZone {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ThermalZone {
    fn default() -> Self {
        Self::new(CPU_TEMP_PATH)
    }
}

#[async_trait]
impl TemperatureSensor for ThermalZone {
    async fn read_celsius(&self) -> f64 {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => match s.trim().parse::<f64>() {
                Ok(millic) => millic / 1000.0,
                Err(e) => {
                    log::warn!("Bad reading in {}: {e}, assuming 0", self.path.display());
                    0.0
                }
            },
            Err(e) => {
                log::warn!("Cannot read {}: {e}, assuming 0", self.path.display());
                0.0
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Lists writable whole SATA/IDE disks with `lsblk`.
///
/// Reports nothing unless both `lsblk` and `smartctl` are installed, since
/// the disks would be unreadable anyway.
#[derive(Debug, Clone)]
pub struct Lsblk {
    lsblk: PathBuf,
    smartctl: PathBuf,
}

impl Lsblk {
    pub fn new(lsblk: impl Into<PathBuf>, smartctl: impl Into<PathBuf>) -> Self {
        Self {
            lsblk: lsblk.into(),
            smartctl: smartctl.into(),
        }
    }
}

impl Default for Lsblk {
    fn default() -> Self {
        Self::new(LSBLK_PATH, SMARTCTL_PATH)
    }
}

#[async_trait]
impl DeviceEnumerator for Lsblk {
    async fn list_devices(&self) -> Option<Vec<String>> {
        for tool in [&self.lsblk, &self.smartctl] {
            if !tool.exists() {
                log::info!("{} not found, storage monitoring unavailable", tool.display());
                return None;
            }
        }

        let output = Command::new(&self.lsblk)
            .args(["--nodeps", "--noheadings", "--output", "NAME,RO,TYPE"])
            .output()
            .await;
        let output = match output {
            Ok(o) => o,
            Err(e) => {
                log::warn!("Failed to run {}: {e}", self.lsblk.display());
                return None;
            }
        };

        let devices = parse_lsblk(&String::from_utf8_lossy(&output.stdout));
        if devices.is_empty() {
            log::info!("No disks found, storage monitoring unavailable");
            None
        } else {
            log::info!("Monitoring disks: {}", devices.join(", "));
            Some(devices)
        }
    }
}

/// Reads SMART temperatures with `smartctl -d sat -A`.
#[derive(Debug, Clone)]
pub struct Smartctl {
    path: PathBuf,
}

impl Smartctl {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for Smartctl {
    fn default() -> Self {
        Self::new(SMARTCTL_PATH)
    }
}

#[async_trait]
impl DiagnosticTemperatureReader for Smartctl {
    async fn read_temperature(&self, device: &str) -> io::Result<f64> {
        let dev_path = Path::new("/dev").join(device);
        let output = Command::new(&self.path)
            .arg("-d")
            .arg("sat")
            .arg("-A")
            .arg(&dev_path)
            .output()
            .await?;

        parse_smart_temperature(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("No {SMART_TEMP_ATTRIBUTE} attribute for {}", dev_path.display()),
            )
        })
    }
}

/// Hottest of a fixed set of disks.
pub struct StorageTemperature {
    devices: Vec<String>,
    reader: Box<dyn DiagnosticTemperatureReader>,
}

impl StorageTemperature {
    pub fn new(devices: Vec<String>, reader: Box<dyn DiagnosticTemperatureReader>) -> Self {
        Self { devices, reader }
    }

    pub fn devices(&self) -> &[String] {
        &self.devices
    }
}

#[async_trait]
impl TemperatureSensor for StorageTemperature {
    /// Maximum over all disks. A failure on any disk makes the whole
    /// reading 0.0.
    async fn read_celsius(&self) -> f64 {
        let mut hottest = 0.0_f64;
        for device in &self.devices {
            match self.reader.read_temperature(device).await {
                Ok(temp) => hottest = hottest.max(temp),
                Err(e) => {
                    log::warn!("Cannot read temperature of {device}: {e}, assuming 0");
                    return 0.0;
                }
            }
        }
        hottest
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Pick `sd*`/`hd*` rows that are writable whole disks from
/// `lsblk -dn -o NAME,RO,TYPE` output.
fn parse_lsblk(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let (name, ro, kind) = (cols.next()?, cols.next()?, cols.next()?);
            let is_sata_or_ide = name.starts_with("sd") || name.starts_with("hd");
            (is_sata_or_ide && ro == "0" && kind == "disk").then(|| name.to_string())
        })
        .collect()
}

/// Raw value of the temperature attribute row in `smartctl -A` output.
fn parse_smart_temperature(output: &str) -> Option<f64> {
    output
        .lines()
        .find(|line| line.contains(SMART_TEMP_ATTRIBUTE))?
        .split_whitespace()
        .nth(SMART_RAW_VALUE_COLUMN)?
        .parse()
        .ok()
}

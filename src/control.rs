// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! The fan control loop.
//!
//! Each iteration samples every enabled temperature source, takes the
//! highest target speed, and applies it through the fan.
//!
//! Hysteresis is asymmetric: when the target is at or below the current
//! speed the loop first waits [`COOLDOWN`], so rises are applied at once
//! while drops (and no-ops) are debounced. Every change is preceded by a
//! full-speed pulse so a stopped fan reliably starts even at a low target.
//!
//! ```text
//!  ┌──► sample, target = max over sources
//!  │        │                          │
//!  │   target <= previous        rise, or first pass
//!  │        │                          │
//!  │   wait COOLDOWN                   │
//!  │        │                          │
//!  │   target == previous? ──no──►  pulse 100%, set target
//!  │        │ yes                      │
//!  │        │                     wait COOLDOWN
//!  └────────┴──────────────────────────┘
//! ```
//!
//! A stop request ends any wait immediately. The loop then always turns
//! the fan off before returning.

use crate::config::TempSection;
use crate::fan::{Fan, MAX_SPEED};
use crate::sensors::{
    DeviceEnumerator, Smartctl, StorageTemperature, TemperatureSensor, ThermalZone,
};
use crate::sleep_unless_stopped;
use crate::threshold::ThresholdTable;
use std::io;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Debounce before accepting a flat or falling target, and pause after
/// every change.
pub const COOLDOWN: Duration = Duration::from_secs(30);

/// A temperature sensor paired with its threshold table.
pub struct Source {
    name: &'static str,
    sensor: Box<dyn TemperatureSensor>,
    table: ThresholdTable,
}

impl Source {
    pub fn new(
        name: &'static str,
        sensor: Box<dyn TemperatureSensor>,
        table: ThresholdTable,
    ) -> Self {
        Self {
            name,
            sensor,
            table,
        }
    }

    /// Processor source from the `cpu_temp` section, `None` when disabled.
    pub fn cpu(section: &TempSection) -> Option<Self> {
        section.is_active().then(|| {
            Self::new("cpu", Box::new(ThermalZone::default()), section.fan_speed.clone())
        })
    }

    /// Storage source from the `hdd_temp` section.
    ///
    /// `None` when the section is disabled or no disks can be enumerated.
    pub async fn storage(
        section: &TempSection,
        enumerator: &dyn DeviceEnumerator,
    ) -> Option<Self> {
        if !section.is_active() {
            return None;
        }
        let devices = enumerator.list_devices().await?;
        let sensor = StorageTemperature::new(devices, Box::new(Smartctl::default()));
        Some(Self::new("storage", Box::new(sensor), section.fan_speed.clone()))
    }

    async fn target_speed(&self) -> i32 {
        let temp_c = self.sensor.read_celsius().await;
        let speed = self.table.evaluate(temp_c);
        log::debug!("{}: {temp_c:.1}°C -> {speed}%", self.name);
        speed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// The enabled temperature sources. A `None` source contributes 0.
struct Sources {
    cpu: Option<Source>,
    storage: Option<Source>,
}

impl Sources {
    async fn target_speed(&self) -> i32 {
        let mut target = 0;
        for source in [&self.cpu, &self.storage].into_iter().flatten() {
            target = target.max(source.target_speed().await);
        }
        target
    }
}

/// Owns the fan and all mutable control state for one daemon run.
pub struct ControlLoop {
    fan: Fan,
    sources: Sources,
    /// Last speed sent to the fan. `None` until the first change, and again
    /// after a failed write so the next iteration retries.
    previous_speed: Option<i32>,
}

impl ControlLoop {
    /// Build a loop. A `None` source is disabled and contributes 0.
    pub fn new(fan: Fan, cpu: Option<Source>, storage: Option<Source>) -> Self {
        Self {
            fan,
            sources: Sources { cpu, storage },
            previous_speed: None,
        }
    }

    /// Highest target speed across the enabled sources.
    pub async fn target_speed(&self) -> i32 {
        self.sources.target_speed().await
    }

    /// Run until `stop` is cancelled, then turn the fan off.
    pub async fn run(mut self, stop: CancellationToken) {
        log::info!(
            "Fan control started (cpu: {}, storage: {}, bus: {})",
            enabled(&self.sources.cpu),
            enabled(&self.sources.storage),
            if self.fan.has_bus() { "present" } else { "absent" },
        );

        let mut state = LoopState::Running;
        while state == LoopState::Running && !stop.is_cancelled() {
            state = self.step(&stop).await;
        }

        if let Err(e) = self.fan.turn_off(&stop).await {
            log::error!("Failed to turn fan off: {e}");
        }
        log::info!("Fan control stopped, fan off");
    }

    async fn step(&mut self, stop: &CancellationToken) -> LoopState {
        // Borrow only the sources across the await; the bus is not Sync.
        let target = self.sources.target_speed().await;

        if self.previous_speed.is_some_and(|prev| prev >= target)
            && sleep_unless_stopped(stop, COOLDOWN).await
        {
            return LoopState::Stopped;
        }

        if self.previous_speed == Some(target) {
            return LoopState::Running;
        }

        match self.previous_speed {
            Some(prev) => log::info!("Fan speed {prev}% -> {target}%"),
            None => log::info!("Fan speed -> {target}%"),
        }
        self.previous_speed = Some(target);

        if let Err(e) = self.apply(target, stop).await {
            log::error!("Failed to set fan speed to {target}%: {e}");
            self.previous_speed = None;
        }

        if sleep_unless_stopped(stop, COOLDOWN).await {
            LoopState::Stopped
        } else {
            LoopState::Running
        }
    }

    /// Spin-up pulse at full speed, then the real target.
    async fn apply(&mut self, target: i32, stop: &CancellationToken) -> io::Result<()> {
        self.fan.set_speed(MAX_SPEED, stop).await?;
        if stop.is_cancelled() {
            return Ok(());
        }
        self.fan.set_speed(target, stop).await
    }
}

fn enabled(source: &Option<Source>) -> &'static str {
    if source.is_some() { "on" } else { "off" }
}

// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! In-memory stand-ins for the fan controller and temperature sensors.

use crate::bus::FanBus;
use crate::sensors::TemperatureSensor;
use async_trait::async_trait;
use std::io;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// A transaction observed by [`RecordingBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusWrite {
    Byte(u8),
    Register(u8, u8),
}

/// Shared, timestamped record of bus write attempts, failed ones included.
#[derive(Debug, Clone)]
pub struct BusLog {
    start: Instant,
    writes: Arc<Mutex<Vec<(u64, BusWrite)>>>,
}

impl BusLog {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn push(&self, write: BusWrite) {
        let secs = self.start.elapsed().as_secs();
        self.writes.lock().unwrap().push((secs, write));
    }

    pub fn writes(&self) -> Vec<BusWrite> {
        self.writes.lock().unwrap().iter().map(|(_, w)| *w).collect()
    }

    /// Writes paired with whole seconds since the bus was created.
    pub fn timed_writes(&self) -> Vec<(u64, BusWrite)> {
        self.writes.lock().unwrap().clone()
    }
}

/// Fake fan controller that records every write.
#[derive(Debug)]
pub struct RecordingBus {
    log: BusLog,
    register: Option<u8>,
    ignore_register_writes: bool,
    fail_writes: bool,
}

impl RecordingBus {
    /// Controller with a working duty-cycle register holding `value`.
    pub fn with_register(value: u8) -> Self {
        Self {
            log: BusLog::new(),
            register: Some(value),
            ignore_register_writes: false,
            fail_writes: false,
        }
    }

    /// Legacy controller: register reads fail.
    pub fn failing_reads() -> Self {
        Self {
            register: None,
            ..Self::with_register(0)
        }
    }

    /// Register reads succeed but writes never change the value.
    pub fn ignoring_register_writes(mut self) -> Self {
        self.ignore_register_writes = true;
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn log(&self) -> BusLog {
        self.log.clone()
    }

    fn check_write(&self) -> io::Result<()> {
        if self.fail_writes {
            Err(io::Error::other("bus write failed"))
        } else {
            Ok(())
        }
    }
}

impl FanBus for RecordingBus {
    fn write_byte(&mut self, value: u8) -> io::Result<()> {
        self.log.push(BusWrite::Byte(value));
        self.check_write()
    }

    fn write_register(&mut self, register: u8, value: u8) -> io::Result<()> {
        self.log.push(BusWrite::Register(register, value));
        self.check_write()?;
        if !self.ignore_register_writes && self.register.is_some() {
            self.register = Some(value);
        }
        Ok(())
    }

    fn read_register(&mut self, _register: u8) -> io::Result<u8> {
        self.register.ok_or_else(|| io::Error::other("register read failed"))
    }
}

/// Sensor that returns a fixed sequence of readings, repeating the last one.
#[derive(Debug)]
pub struct ScriptedSensor {
    readings: Vec<f64>,
    next: Mutex<usize>,
}

impl ScriptedSensor {
    pub fn new(readings: Vec<f64>) -> Self {
        Self {
            readings,
            next: Mutex::new(0),
        }
    }
}

#[async_trait]
impl TemperatureSensor for ScriptedSensor {
    async fn read_celsius(&self) -> f64 {
        let mut next = self.next.lock().unwrap();
        let reading = self
            .readings
            .get(*next)
            .or(self.readings.last())
            .copied()
            .unwrap_or(0.0);
        *next += 1;
        reading
    }
}

// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! I2C access to the fan controller and register-support detection.
//!
//! The Argon ONE fan MCU sits at address `0x1a`. Newer firmware exposes a
//! duty-cycle register at `0x80`; older firmware only understands a single
//! raw byte holding the speed percentage.

use crate::sleep_unless_stopped;
use rppal::i2c::I2c;
use std::io;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// I2C address of the fan controller.
pub const FAN_ADDRESS: u16 = 0x1a;

/// Duty-cycle register (0-100 percent).
pub const DUTY_CYCLE_REGISTER: u8 = 0x80;

/// Bus used by every board revision except the very first.
pub const DEFAULT_I2C_BUS: u8 = 1;

/// Bus used by first-revision boards.
pub const FALLBACK_I2C_BUS: u8 = 0;

/// Time the controller needs before a write is reflected (and before it
/// accepts the next command).
pub const SETTLE_TIME: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Bus abstraction
// ---------------------------------------------------------------------------

/// The three transactions the fan controller understands, all addressed to
/// [`FAN_ADDRESS`].
pub trait FanBus: Send {
    /// SMBus "send byte": a single raw byte with no register.
    fn write_byte(&mut self, value: u8) -> io::Result<()>;

    /// SMBus "write byte data".
    fn write_register(&mut self, register: u8, value: u8) -> io::Result<()>;

    /// SMBus "read byte data".
    fn read_register(&mut self, register: u8) -> io::Result<u8>;
}

/// Which command set the controller accepts. Detected once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Speed written to [`DUTY_CYCLE_REGISTER`].
    Register,
    /// Speed sent as a raw byte.
    Legacy,
}

// ---------------------------------------------------------------------------
// Linux i2c-dev
// ---------------------------------------------------------------------------

/// The fan controller on a Linux i2c-dev bus.
pub struct I2cBus {
    i2c: I2c,
}

impl I2cBus {
    /// Open the bus wired to the GPIO header for this board revision.
    pub fn open_default() -> io::Result<Self> {
        Self::bind(I2c::new().map_err(io::Error::other)?)
    }

    /// Open `/dev/i2c-<bus>`.
    pub fn open(bus: u8) -> io::Result<Self> {
        Self::bind(I2c::with_bus(bus).map_err(io::Error::other)?)
    }

    fn bind(mut i2c: I2c) -> io::Result<Self> {
        i2c.set_slave_address(FAN_ADDRESS).map_err(io::Error::other)?;
        Ok(Self { i2c })
    }
}

impl FanBus for I2cBus {
    fn write_byte(&mut self, value: u8) -> io::Result<()> {
        self.i2c.smbus_send_byte(value).map_err(io::Error::other)
    }

    fn write_register(&mut self, register: u8, value: u8) -> io::Result<()> {
        self.i2c.smbus_write_byte(register, value).map_err(io::Error::other)
    }

    fn read_register(&mut self, register: u8) -> io::Result<u8> {
        self.i2c.smbus_read_byte(register).map_err(io::Error::other)
    }
}

/// Open the fan bus.
///
/// With an explicit `bus` number only that bus is tried. Otherwise the bus
/// is picked from the board revision, then [`DEFAULT_I2C_BUS`] and
/// [`FALLBACK_I2C_BUS`] are tried in turn. Returns `None` (and logs) when no
/// bus can be opened; the daemon then runs without actuating anything.
pub fn open_bus(bus: Option<u8>) -> Option<I2cBus> {
    if let Some(bus) = bus {
        return match I2cBus::open(bus) {
            Ok(b) => {
                log::info!("Opened fan controller on /dev/i2c-{bus}");
                Some(b)
            }
            Err(e) => {
                log::error!("Cannot open /dev/i2c-{bus}: {e}, running without fan control");
                None
            }
        };
    }

    match I2cBus::open_default() {
        Ok(b) => {
            log::info!("Opened fan controller on the board's default I2C bus");
            return Some(b);
        }
        Err(e) => log::debug!("Cannot open the board's default I2C bus: {e}"),
    }

    for bus in [DEFAULT_I2C_BUS, FALLBACK_I2C_BUS] {
        match I2cBus::open(bus) {
            Ok(b) => {
                log::info!("Opened fan controller on /dev/i2c-{bus}");
                return Some(b);
            }
            Err(e) => log::debug!("Cannot open /dev/i2c-{bus}: {e}"),
        }
    }

    log::error!("Cannot open an I2C bus for the fan controller, running without fan control");
    None
}

// ---------------------------------------------------------------------------
// Capability detection
// ---------------------------------------------------------------------------

/// Check whether the controller honours the duty-cycle register.
///
/// Reads the register, writes a nudged value, waits [`SETTLE_TIME`] and reads
/// it back. The register is supported only if the value changed. Any bus
/// error means [`Protocol::Legacy`]; nothing is propagated. The controller is
/// left at the nudged value.
pub async fn detect_protocol(bus: &mut dyn FanBus, stop: &CancellationToken) -> Protocol {
    match check_register(bus, stop).await {
        Ok(true) => {
            log::info!("Fan controller supports the duty-cycle register");
            Protocol::Register
        }
        Ok(false) => {
            log::info!("Duty-cycle register did not change, using legacy byte commands");
            Protocol::Legacy
        }
        Err(e) => {
            log::info!("Duty-cycle register not reachable ({e}), using legacy byte commands");
            Protocol::Legacy
        }
    }
}

async fn check_register(bus: &mut dyn FanBus, stop: &CancellationToken) -> io::Result<bool> {
    let before = bus.read_register(DUTY_CYCLE_REGISTER)?;
    bus.write_register(DUTY_CYCLE_REGISTER, nudged_value(before))?;
    sleep_unless_stopped(stop, SETTLE_TIME).await;
    let after = bus.read_register(DUTY_CYCLE_REGISTER)?;
    log::debug!("Duty-cycle check: {before} -> {after}");
    Ok(after != before)
}

/// One above the current value, or 98 when already at or past 100.
fn nudged_value(current: u8) -> u8 {
    if current < 100 { current + 1 } else { 98 }
}

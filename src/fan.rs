// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fan actuation.
//!
//! Translates a speed percentage into the command set the controller
//! understands. Without a bus every command is a silent no-op so the daemon
//! can run on a board with no case attached.

use crate::bus::{self, DUTY_CYCLE_REGISTER, FanBus, Protocol, SETTLE_TIME};
use crate::sleep_unless_stopped;
use std::io;
use tokio_util::sync::CancellationToken;

/// Lowest speed the controller accepts.
pub const MIN_SPEED: i32 = 0;

/// Highest speed the controller accepts.
pub const MAX_SPEED: i32 = 100;

/// The case fan: an optional bus plus the command set it speaks.
pub struct Fan {
    bus: Option<Box<dyn FanBus>>,
    protocol: Protocol,
}

impl Fan {
    pub fn new(bus: Option<Box<dyn FanBus>>, protocol: Protocol) -> Self {
        Self { bus, protocol }
    }

    /// A fan with no bus. Every command succeeds without doing anything.
    pub fn headless() -> Self {
        Self::new(None, Protocol::Legacy)
    }

    /// Take ownership of `bus` and detect which protocol it speaks.
    pub async fn detect(mut bus: Option<Box<dyn FanBus>>, stop: &CancellationToken) -> Self {
        let protocol = match bus.as_deref_mut() {
            Some(b) => bus::detect_protocol(b, stop).await,
            None => Protocol::Legacy,
        };
        Self::new(bus, protocol)
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn has_bus(&self) -> bool {
        self.bus.is_some()
    }

    /// Command the fan to `speed` percent, clamped to 0-100.
    ///
    /// Issues exactly one write followed by [`SETTLE_TIME`] of waiting (cut
    /// short if `stop` fires). Write failures are returned, not retried.
    pub async fn set_speed(&mut self, speed: i32, stop: &CancellationToken) -> io::Result<()> {
        let Some(bus) = self.bus.as_deref_mut() else {
            return Ok(());
        };

        let speed = clamp_speed(speed);
        match self.protocol {
            Protocol::Register => bus.write_register(DUTY_CYCLE_REGISTER, speed)?,
            Protocol::Legacy => bus.write_byte(speed)?,
        }
        log::debug!("Fan set to {speed}% ({:?})", self.protocol);

        sleep_unless_stopped(stop, SETTLE_TIME).await;
        Ok(())
    }

    pub async fn turn_off(&mut self, stop: &CancellationToken) -> io::Result<()> {
        self.set_speed(MIN_SPEED, stop).await
    }
}

/// Clamp a requested speed into the range the controller accepts.
pub fn clamp_speed(speed: i32) -> u8 {
    // Lossless: the value is within 0..=100 after clamping.
    speed.clamp(MIN_SPEED, MAX_SPEED) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{BusWrite, RecordingBus};
    use tokio::time::Instant;

    fn fan_with(bus: RecordingBus, protocol: Protocol) -> Fan {
        Fan::new(Some(Box::new(bus)), protocol)
    }

    #[test]
    fn test_clamp_speed() {
        assert_eq!(clamp_speed(-5), 0);
        assert_eq!(clamp_speed(0), 0);
        assert_eq!(clamp_speed(42), 42);
        assert_eq!(clamp_speed(100), 100);
        assert_eq!(clamp_speed(150), 100);
        assert_eq!(clamp_speed(i32::MIN), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_protocol_writes_duty_cycle() {
        let bus = RecordingBus::with_register(0);
        let log = bus.log();
        let mut fan = fan_with(bus, Protocol::Register);
        let stop = CancellationToken::new();

        let start = Instant::now();
        fan.set_speed(55, &stop).await.unwrap();
        assert_eq!(start.elapsed(), SETTLE_TIME);
        assert_eq!(log.writes(), vec![BusWrite::Register(DUTY_CYCLE_REGISTER, 55)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_protocol_writes_byte() {
        let bus = RecordingBus::failing_reads();
        let log = bus.log();
        let mut fan = fan_with(bus, Protocol::Legacy);
        let stop = CancellationToken::new();

        fan.set_speed(30, &stop).await.unwrap();
        fan.turn_off(&stop).await.unwrap();
        assert_eq!(log.writes(), vec![BusWrite::Byte(30), BusWrite::Byte(0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_is_clamped() {
        let bus = RecordingBus::failing_reads();
        let log = bus.log();
        let mut fan = fan_with(bus, Protocol::Legacy);
        let stop = CancellationToken::new();

        fan.set_speed(-5, &stop).await.unwrap();
        fan.set_speed(150, &stop).await.unwrap();
        assert_eq!(log.writes(), vec![BusWrite::Byte(0), BusWrite::Byte(100)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_headless_is_noop() {
        let mut fan = Fan::headless();
        let stop = CancellationToken::new();

        let start = Instant::now();
        fan.set_speed(150, &stop).await.unwrap();
        fan.turn_off(&stop).await.unwrap();
        assert_eq!(start.elapsed(), std::time::Duration::ZERO);
        assert!(!fan.has_bus());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_propagates() {
        let bus = RecordingBus::with_register(0).failing_writes();
        let mut fan = fan_with(bus, Protocol::Register);
        let stop = CancellationToken::new();
        assert!(fan.set_speed(50, &stop).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_cut_short_by_stop() {
        let bus = RecordingBus::failing_reads();
        let log = bus.log();
        let mut fan = fan_with(bus, Protocol::Legacy);
        let stop = CancellationToken::new();
        stop.cancel();

        let start = Instant::now();
        fan.set_speed(80, &stop).await.unwrap();
        assert_eq!(start.elapsed(), std::time::Duration::ZERO);
        assert_eq!(log.writes(), vec![BusWrite::Byte(80)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detect_picks_protocol() {
        let stop = CancellationToken::new();

        let fan = Fan::detect(Some(Box::new(RecordingBus::with_register(10))), &stop).await;
        assert_eq!(fan.protocol(), Protocol::Register);

        let fan = Fan::detect(Some(Box::new(RecordingBus::failing_reads())), &stop).await;
        assert_eq!(fan.protocol(), Protocol::Legacy);

        let fan = Fan::detect(None, &stop).await;
        assert_eq!(fan.protocol(), Protocol::Legacy);
        assert!(!fan.has_bus());
    }
}

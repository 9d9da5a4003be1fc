// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fan control engine for the Argon ONE case.
//!
//! Samples processor (and optionally storage) temperature, maps it to a fan
//! speed through threshold tables, and drives the case fan over I2C.

pub mod bus;
pub mod config;
pub mod control;
pub mod fan;
pub mod sensors;
pub mod threshold;

#[cfg(test)]
pub(crate) mod test_utils;

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleep for `duration` or until `stop` is cancelled, whichever is first.
///
/// Returns `true` if the wait was cut short by a stop request.
pub async fn sleep_unless_stopped(stop: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = stop.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

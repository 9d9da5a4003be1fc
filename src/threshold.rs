// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Temperature threshold tables.
//!
//! A table maps temperature thresholds (degrees Celsius) to fan speeds
//! (percent). Unlike an interpolated curve, lookup is a step function:
//! the speed of the highest threshold at or below the current temperature
//! wins, and anything below the lowest threshold yields 0.

use serde::Serialize;

/// A single step in a threshold table.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Threshold {
    /// Temperature in degrees Celsius at which this step engages
    pub temp_c: f64,
    /// Fan speed in percent. Not clamped here; the actuator clamps to 0-100.
    pub speed: i32,
}

/// Thresholds sorted by descending temperature, first match wins.
///
/// Built once from configuration and never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ThresholdTable {
    thresholds: Vec<Threshold>,
}

impl ThresholdTable {
    /// Build a table from `(temperature, speed)` pairs in configuration order.
    ///
    /// When the same temperature appears more than once, the last pair in
    /// input order wins. NaN temperatures are discarded since they can never
    /// match a reading.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (f64, i32)>,
    {
        let mut thresholds: Vec<Threshold> = Vec::new();

        for (temp_c, speed) in pairs {
            if temp_c.is_nan() {
                log::warn!("Ignoring threshold with NaN temperature");
                continue;
            }
            match thresholds.iter_mut().find(|t| t.temp_c == temp_c) {
                Some(existing) => existing.speed = speed,
                None => thresholds.push(Threshold { temp_c, speed }),
            }
        }

        thresholds.sort_by(|a, b| b.temp_c.total_cmp(&a.temp_c));
        Self { thresholds }
    }

    /// Map a temperature sample to a target speed.
    ///
    /// Returns the speed of the first (hottest) threshold whose temperature
    /// is at or below `temp_c`, or 0 if none matches.
    pub fn evaluate(&self, temp_c: f64) -> i32 {
        self.thresholds
            .iter()
            .find(|t| t.temp_c <= temp_c)
            .map(|t| t.speed)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    /// Thresholds in lookup order (descending temperature).
    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }
}

/// Speed evaluator: `table.evaluate(temp_c)` as a free function.
pub fn evaluate(temp_c: f64, table: &ThresholdTable) -> i32 {
    table.evaluate(temp_c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock_table() -> ThresholdTable {
        ThresholdTable::from_pairs([(55.0, 10), (60.0, 55), (65.0, 100)])
    }

    #[test]
    fn test_sorted_descending() {
        let table = stock_table();
        let temps: Vec<f64> = table.thresholds().iter().map(|t| t.temp_c).collect();
        assert_eq!(temps, vec![65.0, 60.0, 55.0]);
    }

    #[test]
    fn test_below_lowest_threshold() {
        assert_eq!(stock_table().evaluate(40.0), 0);
    }

    #[test]
    fn test_exact_threshold_matches() {
        let table = stock_table();
        assert_eq!(table.evaluate(55.0), 10);
        assert_eq!(table.evaluate(60.0), 55);
        assert_eq!(table.evaluate(65.0), 100);
    }

    #[test]
    fn test_between_thresholds_uses_lower_step() {
        let table = stock_table();
        assert_eq!(table.evaluate(59.9), 10);
        assert_eq!(table.evaluate(64.5), 55);
        assert_eq!(table.evaluate(90.0), 100);
    }

    #[test]
    fn test_empty_table() {
        let table = ThresholdTable::default();
        assert!(table.is_empty());
        assert_eq!(evaluate(100.0, &table), 0);
    }

    #[test]
    fn test_last_duplicate_wins() {
        let table = ThresholdTable::from_pairs([(50.0, 20), (60.0, 80), (50.0, 35)]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.evaluate(52.0), 35);
    }

    #[test]
    fn test_nan_threshold_dropped() {
        let table = ThresholdTable::from_pairs([(f64::NAN, 100), (40.0, 30)]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.evaluate(45.0), 30);
    }

    #[test]
    fn test_monotonic_for_non_crossing_table() {
        let table = stock_table();
        let mut last = 0;
        for tenth in 0..1000 {
            let speed = table.evaluate(tenth as f64 / 10.0);
            assert!(speed >= last, "speed dropped at {}", tenth as f64 / 10.0);
            last = speed;
        }
    }
}

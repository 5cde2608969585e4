//! Occupancy counting and snapshots.
//!
//! A table counts as occupied when the detector reports the occupied class
//! label for it. The label is a bare integer from the model's label list and
//! is not checked against the model; if the model's label order changes the
//! counts silently change meaning.

use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;

use crate::detect::DetectionResult;

/// Class label the trained model uses for an occupied table.
pub const OCCUPIED_CLASS_ID: u32 = 1;

/// Fixed-rule counter: occupied detections against a fixed table count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OccupancyRule {
    pub occupied_class_id: u32,
    pub total_tables: u32,
}

impl OccupancyRule {
    pub fn new(total_tables: u32) -> Self {
        Self {
            occupied_class_id: OCCUPIED_CLASS_ID,
            total_tables,
        }
    }

    pub fn with_occupied_class(mut self, class_id: u32) -> Self {
        self.occupied_class_id = class_id;
        self
    }

    /// Raw number of occupied detections (not yet clamped).
    pub fn count(&self, result: &DetectionResult) -> usize {
        result.count_class(self.occupied_class_id)
    }

    /// Clamp a raw count to the table total. Returns `(occupied, vacant)`.
    pub fn tally(&self, raw_occupied: usize) -> (u32, u32) {
        let occupied = u32::try_from(raw_occupied)
            .unwrap_or(u32::MAX)
            .min(self.total_tables);
        (occupied, self.total_tables - occupied)
    }
}

/// One reported occupancy tuple for a restaurant at a point in time.
#[derive(Clone, Debug, PartialEq)]
pub struct OccupancySnapshot {
    pub restaurant_id: String,
    pub occupied: u32,
    pub vacant: u32,
    pub total: u32,
    pub timestamp: DateTime<Local>,
}

/// Body of a local occupancy update.
#[derive(Debug, Serialize)]
pub struct OccupancyUpdate<'a> {
    pub restaurant_id: &'a str,
    pub occupied: u32,
    pub vacant: u32,
    pub total: u32,
}

/// Row inserted into the remote occupancy table.
#[derive(Debug, Serialize)]
pub struct OccupancyRow<'a> {
    pub restaurant_id: &'a str,
    pub occupied: u32,
    pub vacant: u32,
    pub total: u32,
    pub timestamp: String,
}

impl OccupancySnapshot {
    pub fn from_count(
        restaurant_id: &str,
        raw_occupied: usize,
        rule: &OccupancyRule,
        timestamp: DateTime<Local>,
    ) -> Self {
        let (occupied, vacant) = rule.tally(raw_occupied);
        Self {
            restaurant_id: restaurant_id.to_string(),
            occupied,
            vacant,
            total: rule.total_tables,
            timestamp,
        }
    }

    pub fn local_update(&self) -> OccupancyUpdate<'_> {
        OccupancyUpdate {
            restaurant_id: &self.restaurant_id,
            occupied: self.occupied,
            vacant: self.vacant,
            total: self.total,
        }
    }

    pub fn database_row(&self) -> OccupancyRow<'_> {
        OccupancyRow {
            restaurant_id: &self.restaurant_id,
            occupied: self.occupied,
            vacant: self.vacant,
            total: self.total,
            timestamp: self.iso_timestamp(),
        }
    }

    /// ISO-8601 timestamp with local offset and microsecond precision.
    pub fn iso_timestamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, false)
    }
}

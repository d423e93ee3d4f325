//! Per-sport matrix of time slots × courts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{BookingError, BookingResult};
use crate::store::SessionStore;

use super::ledger::SportDay;
use super::sport::SportConfig;
use super::types::CellState;

/// One time slot with the state of every court, stored as `{"time": .., "C1": .., ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRow {
    pub time: String,
    #[serde(flatten)]
    pub cells: BTreeMap<String, CellState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotGrid {
    rows: Vec<SlotRow>,
}

/// Number of free courts in one time slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotAvailability {
    pub time: String,
    pub available_courts: usize,
}

impl SlotGrid {
    /// All-available grid in the sport's canonical shape.
    pub fn fresh(sport: &SportConfig) -> Self {
        let rows = sport
            .time_slots
            .iter()
            .map(|time| SlotRow {
                time: time.clone(),
                cells: sport
                    .courts
                    .iter()
                    .map(|court| (court.key.clone(), CellState::Available))
                    .collect(),
            })
            .collect();
        Self { rows }
    }

    /// Persisted grid for `sport`, or a fresh one if nothing is stored yet.
    pub fn load(store: &dyn SessionStore, sport: &SportConfig) -> BookingResult<Self> {
        let (day, _) = SportDay::load(store, sport)?;
        Ok(day.grid)
    }

    pub fn rows(&self) -> &[SlotRow] {
        &self.rows
    }

    /// True if the rows and courts match `sport` exactly, in order.
    pub fn conforms_to(&self, sport: &SportConfig) -> bool {
        self.rows.len() == sport.time_slots.len()
            && self
                .rows
                .iter()
                .zip(&sport.time_slots)
                .all(|(row, time)| {
                    row.time == *time
                        && row.cells.len() == sport.courts.len()
                        && sport.courts.iter().all(|c| row.cells.contains_key(&c.key))
                })
    }

    fn row(&self, time: &str) -> BookingResult<&SlotRow> {
        self.rows
            .iter()
            .find(|row| row.time == time)
            .ok_or_else(|| BookingError::InvalidKey(format!("time slot {}", time)))
    }

    pub fn cell_state(&self, time: &str, court: &str) -> BookingResult<CellState> {
        self.row(time)?
            .cells
            .get(court)
            .copied()
            .ok_or_else(|| BookingError::InvalidKey(format!("court {}", court)))
    }

    /// Copy of this grid with exactly one cell set to `Booked`.
    pub fn set_booked(&self, time: &str, court: &str) -> BookingResult<Self> {
        self.cell_state(time, court)?;
        let mut next = self.clone();
        for row in next.rows.iter_mut().filter(|row| row.time == time) {
            row.cells.insert(court.to_string(), CellState::Booked);
        }
        Ok(next)
    }

    pub fn available_courts(&self, time: &str) -> BookingResult<usize> {
        Ok(self
            .row(time)?
            .cells
            .values()
            .filter(|state| **state == CellState::Available)
            .count())
    }

    pub fn availability(&self) -> Vec<SlotAvailability> {
        self.rows
            .iter()
            .map(|row| SlotAvailability {
                time: row.time.clone(),
                available_courts: row
                    .cells
                    .values()
                    .filter(|state| **state == CellState::Available)
                    .count(),
            })
            .collect()
    }

    pub fn booked_count(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|row| row.cells.values())
            .filter(|state| **state == CellState::Booked)
            .count()
    }
}

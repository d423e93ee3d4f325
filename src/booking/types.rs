use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A bookable court within one sport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Court {
    /// Stable key used in grids and requests, e.g. `C1`
    pub key: String,
    pub label: String,
}

impl Court {
    pub fn numbered(number: usize) -> Self {
        Self {
            key: format!("C{}", number),
            label: format!("Court {}", number),
        }
    }
}

/// Availability of a single (time slot, court) cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellState {
    Available,
    Booked,
}

/// Returned by a successful booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub reference: String,
    pub sport: String,
    pub court: String,
    pub time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Confirmed,
}

/// Entry in a user's append-only booking history. Display only, never used for conflict checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub reference: String,
    pub sport: String,
    pub court: String,
    pub time: String,
    pub status: BookingStatus,
    pub booked_at: DateTime<Local>,
}

impl BookingRecord {
    pub fn confirmed(confirmation: &Confirmation, booked_at: DateTime<Local>) -> Self {
        Self {
            reference: confirmation.reference.clone(),
            sport: confirmation.sport.clone(),
            court: confirmation.court.clone(),
            time: confirmation.time.clone(),
            status: BookingStatus::Confirmed,
            booked_at,
        }
    }
}

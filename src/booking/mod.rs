pub mod types;
pub mod slot_utils;
pub mod sport;
pub mod grid;
pub mod ledger;
pub mod reset;

pub use types::{BookingRecord, BookingStatus, CellState, Court};
pub use sport::{default_catalog, SportConfig};
pub use grid::{SlotAvailability, SlotGrid};
pub use ledger::BookingLedger;
pub use reset::{local_now, AutoResetConfig, PolicyState, ResetPolicy};

//! Claims cells on behalf of users and enforces the one-booking-per-sport-per-day cap.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Local, NaiveDateTime};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{BookingError, BookingResult, StoreError};
use crate::store::{load_json, save_json, update_json, SessionStore};

use super::grid::SlotGrid;
use super::reset::cleared_at;
use super::sport::SportConfig;
use super::types::{BookingRecord, CellState, Confirmation};

/// Retries of the compare-and-set after another writer committed first.
pub(crate) const MAX_CAS_RETRIES: u32 = 3;

/// Persisted per-sport state: the grid plus the identities that booked it today.
///
/// Kept in one document so a booking commits both with a single compare-and-set.
/// `epoch` is the reset this state was started after. State from before the latest
/// reset reads as fresh even if no writer has cleared it yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SportDay {
    pub grid: SlotGrid,
    pub booked: BTreeSet<String>,
    #[serde(default)]
    pub epoch: Option<NaiveDateTime>,
}

impl SportDay {
    pub fn fresh(sport: &SportConfig, epoch: Option<NaiveDateTime>) -> Self {
        Self {
            grid: SlotGrid::fresh(sport),
            booked: BTreeSet::new(),
            epoch,
        }
    }

    /// No bookings and no flags, whatever the epoch.
    pub fn is_clear(&self, sport: &SportConfig) -> bool {
        self.booked.is_empty() && self.grid == SlotGrid::fresh(sport)
    }

    /// Load the current state and its version (0 when nothing is stored).
    pub fn load(store: &dyn SessionStore, sport: &SportConfig) -> BookingResult<(Self, u64)> {
        let cleared_at = cleared_at(store)?;
        match load_json::<SportDay>(store, &sport.storage_key())? {
            Some((day, version)) if day.epoch < cleared_at => {
                Ok((Self::fresh(sport, cleared_at), version))
            }
            Some((day, version)) => {
                if !day.grid.conforms_to(sport) {
                    return Err(StoreError::Corrupted(format!(
                        "stored grid for {} does not match its courts and time slots",
                        sport.key
                    ))
                    .into());
                }
                Ok((day, version))
            }
            None => Ok((Self::fresh(sport, cleared_at), 0)),
        }
    }
}

pub fn history_key(identity: &str) -> String {
    format!("history/{}", identity)
}

fn new_reference() -> String {
    format!("BK-{:06X}", rand::thread_rng().gen_range(0..0x100_0000u32))
}

/// Owns the per-sport grids behind one store.
///
/// Construct once per process and share it; every mutation goes through `write_lock`.
pub struct BookingLedger {
    store: Arc<dyn SessionStore>,
    sports: Vec<SportConfig>,
    write_lock: Mutex<()>,
}

impl BookingLedger {
    pub fn new(store: Arc<dyn SessionStore>, sports: Vec<SportConfig>) -> Self {
        Self {
            store,
            sports,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    pub fn sports(&self) -> &[SportConfig] {
        &self.sports
    }

    pub fn sport(&self, key: &str) -> BookingResult<&SportConfig> {
        self.sports
            .iter()
            .find(|s| s.key == key)
            .ok_or_else(|| BookingError::InvalidKey(format!("sport {}", key)))
    }

    pub(crate) fn lock(&self) -> BookingResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| BookingError::Store(StoreError::LockPoisoned))
    }

    pub fn grid(&self, sport: &str) -> BookingResult<SlotGrid> {
        SlotGrid::load(self.store(), self.sport(sport)?)
    }

    pub fn has_booked_today(&self, sport: &str, identity: &str) -> BookingResult<bool> {
        let (day, _) = SportDay::load(self.store(), self.sport(sport)?)?;
        Ok(day.booked.contains(identity))
    }

    pub fn history(&self, identity: &str) -> BookingResult<Vec<BookingRecord>> {
        Ok(load_json::<Vec<BookingRecord>>(self.store(), &history_key(identity))?
            .map(|(records, _)| records)
            .unwrap_or_default())
    }

    /// Identities with at least one stored booking record, sorted.
    pub fn identities_with_history(&self) -> BookingResult<Vec<String>> {
        Ok(self
            .store()
            .keys(&history_key(""))?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&history_key("")).map(str::to_string))
            .collect())
    }

    /// Drop every booking record of `identity`. Grids and daily flags are untouched.
    pub fn purge_history(&self, identity: &str) -> BookingResult<usize> {
        let count = self.history(identity)?.len();
        self.store().remove(&history_key(identity))?;
        tracing::warn!("purged {} booking record(s) of {}", count, identity);
        Ok(count)
    }

    /// Claim the (`time`, `court`) cell of `sport_key` for `identity`.
    ///
    /// Checks run in order: daily cap, selection present, cell free. The grid and the
    /// daily flag commit together; a concurrent commit by another writer re-runs the checks.
    pub fn try_book(
        &self,
        sport_key: &str,
        identity: &str,
        time: &str,
        court: &str,
    ) -> BookingResult<Confirmation> {
        let sport = self.sport(sport_key)?;
        let time = time.trim();
        let court = court.trim();
        let key = sport.storage_key();

        let _guard = self.lock()?;
        let mut attempt = 0;
        loop {
            let (mut day, version) = SportDay::load(self.store(), sport)?;

            if day.booked.contains(identity) {
                return Err(BookingError::AlreadyBookedToday {
                    sport: sport.key.clone(),
                });
            }
            if time.is_empty() || court.is_empty() {
                return Err(BookingError::MissingSelection);
            }
            if day.grid.cell_state(time, court)? == CellState::Booked {
                return Err(BookingError::SlotTaken {
                    time: time.to_string(),
                    court: court.to_string(),
                });
            }

            day.grid = day.grid.set_booked(time, court)?;
            day.booked.insert(identity.to_string());

            match save_json(self.store(), &key, &day, Some(version)) {
                Ok(_) => break,
                Err(StoreError::VersionConflict { .. }) if attempt < MAX_CAS_RETRIES => {
                    attempt += 1;
                    tracing::warn!(
                        "{} changed while booking {} {} for {}, re-checking",
                        key,
                        time,
                        court,
                        identity
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        let confirmation = Confirmation {
            reference: new_reference(),
            sport: sport.key.clone(),
            court: court.to_string(),
            time: time.to_string(),
        };
        tracing::info!(
            "booked {} {} {} for {} ({})",
            confirmation.sport,
            confirmation.time,
            confirmation.court,
            identity,
            confirmation.reference
        );

        let record = BookingRecord::confirmed(&confirmation, Local::now());
        if let Err(e) = update_json(
            self.store(),
            &history_key(identity),
            |records: &mut Vec<BookingRecord>| records.push(record.clone()),
        ) {
            // The booking itself is committed at this point.
            tracing::error!(
                "failed to append history for {} ({}): {}",
                identity,
                confirmation.reference,
                e
            );
        }

        Ok(confirmation)
    }
}

//! Daily and manual reset of grids and daily booking flags.

use chrono::{Duration, Local, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{BookingError, BookingResult, StoreError, StoreResult};
use crate::store::{load_json, save_json, SessionStore};

use super::ledger::{BookingLedger, SportDay, MAX_CAS_RETRIES};

pub const AUTO_RESET_KEY: &str = "admin/auto_reset";
pub const LAST_RESET_KEY: &str = "admin/last_reset";

/// Admin-controlled schedule for the daily reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoResetConfig {
    pub enabled: bool,
    /// Wall-clock time of day, HH:MM
    pub reset_time: String,
}

impl Default for AutoResetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            reset_time: "00:00".to_string(),
        }
    }
}

impl AutoResetConfig {
    pub fn parsed_time(&self) -> BookingResult<NaiveTime> {
        NaiveTime::parse_from_str(self.reset_time.trim(), "%H:%M")
            .map_err(|_| BookingError::InvalidResetTime(self.reset_time.clone()))
    }
}

/// Shared by every writer on the store. Claiming a reset means bumping this with a
/// compare-and-set, so one occurrence of the reset time is acted on once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct ResetMarker {
    /// Start of the current schedule period
    last_reset_at: NaiveDateTime,
    /// Latest reset that cleared the grids
    #[serde(default)]
    cleared_at: Option<NaiveDateTime>,
}

impl ResetMarker {
    fn armed_at(now: NaiveDateTime, cleared_at: Option<NaiveDateTime>) -> Self {
        Self {
            last_reset_at: now,
            cleared_at,
        }
    }

    fn cleared(now: NaiveDateTime) -> Self {
        Self {
            last_reset_at: now,
            cleared_at: Some(now),
        }
    }
}

fn load_marker(store: &dyn SessionStore) -> StoreResult<(Option<ResetMarker>, u64)> {
    Ok(match load_json::<ResetMarker>(store, LAST_RESET_KEY)? {
        Some((marker, version)) => (Some(marker), version),
        None => (None, 0),
    })
}

/// Time of the latest reset that cleared the grids, if any.
pub(crate) fn cleared_at(store: &dyn SessionStore) -> StoreResult<Option<NaiveDateTime>> {
    Ok(load_marker(store)?.0.and_then(|marker| marker.cleared_at))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    Idle,
    Armed(NaiveTime),
    Triggered,
}

pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// True once `now` has passed an occurrence of `reset_time` later than `last_reset_at`.
pub fn should_reset(now: NaiveDateTime, last_reset_at: NaiveDateTime, reset_time: NaiveTime) -> bool {
    let today = now.date().and_time(reset_time);
    let latest = if today <= now {
        today
    } else {
        today - Duration::days(1)
    };
    last_reset_at < latest
}

impl BookingLedger {
    /// Put `sport_key` back to all-available with no daily flags.
    ///
    /// Returns false when the stored state was already clear and nothing was written.
    pub fn apply_reset(&self, sport_key: &str) -> BookingResult<bool> {
        let _guard = self.lock()?;
        let cleared_at = cleared_at(self.store())?;
        self.clear_sport(sport_key, cleared_at, true)
    }

    /// Clear every sport for the reset at `epoch`. The caller holds the write lock.
    fn reset_all_locked(&self, epoch: Option<NaiveDateTime>) -> BookingResult<usize> {
        let mut changed = 0;
        for sport in self.sports() {
            if self.clear_sport(&sport.key, epoch, false)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Write a clear state for `sport_key` tagged with `epoch`.
    ///
    /// Unless `force` is set, state already started at or after `epoch` is left alone:
    /// it holds bookings made after that reset.
    fn clear_sport(
        &self,
        sport_key: &str,
        epoch: Option<NaiveDateTime>,
        force: bool,
    ) -> BookingResult<bool> {
        let sport = self.sport(sport_key)?;
        let key = sport.storage_key();
        let fresh = SportDay::fresh(sport, epoch);

        let mut attempt = 0;
        loop {
            let (day, version) = match load_json::<SportDay>(self.store(), &key)? {
                Some(found) => found,
                None => return Ok(false),
            };
            let current = epoch.is_some() && day.epoch >= epoch;
            if day.is_clear(sport) || (current && !force) {
                return Ok(false);
            }
            match save_json(self.store(), &key, &fresh, Some(version)) {
                Ok(_) => {
                    tracing::info!("reset {}", sport.key);
                    return Ok(true);
                }
                Err(StoreError::VersionConflict { .. }) if attempt < MAX_CAS_RETRIES => {
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Decides when every sport is reset.
///
/// `Idle` does nothing. `Armed(t)` resets all sports once the clock passes `t` and goes
/// back to `Armed(t)` for the next day. `Triggered` is only held while a reset runs.
/// The schedule and the marker are re-read from the store on every tick, so several
/// policies sharing one store agree on when the last reset happened.
pub struct ResetPolicy {
    state: PolicyState,
    last_reset_at: Option<NaiveDateTime>,
}

impl ResetPolicy {
    /// Restore the policy from the stored config and reset marker.
    pub fn load(ledger: &BookingLedger) -> BookingResult<Self> {
        let config = Self::config(ledger)?;
        let (marker, _) = load_marker(ledger.store())?;
        Ok(Self {
            state: Self::state_for(&config)?,
            last_reset_at: marker.map(|m| m.last_reset_at),
        })
    }

    pub fn config(ledger: &BookingLedger) -> BookingResult<AutoResetConfig> {
        Ok(load_json::<AutoResetConfig>(ledger.store(), AUTO_RESET_KEY)?
            .map(|(config, _)| config)
            .unwrap_or_default())
    }

    fn state_for(config: &AutoResetConfig) -> BookingResult<PolicyState> {
        Ok(if config.enabled {
            PolicyState::Armed(config.parsed_time()?)
        } else {
            PolicyState::Idle
        })
    }

    pub fn state(&self) -> PolicyState {
        self.state
    }

    pub fn last_reset_at(&self) -> Option<NaiveDateTime> {
        self.last_reset_at
    }

    /// Store a new schedule and arm or disarm accordingly.
    ///
    /// Arming without any previous reset starts the clock at `now` so existing bookings
    /// survive until the next occurrence of the reset time.
    pub fn configure(
        &mut self,
        ledger: &BookingLedger,
        config: AutoResetConfig,
        now: NaiveDateTime,
    ) -> BookingResult<()> {
        let state = Self::state_for(&config)?;
        let _guard = ledger.lock()?;
        save_json(ledger.store(), AUTO_RESET_KEY, &config, None)?;

        if config.enabled {
            let (marker, version) = self.refresh(ledger)?;
            if marker.is_none() {
                self.claim(ledger, ResetMarker::armed_at(now, None), version)?;
            }
        }
        self.state = state;
        tracing::info!(
            "auto reset {} at {}",
            if config.enabled { "enabled" } else { "disabled" },
            config.reset_time
        );
        Ok(())
    }

    /// Run the scheduled reset if it is due. Returns true if this call performed it.
    pub fn tick(&mut self, ledger: &BookingLedger, now: NaiveDateTime) -> BookingResult<bool> {
        let _guard = ledger.lock()?;
        self.state = Self::state_for(&Self::config(ledger)?)?;
        let reset_time = match self.state {
            PolicyState::Armed(t) => t,
            PolicyState::Idle | PolicyState::Triggered => return Ok(false),
        };

        let (marker, version) = self.refresh(ledger)?;
        let marker = match marker {
            Some(marker) => marker,
            None => {
                self.claim(ledger, ResetMarker::armed_at(now, None), version)?;
                return Ok(false);
            }
        };
        if !should_reset(now, marker.last_reset_at, reset_time) {
            return Ok(false);
        }
        if !self.claim(ledger, ResetMarker::cleared(now), version)? {
            tracing::debug!("scheduled reset at {} was claimed by another writer", now);
            return Ok(false);
        }

        self.state = PolicyState::Triggered;
        let result = ledger.reset_all_locked(Some(now));
        self.state = PolicyState::Armed(reset_time);
        let changed = result?;

        tracing::info!("scheduled reset at {} cleared {} sport(s)", now, changed);
        Ok(true)
    }

    /// Reset every sport now, ignoring the schedule. Irreversible, so `confirmed` must be set.
    pub fn manual_reset(
        &mut self,
        ledger: &BookingLedger,
        now: NaiveDateTime,
        confirmed: bool,
    ) -> BookingResult<usize> {
        if !confirmed {
            return Err(BookingError::ConfirmationRequired);
        }
        let _guard = ledger.lock()?;

        let mut attempt = 0;
        loop {
            let (_, version) = self.refresh(ledger)?;
            if self.claim(ledger, ResetMarker::cleared(now), version)? {
                break;
            }
            if attempt >= MAX_CAS_RETRIES {
                return Err(StoreError::Busy(LAST_RESET_KEY.to_string()).into());
            }
            attempt += 1;
        }

        let changed = ledger.reset_all_locked(Some(now))?;
        tracing::warn!("manual reset at {} cleared {} sport(s)", now, changed);
        Ok(changed)
    }

    fn refresh(&mut self, ledger: &BookingLedger) -> BookingResult<(Option<ResetMarker>, u64)> {
        let (marker, version) = load_marker(ledger.store())?;
        self.last_reset_at = marker.map(|m| m.last_reset_at);
        Ok((marker, version))
    }

    /// Write `marker` if the stored one is still at `version`. False if another writer got there first.
    fn claim(
        &mut self,
        ledger: &BookingLedger,
        marker: ResetMarker,
        version: u64,
    ) -> BookingResult<bool> {
        match save_json(ledger.store(), LAST_RESET_KEY, &marker, Some(version)) {
            Ok(_) => {
                self.last_reset_at = Some(marker.last_reset_at);
                Ok(true)
            }
            Err(StoreError::VersionConflict { .. }) => {
                self.refresh(ledger)?;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

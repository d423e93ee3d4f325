use serde::Serialize;

use super::slot_utils::calculate_time_slots;
use super::types::Court;

/// Every sport opens the same evening hours.
pub const OPENING_TIME: &str = "17:00";
pub const CLOSING_TIME: &str = "23:00";
pub const SLOT_MINUTES: u32 = 60;

/// Static shape of one sport: its courts, slot labels and storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SportConfig {
    pub key: String,
    pub name: String,
    pub courts: Vec<Court>,
    pub time_slots: Vec<String>,
}

impl SportConfig {
    /// Sport with `court_count` numbered courts over the standard evening slots.
    pub fn standard(key: &str, name: &str, court_count: usize) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            courts: (1..=court_count).map(Court::numbered).collect(),
            time_slots: calculate_time_slots(OPENING_TIME, CLOSING_TIME, SLOT_MINUTES),
        }
    }

    /// Store key holding this sport's grid and daily flags.
    pub fn storage_key(&self) -> String {
        format!("booking/{}", self.key)
    }

    pub fn court(&self, key: &str) -> Option<&Court> {
        self.courts.iter().find(|c| c.key == key)
    }
}

pub fn default_catalog() -> Vec<SportConfig> {
    vec![
        SportConfig::standard("badminton", "Badminton", 6),
        SportConfig::standard("basketball", "Basketball", 2),
        SportConfig::standard("tennis", "Tennis", 4),
        SportConfig::standard("volleyball", "Volleyball", 1),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_court_counts() {
        let counts: Vec<(String, usize)> = default_catalog()
            .into_iter()
            .map(|s| (s.key, s.courts.len()))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("badminton".to_string(), 6),
                ("basketball".to_string(), 2),
                ("tennis".to_string(), 4),
                ("volleyball".to_string(), 1),
            ]
        );
    }

    #[test]
    fn storage_keys_are_distinct() {
        let catalog = default_catalog();
        let mut keys: Vec<String> = catalog.iter().map(SportConfig::storage_key).collect();
        keys.dedup();
        assert_eq!(keys.len(), catalog.len());
        assert_eq!(catalog[2].storage_key(), "booking/tennis");
        assert_eq!(catalog[2].court("C4").map(|c| c.label.as_str()), Some("Court 4"));
    }
}

/// Parses a time string (HH:MM) to minutes since midnight
pub fn parse_time_to_minutes(time_str: &str) -> Option<u32> {
    let parts: Vec<&str> = time_str.trim().split(':').collect();
    if parts.len() != 2 {
        return None;
    }
    let hours: u32 = parts[0].parse().ok()?;
    let minutes: u32 = parts[1].parse().ok()?;
    if hours >= 24 || minutes >= 60 {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Formats minutes since midnight as a slot boundary (HH.MM). 24:00 is kept as "24.00".
pub fn minutes_to_slot_boundary(minutes: u32) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    format!("{:02}.{:02}", hours, mins)
}

/// Slot label covering `[start, end)`, e.g. "17.00-18.00"
pub fn slot_label(start_minutes: u32, end_minutes: u32) -> String {
    format!(
        "{}-{}",
        minutes_to_slot_boundary(start_minutes),
        minutes_to_slot_boundary(end_minutes)
    )
}

/// Calculates consecutive slot labels from `start_time` to `end_time` (both HH:MM)
/// in steps of `interval_minutes`. A trailing partial slot is dropped.
/// An `end_time` of "24:00" is accepted as midnight.
pub fn calculate_time_slots(start_time: &str, end_time: &str, interval_minutes: u32) -> Vec<String> {
    let start_minutes = match parse_time_to_minutes(start_time) {
        Some(m) => m,
        None => return Vec::new(),
    };
    let end_minutes = if end_time.trim() == "24:00" {
        24 * 60
    } else {
        match parse_time_to_minutes(end_time) {
            Some(m) => m,
            None => return Vec::new(),
        }
    };
    if interval_minutes == 0 {
        return Vec::new();
    }

    let mut slots = Vec::new();
    let mut current = start_minutes;
    while current + interval_minutes <= end_minutes {
        slots.push(slot_label(current, current + interval_minutes));
        current += interval_minutes;
    }
    slots
}

use std::path::Path;

use csv::WriterBuilder;

use crate::booking::{BookingRecord, BookingStatus};

const HEADERS: [&str; 7] = [
    "reference",
    "username",
    "sport",
    "court",
    "time",
    "status",
    "booked_at",
];

fn status_label(status: BookingStatus) -> &'static str {
    match status {
        BookingStatus::Confirmed => "Confirmed",
    }
}

/// Writes a user's booking history to `csv_path`, replacing any existing file.
/// Returns the number of records written.
pub fn export_history_to_csv(
    username: &str,
    records: &[BookingRecord],
    csv_path: &Path,
) -> csv::Result<usize> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .from_path(csv_path)?;

    wtr.write_record(HEADERS)?;
    for record in records {
        let booked_at = record.booked_at.to_rfc3339();
        wtr.write_record([
            record.reference.as_str(),
            username,
            record.sport.as_str(),
            record.court.as_str(),
            record.time.as_str(),
            status_label(record.status),
            booked_at.as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(records.len())
}

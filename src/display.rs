use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::booking::{CellState, SlotGrid, SportConfig};

/// Short cell text used in printed grids
pub fn format_cell(state: CellState) -> &'static str {
    match state {
        CellState::Available => "free",
        CellState::Booked => "BOOKED",
    }
}

/// One line per time slot: `17.00-18.00 | C1 free | C2 BOOKED`
fn grid_lines(sport: &SportConfig, grid: &SlotGrid) -> Vec<String> {
    grid.rows()
        .iter()
        .map(|row| {
            let cells: Vec<String> = sport
                .courts
                .iter()
                .map(|court| {
                    let state = row
                        .cells
                        .get(&court.key)
                        .copied()
                        .unwrap_or(CellState::Available);
                    format!("{} {}", court.key, format_cell(state))
                })
                .collect();
            format!("{} | {}", row.time, cells.join(" | "))
        })
        .collect()
}

/// Writes a sport's grid to a file, headed by the sport name
pub fn write_grid_to_file(
    sport: &SportConfig,
    grid: &SlotGrid,
    path: &Path,
) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "** {} **", sport.name)?;
    for line in grid_lines(sport, grid) {
        writeln!(file, "{}", line)?;
    }
    Ok(())
}

/// Prints a sport's grid in a readable format
pub fn print_sport_grid(sport: &SportConfig, grid: &SlotGrid) {
    println!("\n=== {} ===", sport.name);
    let total = sport.courts.len() * sport.time_slots.len();
    println!("Booked cells: {} of {}", grid.booked_count(), total);
    for (row, line) in grid.rows().iter().zip(grid_lines(sport, grid)) {
        let free = grid.available_courts(&row.time).unwrap_or(0);
        println!("  {}   ({} free)", line, free);
    }
}

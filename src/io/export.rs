//! Snapshot export: flat CSV telemetry and full JSON lines.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::sim::types::SimSnapshot;

/// Column header of the CSV telemetry export.
const HEADER: &str = "step,time_s,hour,solar_w,demand_w,pack_current_a,pack_voltage_v,\
                       pack_soc,min_cell_soc,max_cell_soc,max_temperature_c,bms_state,\
                       max_charge_a,max_discharge_a,balancing_cells,grid_import_w,\
                       grid_export_w,curtailed_w,unserved_w,grid_cost,mode,rejected";

/// Exports one CSV row per snapshot to the file at `path`.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(snapshots: &[SimSnapshot], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_csv(snapshots, BufWriter::new(file))
}

/// Writes snapshots as CSV to any writer.
///
/// Output is deterministic for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(snapshots: &[SimSnapshot], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for s in snapshots {
        wtr.write_record(&[
            s.step.to_string(),
            format!("{:.1}", s.time_s),
            format!("{:.3}", s.hour_of_day),
            format!("{:.2}", s.solar_w),
            format!("{:.2}", s.demand_w),
            format!("{:.4}", s.pack.current_a),
            format!("{:.3}", s.pack.voltage_v),
            format!("{:.6}", s.pack.soc),
            format!("{:.6}", s.pack.min_soc),
            format!("{:.6}", s.pack.max_soc),
            format!("{:.3}", s.pack.temperature_c),
            s.bms.state.as_str().to_string(),
            format!("{:.3}", s.bms.max_charge_current),
            format!("{:.3}", s.bms.max_discharge_current),
            s.bms.balancing_targets.len().to_string(),
            format!("{:.2}", s.dispatch.grid_import_w),
            format!("{:.2}", s.dispatch.grid_export_w),
            format!("{:.2}", s.dispatch.curtailed_power_w),
            format!("{:.2}", s.dispatch.unserved_power_w),
            format!("{:.6}", s.dispatch.grid_cost),
            s.dispatch.mode.as_str().to_string(),
            s.pack_error.is_some().to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Exports every snapshot as one JSON object per line to `path`.
///
/// # Errors
///
/// Returns an `io::Error` if file creation, serialization or writing fails.
pub fn export_json_lines(snapshots: &[SimSnapshot], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_json_lines(snapshots, BufWriter::new(file))
}

/// Writes snapshots as JSON lines to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if serialization or writing fails.
pub fn write_json_lines(snapshots: &[SimSnapshot], mut writer: impl Write) -> io::Result<()> {
    for s in snapshots {
        serde_json::to_writer(&mut writer, s)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScenarioConfig;

    fn snapshots(n: usize) -> Vec<SimSnapshot> {
        let mut cfg = ScenarioConfig::imbalanced();
        cfg.simulation.steps_per_day = n;
        cfg.build().unwrap().run()
    }

    #[test]
    fn header_matches_column_count() {
        let mut buf = Vec::new();
        write_csv(&snapshots(24), &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        let first_line = output.lines().next().unwrap();
        assert!(first_line.starts_with("step,time_s,hour,"));
        assert_eq!(first_line.split(',').count(), 22);
    }

    #[test]
    fn row_count_matches_snapshot_count() {
        let mut buf = Vec::new();
        write_csv(&snapshots(24), &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        // 1 header + 24 data rows
        assert_eq!(output.lines().count(), 25);
    }

    #[test]
    fn csv_is_parseable() {
        let mut buf = Vec::new();
        write_csv(&snapshots(24), &mut buf).unwrap();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        for record in rdr.records() {
            let rec = record.unwrap();
            let soc: f64 = rec[7].parse().unwrap();
            assert!((0.0..=1.0).contains(&soc));
            assert!(["normal", "warning", "protective", "fault"].contains(&&rec[11]));
            let _: bool = rec[21].parse().unwrap();
        }
    }

    #[test]
    fn json_lines_round_trip() {
        let snaps = snapshots(24);
        let mut buf = Vec::new();
        write_json_lines(&snaps, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let parsed: Vec<SimSnapshot> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(parsed.len(), snaps.len());
        assert_eq!(parsed[5].step, snaps[5].step);
        assert_eq!(parsed[5].bms.state, snaps[5].bms.state);
    }
}

//! Record sinks: where a completed [`MeasurementRecord`] goes once a poll
//! cycle finishes.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;

use crate::error::EngineError;
use crate::measurement::MeasurementRecord;

/// A destination for decoded measurement records.
///
/// A sink failing must never abort the poll cycle that produced the
/// record — the engine logs the error and moves on to the next sink.
pub trait Sink {
    fn publish(&mut self, record: &MeasurementRecord) -> Result<(), EngineError>;
}

/// Discards every record. Used for `-m 0` runs and in tests where only
/// the engine's internal state matters.
#[derive(Debug, Default)]
pub struct NullSink;

impl Sink for NullSink {
    fn publish(&mut self, _record: &MeasurementRecord) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Appends one human-readable line per record to a file.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSink { path: path.into() }
    }

    fn format(record: &MeasurementRecord) -> String {
        let mut line = format!(
            "{} {} tx={} rx={:?} order={:?} lat_ns={:?}",
            record.timestamp_utc,
            record.inverter_serial,
            record.tx_channel,
            record.rx_channels,
            record.fragment_order,
            record.fragment_latencies_ns,
        );

        let ac = &record.ac;
        if let Some(v) = ac.voltage {
            line.push_str(&format!(" ac.voltage: {:.1}", v));
        }
        if let Some(v) = ac.current {
            line.push_str(&format!(" ac.current: {:.2}", v));
        }
        if let Some(v) = ac.frequency {
            line.push_str(&format!(" ac.frequency: {:.2}", v));
        }
        if let Some(v) = ac.power {
            line.push_str(&format!(" ac.power: {:.1}", v));
        }
        if let Some(v) = ac.temperature {
            line.push_str(&format!(" ac.temperature: {:.1}", v));
        }
        if let Some(v) = ac.load_pct {
            line.push_str(&format!(" ac.load_pct: {:.1}", v));
        }

        for (i, s) in record.per_string.iter().enumerate() {
            let n = i + 1;
            if let Some(v) = s.voltage {
                line.push_str(&format!(" dc{}.voltage: {:.1}", n, v));
            }
            if let Some(v) = s.current {
                line.push_str(&format!(" dc{}.current: {:.2}", n, v));
            }
            if let Some(v) = s.power {
                line.push_str(&format!(" dc{}.power: {:.1}", n, v));
            }
            if let Some(v) = s.energy_today {
                line.push_str(&format!(" dc{}.energy_today: {:.0}", n, v));
            }
            if let Some(v) = s.energy_total {
                line.push_str(&format!(" dc{}.energy_total: {:.0}", n, v));
            }
        }

        line
    }
}

impl Sink for FileSink {
    fn publish(&mut self, record: &MeasurementRecord) -> Result<(), EngineError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| EngineError::SinkFailure(e.to_string()))?;
        writeln!(file, "{}", Self::format(record)).map_err(|e| EngineError::SinkFailure(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{AcMeasurement, StringMeasurement};
    use std::fs;

    fn sample_record() -> MeasurementRecord {
        MeasurementRecord {
            inverter_serial: "114199978563412".into(),
            model_name: "HM-600".into(),
            timestamp_utc: 1_700_000_000,
            tx_channel: 40,
            rx_channels: vec![3, 23, 61],
            fragment_order: vec![1, 2],
            fragment_latencies_ns: vec![1_000_000, 2_000_000],
            per_string: vec![StringMeasurement {
                voltage: Some(32.1),
                current: Some(1.23),
                power: Some(39.5),
                energy_today: Some(412.0),
                energy_total: Some(1_234_567.0),
            }],
            ac: AcMeasurement {
                voltage: Some(230.0),
                current: Some(0.5),
                frequency: Some(50.0),
                power: Some(115.0),
                temperature: Some(24.5),
                load_pct: None,
            },
            crc_valid: true,
        }
    }

    #[test]
    fn null_sink_always_succeeds() {
        let mut sink = NullSink;
        assert!(sink.publish(&sample_record()).is_ok());
    }

    #[test]
    fn file_sink_appends_one_line_with_key_fields() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("ahoy_sink_test_{}.log", std::process::id()));
        let _ = fs::remove_file(&path);

        let mut sink = FileSink::new(&path);
        sink.publish(&sample_record()).unwrap();
        sink.publish(&sample_record()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("114199978563412"));
        assert!(lines[0].contains("ac.voltage: 230.0"));
        assert!(lines[0].contains("dc1.power: 39.5"));

        let _ = fs::remove_file(&path);
    }
}

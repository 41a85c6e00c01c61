//! Final, scaled measurement types emitted once per completed poll cycle.

use serde::Serialize;

/// One DC string's measurements. Fields are `None` when the corresponding
/// fragment carrying that value was never received or never interpreted.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StringMeasurement {
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub power: Option<f64>,
    pub energy_today: Option<f64>,
    pub energy_total: Option<f64>,
}

/// AC-side measurements, shared across all of an inverter's strings.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AcMeasurement {
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub frequency: Option<f64>,
    pub power: Option<f64>,
    pub temperature: Option<f64>,
    pub load_pct: Option<f64>,
}

/// One completed poll cycle's worth of decoded telemetry for one inverter.
///
/// `per_string` is indexed from 0 for string 1, i.e. `per_string[0]` is
/// string 1's measurement, matching the registry's `fragment_count / 2`
/// (roughly) DC channels per model.
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementRecord {
    pub inverter_serial: String,
    pub model_name: String,
    pub timestamp_utc: u64,
    pub tx_channel: u8,
    pub rx_channels: Vec<u8>,
    pub fragment_order: Vec<u8>,
    pub fragment_latencies_ns: Vec<i64>,
    pub per_string: Vec<StringMeasurement>,
    pub ac: AcMeasurement,
    pub crc_valid: bool,
}

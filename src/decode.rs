//! Per-model, per-command payload decoders.
//!
//! Every decoder here is a pure function of `(model name, command code,
//! payload bytes)`: it never touches engine state, and it never guesses at
//! a command layout it doesn't recognize — unknown command codes just keep
//! their raw 16-bit words under a debug key. Cross-fragment arithmetic
//! (split 32-bit energy totals, back-computed voltage) happens one layer up
//! in [`crate::engine`], which is the only place that sees every fragment
//! of a poll cycle at once.

use byteorder::{BigEndian, ByteOrder};
use std::collections::BTreeMap;

use crate::registry::DecoderId;

/// Partial measurements for one DC string, as read out of a single
/// fragment. `energy_total_low32`/`energy_total_high16` are the split
/// halves of a 32-bit accumulator that some models spread across two
/// fragments; a decoder that already has the full value in one fragment
/// sets only `energy_total_low32` and leaves the high half `None`.
#[derive(Debug, Clone, Default)]
pub struct DcPartial {
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub power: Option<f64>,
    pub energy_today: Option<f64>,
    pub energy_total_low32: Option<u32>,
    pub energy_total_high16: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct AcPartial {
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub frequency: Option<f64>,
    pub power: Option<f64>,
    pub temperature: Option<f64>,
    pub load_pct: Option<f64>,
}

/// One fragment's decoded contents.
#[derive(Debug, Clone, Default)]
pub struct FragmentData {
    pub dc: BTreeMap<u8, DcPartial>,
    pub ac: AcPartial,
    /// Raw, never-interpreted 16-bit words, preserved for command codes
    /// this decoder doesn't recognize.
    pub debug_words: BTreeMap<String, u16>,
    pub unknown_command: bool,
}

fn raw8_words(payload: &[u8]) -> BTreeMap<String, u16> {
    let mut words = BTreeMap::new();
    let n = payload.len() / 2;
    for i in 0..n.min(8) {
        words.insert(format!("uk{}", i + 1), BigEndian::read_u16(&payload[i * 2..]));
    }
    words
}

/// Entry point: dispatches on the registry's decoder id plus the model's
/// display name (some decoder ids cover more than one command layout).
pub fn decode_fragment(decoder: DecoderId, model_name: &str, command: u8, payload: &[u8]) -> FragmentData {
    match decoder {
        DecoderId::HmSingleString => hm_single_string(model_name, command, payload),
        DecoderId::HmDualString => hm_dual_string(command, payload),
        DecoderId::MiLegacy => mi_legacy(model_name, command, payload),
        DecoderId::PassThrough => pass_through(command, payload),
    }
}

fn pass_through(_command: u8, payload: &[u8]) -> FragmentData {
    FragmentData {
        debug_words: raw8_words(payload),
        unknown_command: true,
        ..Default::default()
    }
}

fn hm_single_string(model_name: &str, command: u8, payload: &[u8]) -> FragmentData {
    match model_name {
        "HM-300" => hm300(command, payload),
        _ => hm600(command, payload),
    }
}

fn hm300(command: u8, payload: &[u8]) -> FragmentData {
    let mut f = FragmentData::default();
    match command {
        1 if payload.len() >= 16 => {
            let uk0 = BigEndian::read_u16(&payload[0..]);
            let u1 = BigEndian::read_u16(&payload[2..]);
            let i1 = BigEndian::read_u16(&payload[4..]);
            let p1 = BigEndian::read_u16(&payload[6..]);
            let ptotal = BigEndian::read_u32(&payload[8..]);
            let pday = BigEndian::read_u16(&payload[12..]);
            let u = BigEndian::read_u16(&payload[14..]);
            f.dc.insert(
                1,
                DcPartial {
                    voltage: Some(u1 as f64 * 0.1),
                    current: Some(i1 as f64 * 0.01),
                    power: Some(p1 as f64 * 0.1),
                    energy_today: Some(pday as f64),
                    energy_total_low32: Some(ptotal),
                    energy_total_high16: None,
                },
            );
            f.ac.voltage = Some(u as f64 * 0.1);
            f.debug_words.insert("uk0".into(), uk0);
        }
        0x82 if payload.len() >= 16 => {
            let freq = BigEndian::read_u16(&payload[0..]);
            let p = BigEndian::read_u16(&payload[2..]);
            let uk0 = BigEndian::read_u16(&payload[4..]);
            let i = BigEndian::read_u16(&payload[6..]);
            let uk1 = BigEndian::read_u16(&payload[8..]);
            let t = BigEndian::read_u16(&payload[10..]);
            let uk2 = BigEndian::read_u16(&payload[12..]);
            let uk3 = BigEndian::read_u16(&payload[14..]);
            f.ac.frequency = Some(freq as f64 * 0.01);
            f.ac.power = Some(p as f64 * 0.1);
            f.ac.current = Some(i as f64 * 0.01);
            f.ac.temperature = Some(t as f64 * 0.1);
            f.debug_words.insert("uk0".into(), uk0);
            f.debug_words.insert("uk1".into(), uk1);
            f.debug_words.insert("uk2".into(), uk2);
            f.debug_words.insert("uk3".into(), uk3);
        }
        _ => {
            f.debug_words = raw8_words(payload);
            f.unknown_command = true;
        }
    }
    f
}

fn hm600(command: u8, payload: &[u8]) -> FragmentData {
    let mut f = FragmentData::default();
    match command {
        1 if payload.len() >= 16 => {
            let uk1 = BigEndian::read_u16(&payload[0..]);
            let u1 = BigEndian::read_u16(&payload[2..]);
            let i1 = BigEndian::read_u16(&payload[4..]);
            let p1 = BigEndian::read_u16(&payload[6..]);
            let u2 = BigEndian::read_u16(&payload[8..]);
            let i2 = BigEndian::read_u16(&payload[10..]);
            let p2 = BigEndian::read_u16(&payload[12..]);
            let uk8 = BigEndian::read_u16(&payload[14..]);
            f.dc.insert(
                1,
                DcPartial {
                    voltage: Some(u1 as f64 * 0.1),
                    current: Some(i1 as f64 * 0.01),
                    power: Some(p1 as f64 * 0.1),
                    energy_total_high16: Some(uk8 as u32),
                    ..Default::default()
                },
            );
            f.dc.insert(
                2,
                DcPartial {
                    voltage: Some(u2 as f64 * 0.1),
                    current: Some(i2 as f64 * 0.01),
                    power: Some(p2 as f64 * 0.1),
                    ..Default::default()
                },
            );
            f.ac.power = Some((p1 as f64 + p2 as f64) * 0.1);
            f.debug_words.insert("uk1".into(), uk1);
        }
        2 if payload.len() >= 16 => {
            let ptotal1 = BigEndian::read_u16(&payload[0..]);
            let ptotal2 = BigEndian::read_u32(&payload[2..]);
            let pday1 = BigEndian::read_u16(&payload[6..]);
            let pday2 = BigEndian::read_u16(&payload[8..]);
            let u = BigEndian::read_u16(&payload[10..]);
            let freq = BigEndian::read_u16(&payload[12..]);
            let p = BigEndian::read_u16(&payload[14..]);
            f.dc.insert(
                1,
                DcPartial {
                    energy_today: Some(pday1 as f64),
                    energy_total_low32: Some(ptotal1 as u32),
                    ..Default::default()
                },
            );
            f.dc.insert(
                2,
                DcPartial {
                    energy_today: Some(pday2 as f64),
                    energy_total_low32: Some(ptotal2),
                    ..Default::default()
                },
            );
            let voltage = u as f64 * 0.1;
            let power = p as f64 * 0.1;
            f.ac.voltage = Some(voltage);
            f.ac.frequency = Some(freq as f64 * 0.01);
            f.ac.power = Some(power);
            // This command never carries a current word directly.
            // Recompute it from power/voltage instead of leaving it undefined.
            f.ac.current = if voltage != 0.0 { Some(power / voltage) } else { None };
        }
        0x83 if payload.len() >= 12 => {
            let uk1 = BigEndian::read_u16(&payload[0..]);
            let i = BigEndian::read_u16(&payload[2..]);
            let uk3 = BigEndian::read_u16(&payload[4..]);
            let t = BigEndian::read_u16(&payload[6..]);
            let uk5 = BigEndian::read_u16(&payload[8..]);
            let uk6 = BigEndian::read_u16(&payload[10..]);
            f.ac.current = Some(i as f64 * 0.01);
            f.ac.temperature = Some(t as f64 * 0.1);
            f.debug_words.insert("uk1".into(), uk1);
            f.debug_words.insert("uk3".into(), uk3);
            f.debug_words.insert("uk5".into(), uk5);
            f.debug_words.insert("uk6".into(), uk6);
        }
        _ => {
            f.debug_words = raw8_words(payload);
            f.unknown_command = true;
        }
    }
    f
}

fn hm_dual_string(command: u8, payload: &[u8]) -> FragmentData {
    let mut f = FragmentData::default();
    match command {
        1 if payload.len() >= 18 => {
            let uk1 = BigEndian::read_u16(&payload[0..]);
            let u1 = BigEndian::read_u16(&payload[2..]);
            let i1 = BigEndian::read_u16(&payload[4..]);
            let i2 = BigEndian::read_u16(&payload[6..]);
            let p1 = BigEndian::read_u16(&payload[8..]);
            let p2 = BigEndian::read_u16(&payload[10..]);
            let ptotal1 = BigEndian::read_u32(&payload[12..]);
            let uk8 = BigEndian::read_u16(&payload[16..]);
            f.dc.insert(
                1,
                DcPartial {
                    voltage: Some(u1 as f64 * 0.1),
                    current: Some(i1 as f64 * 0.01),
                    power: Some(p1 as f64 * 0.1),
                    energy_total_low32: Some(ptotal1),
                    ..Default::default()
                },
            );
            f.dc.insert(
                2,
                DcPartial {
                    current: Some(i2 as f64 * 0.1),
                    power: Some(p2 as f64 * 0.1),
                    energy_total_high16: Some(uk8 as u32),
                    ..Default::default()
                },
            );
            f.debug_words.insert("uk1".into(), uk1);
        }
        2 if payload.len() >= 18 => {
            let ptotal2 = BigEndian::read_u32(&payload[0..]);
            let pday1 = BigEndian::read_u16(&payload[4..]);
            let pday2 = BigEndian::read_u16(&payload[6..]);
            let u2 = BigEndian::read_u16(&payload[8..]);
            let i3 = BigEndian::read_u16(&payload[10..]);
            let i4 = BigEndian::read_u16(&payload[12..]);
            let p3 = BigEndian::read_u16(&payload[14..]);
            let uk8 = BigEndian::read_u16(&payload[16..]);
            f.dc.insert(
                2,
                DcPartial {
                    voltage: Some(u2 as f64 * 0.1),
                    energy_total_low32: Some(ptotal2),
                    energy_today: Some(pday2 as f64),
                    ..Default::default()
                },
            );
            f.dc.insert(
                1,
                DcPartial {
                    energy_today: Some(pday1 as f64),
                    ..Default::default()
                },
            );
            f.dc.insert(
                3,
                DcPartial {
                    current: Some(i3 as f64 * 0.01),
                    power: Some(p3 as f64 * 0.1),
                    ..Default::default()
                },
            );
            f.dc.insert(
                4,
                DcPartial {
                    current: Some(i4 as f64 * 0.1),
                    ..Default::default()
                },
            );
            f.debug_words.insert("uk8".into(), uk8);
        }
        3 if payload.len() >= 18 => {
            let p4 = BigEndian::read_u16(&payload[0..]);
            let ptotal3 = BigEndian::read_u32(&payload[2..]);
            let ptotal4 = BigEndian::read_u32(&payload[6..]);
            let pday3 = BigEndian::read_u16(&payload[10..]);
            let pday4 = BigEndian::read_u16(&payload[12..]);
            let u = BigEndian::read_u16(&payload[14..]);
            let uk7 = BigEndian::read_u16(&payload[16..]);
            f.dc.insert(
                4,
                DcPartial {
                    power: Some(p4 as f64 * 0.1),
                    energy_total_low32: Some(ptotal4),
                    energy_today: Some(pday4 as f64),
                    ..Default::default()
                },
            );
            f.dc.insert(
                3,
                DcPartial {
                    energy_total_low32: Some(ptotal3),
                    energy_today: Some(pday3 as f64),
                    ..Default::default()
                },
            );
            f.ac.voltage = Some(u as f64 * 0.1);
            f.debug_words.insert("uk7".into(), uk7);
        }
        0x84 if payload.len() >= 12 => {
            let freq = BigEndian::read_u16(&payload[0..]);
            let p = BigEndian::read_u16(&payload[2..]);
            let uk3 = BigEndian::read_u16(&payload[4..]);
            let i = BigEndian::read_u16(&payload[6..]);
            let pctload = BigEndian::read_u16(&payload[8..]);
            let t = BigEndian::read_u16(&payload[10..]);
            let power = p as f64 * 0.1;
            let current = i as f64 * 0.01;
            f.ac.frequency = Some(freq as f64 * 0.01);
            f.ac.power = Some(power);
            f.ac.current = Some(current);
            // Recomputed from this fragment's own power/current, overriding
            // the grid voltage read out of cmd 3 once both are merged.
            if current != 0.0 {
                f.ac.voltage = Some(power / current);
            }
            f.ac.load_pct = Some(pctload as f64 * 0.1);
            f.ac.temperature = Some(t as f64 * 0.1);
            f.debug_words.insert("uk3".into(), uk3);
        }
        _ => {
            f.debug_words = raw8_words(payload);
            f.unknown_command = true;
        }
    }
    f
}

/// MI-250/300/500/1000/1200 share the same radio firmware lineage as the
/// HM family, so the 2-fragment members reuse HM-300's layout and the
/// 4-fragment MI-1200 reuses HM-1200's, rather than inventing an unrelated
/// byte layout.
fn mi_legacy(model_name: &str, command: u8, payload: &[u8]) -> FragmentData {
    if model_name == "MI-1200" {
        hm_dual_string(command, payload)
    } else {
        hm300(command, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn be_payload(words_u16: &[u16]) -> Vec<u8> {
        let mut v = Vec::new();
        for w in words_u16 {
            v.extend_from_slice(&w.to_be_bytes());
        }
        v
    }

    #[test]
    fn hm300_cmd1_scales_dc_and_ac() {
        let payload = be_payload(&[0, 2300, 150, 500, 0, 1234, 2310]);
        // ptotal is a u32 so patch bytes 8..12 directly
        let mut payload = payload;
        payload[8..12].copy_from_slice(&42u32.to_be_bytes());
        let f = hm300(1, &payload);
        let s1 = f.dc.get(&1).unwrap();
        assert_eq!(s1.voltage, Some(230.0));
        assert_eq!(s1.current, Some(1.5));
        assert_eq!(s1.power, Some(50.0));
        assert_eq!(s1.energy_total_low32, Some(42));
        assert_eq!(f.ac.voltage, Some(231.0));
    }

    #[test]
    fn hm600_cmd2_recomputes_missing_current() {
        let mut payload = vec![0u8; 16];
        BigEndian::write_u16(&mut payload[0..], 10);
        BigEndian::write_u32(&mut payload[2..], 20);
        BigEndian::write_u16(&mut payload[6..], 1);
        BigEndian::write_u16(&mut payload[8..], 2);
        BigEndian::write_u16(&mut payload[10..], 2300); // u -> 230.0 V
        BigEndian::write_u16(&mut payload[12..], 5000); // freq -> 50.0 Hz
        BigEndian::write_u16(&mut payload[14..], 1000); // p -> 100.0 W
        let f = hm600(2, &payload);
        assert_eq!(f.ac.voltage, Some(230.0));
        assert_eq!(f.ac.power, Some(100.0));
        assert!((f.ac.current.unwrap() - (100.0 / 230.0)).abs() < 1e-9);
    }

    #[test]
    fn unknown_command_is_flagged_and_raw() {
        let payload = be_payload(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let f = hm600(5, &payload);
        assert!(f.unknown_command);
        assert_eq!(f.debug_words.len(), 8);
    }

    #[test]
    fn hm_dual_string_splits_day_energy_into_distinct_keys() {
        let mut payload = vec![0u8; 18];
        BigEndian::write_u16(&mut payload[0..], 11);
        BigEndian::write_u32(&mut payload[2..], 100);
        BigEndian::write_u32(&mut payload[6..], 200);
        BigEndian::write_u16(&mut payload[10..], 7); // pday3
        BigEndian::write_u16(&mut payload[12..], 9); // pday4
        BigEndian::write_u16(&mut payload[14..], 2300);
        BigEndian::write_u16(&mut payload[16..], 77);
        let f = hm_dual_string(3, &payload);
        assert_eq!(f.dc.get(&3).unwrap().energy_today, Some(7.0));
        assert_eq!(f.dc.get(&4).unwrap().energy_today, Some(9.0));
    }
}

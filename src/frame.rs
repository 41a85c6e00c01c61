//! Request/response frame encoding and validation.
//!
//! Two checksums wrap every frame: an inner MODBUS-style CRC16 over the
//! encapsulated poll payload, and an outer CRC-8 (custom polynomial 0x101,
//! no reflection, no xor-out) over everything up to but not including
//! itself. Both are hand-rolled bit loops rather than pulled from a crate:
//! the outer polynomial isn't one of the standard named CRC-8 variants, and
//! a direct implementation is easier to audit against the reference byte
//! sequences than a generic-algorithm table lookup.

use crate::address::{serial_to_inverter_addr, InverterAddr};
use crate::error::EngineError;

const REQUEST_MARKER: u8 = 0x15;
const RESPONSE_MARKER: u8 = 0x95;
const POLL_TYPE: u8 = 0x80;
const POLL_SUBTYPE: u8 = 0x0b;

/// CRC-16/MODBUS: poly 0x8005 reflected (0xA001), init 0xFFFF, no xor-out.
fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// CRC-8, polynomial 0x101 (i.e. generator 0x01 with the implicit leading
/// term), init 0, no xor-out, MSB first.
fn crc8_0x101(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ 0x01;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Builds a standard poll request frame (27 bytes).
pub fn encode_poll_request(dst_serial: &str, src_serial: &str, unix_ts: u32) -> Result<Vec<u8>, EngineError> {
    let dst: InverterAddr = serial_to_inverter_addr(dst_serial)?;
    let src: InverterAddr = serial_to_inverter_addr(src_serial)?;

    let mut p = Vec::with_capacity(27);
    p.push(REQUEST_MARKER);
    p.extend_from_slice(&dst);
    p.extend_from_slice(&src);
    p.push(POLL_TYPE);

    let mut pp = Vec::with_capacity(14);
    pp.push(POLL_SUBTYPE);
    pp.push(0x00);
    pp.extend_from_slice(&unix_ts.to_be_bytes());
    pp.extend_from_slice(&[0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00]);

    let crc_m = crc16_modbus(&pp);
    p.extend_from_slice(&pp);
    p.extend_from_slice(&crc_m.to_be_bytes());

    let crc8 = crc8_0x101(&p);
    p.push(crc8);
    Ok(p)
}

/// Builds a re-fetch request for a single missing fragment index.
///
/// Layout is just marker + dst + src + `0x80 | fragment_index`, closed by
/// the outer CRC-8 alone (no inner checksum).
pub fn encode_refetch_request(
    dst_serial: &str,
    src_serial: &str,
    fragment_index: u8,
) -> Result<Vec<u8>, EngineError> {
    let dst = serial_to_inverter_addr(dst_serial)?;
    let src = serial_to_inverter_addr(src_serial)?;

    let mut p = Vec::with_capacity(8);
    p.push(REQUEST_MARKER);
    p.extend_from_slice(&dst);
    p.extend_from_slice(&src);
    p.push(0x80 | fragment_index);

    let crc8 = crc8_0x101(&p);
    p.push(crc8);
    Ok(p)
}

/// A validated (or at least parsed) response frame.
#[derive(Debug, Clone)]
pub struct ResponseFrame {
    pub marker: u8,
    pub src_addr: InverterAddr,
    pub dst_addr: InverterAddr,
    pub command: u8,
    pub raw: Vec<u8>,
    pub crc_valid: bool,
}

impl ResponseFrame {
    /// The model-specific payload bytes, i.e. everything after the 10-byte
    /// header and before the trailing CRC-8 byte.
    pub fn payload(&self) -> &[u8] {
        &self.raw[10..self.raw.len() - 1]
    }
}

/// Parses and CRC-validates a raw received buffer.
///
/// Frames shorter than 11 bytes (header + at least one payload byte + CRC)
/// can't carry any measurement data and are rejected outright. Frames that
/// parse but fail the outer CRC-8 are still returned, with `crc_valid`
/// false, so the engine can retain them as opaque/untrusted fragments.
pub fn decode_response(raw: &[u8]) -> Result<ResponseFrame, EngineError> {
    if raw.len() < 11 {
        return Err(EngineError::MalformedFrame(format!(
            "frame too short: {} bytes",
            raw.len()
        )));
    }

    let marker = raw[0];
    let mut src_addr = [0u8; 4];
    src_addr.copy_from_slice(&raw[1..5]);
    let mut dst_addr = [0u8; 4];
    dst_addr.copy_from_slice(&raw[5..9]);
    let command = raw[9];

    let expected = crc8_0x101(&raw[..raw.len() - 1]);
    let crc_valid = expected == raw[raw.len() - 1];

    Ok(ResponseFrame {
        marker,
        src_addr,
        dst_addr,
        command,
        raw: raw.to_vec(),
        crc_valid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_request_has_expected_layout_and_self_consistent_crcs() {
        let p = encode_poll_request("72220200", "72220200", 0x623C_8ECF).unwrap();
        assert_eq!(p.len(), 27);
        assert_eq!(p[0], REQUEST_MARKER);
        assert_eq!(&p[1..5], &[0x72, 0x22, 0x02, 0x00]);
        assert_eq!(&p[5..9], &[0x72, 0x22, 0x02, 0x00]);
        assert_eq!(p[9], POLL_TYPE);
        assert_eq!(p[10], POLL_SUBTYPE);
        assert_eq!(p[11], 0x00);
        assert_eq!(&p[12..16], &0x623C_8ECFu32.to_be_bytes());
        assert_eq!(&p[16..24], &[0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00]);

        let inner = crc16_modbus(&p[10..24]);
        assert_eq!(&p[24..26], &inner.to_be_bytes());

        let outer = crc8_0x101(&p[..26]);
        assert_eq!(p[26], outer);
    }

    #[test]
    fn refetch_request_is_short_form_with_only_outer_crc() {
        let p = encode_refetch_request("72220200", "72220200", 2).unwrap();
        assert_eq!(p.len(), 11);
        assert_eq!(p[9], 0x80 | 2);
        let outer = crc8_0x101(&p[..10]);
        assert_eq!(p[10], outer);
    }

    #[test]
    fn decode_rejects_short_frames() {
        assert!(decode_response(&[0x95, 1, 2, 3]).is_err());
    }

    #[test]
    fn decode_flags_crc_mismatch_but_still_returns_frame() {
        let mut raw = vec![0x95u8, 0, 0, 0, 1, 0, 0, 0, 2, 1, 0xAA, 0xBB, 0x00];
        let good_crc = crc8_0x101(&raw[..raw.len() - 1]);
        raw[12] = good_crc.wrapping_add(1);
        let f = decode_response(&raw).unwrap();
        assert!(!f.crc_valid);
        assert_eq!(f.command, 1);
    }

    #[test]
    fn decode_accepts_valid_crc() {
        let mut raw = vec![0x95u8, 0, 0, 0, 1, 0, 0, 0, 2, 1, 0xAA, 0xBB];
        let crc = crc8_0x101(&raw);
        raw.push(crc);
        let f = decode_response(&raw).unwrap();
        assert!(f.crc_valid);
        assert_eq!(f.marker, 0x95);
        assert_eq!(f.src_addr, [0, 0, 0, 1]);
        assert_eq!(f.dst_addr, [0, 0, 0, 2]);
    }
}

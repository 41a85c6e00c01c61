//! Polling / scheduling state machine.
//!
//! One inverter at a time: transmit a poll, sweep RX channels for up to a
//! second collecting fragments, optionally re-fetch one missing fragment,
//! then decode and aggregate whatever arrived.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::address::serial_to_pipe_addr;
use crate::decode::{decode_fragment, AcPartial, DcPartial};
use crate::error::EngineError;
use crate::frame::{decode_response, encode_poll_request, encode_refetch_request};
use crate::measurement::{AcMeasurement, MeasurementRecord, StringMeasurement};
use crate::registry::{self, ModelDescriptor};
use crate::sink::Sink;
use crate::transceiver::Transceiver;

/// Tunable timing and channel-list parameters. Production defaults match
/// the documented values; tests shrink the durations so a full poll cycle
/// runs in milliseconds instead of seconds.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tx_channels: Vec<u8>,
    pub rx_channels: Vec<u8>,
    pub min_refresh_interval: Duration,
    pub rx_sweep_window: Duration,
    pub channel_hop_interval: Duration,
    pub idle_sleep_chunk: Duration,
    pub shutdown_at: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            tx_channels: vec![40],
            rx_channels: vec![3, 23, 61, 75, 83],
            min_refresh_interval: Duration::from_secs(30),
            rx_sweep_window: Duration::from_secs(1),
            channel_hop_interval: Duration::from_millis(5),
            idle_sleep_chunk: Duration::from_secs(30),
            shutdown_at: None,
        }
    }
}

struct InverterTarget {
    serial: String,
    model: ModelDescriptor,
    last_poll: Option<Instant>,
}

pub struct Engine<T: Transceiver> {
    radio: T,
    dtu_serial: String,
    config: EngineConfig,
    inverters: Vec<InverterTarget>,
    sinks: Vec<Box<dyn Sink>>,
    tx_idx: usize,
    rx_idx: usize,
    round_robin: usize,
    running: Arc<AtomicBool>,
}

struct ReceivedFragment {
    command: u8,
    rx_channel: u8,
    arrival_order: usize,
    latency: Duration,
    crc_valid: bool,
    payload: Vec<u8>,
}

enum PollOutcome {
    Complete(Vec<ReceivedFragment>),
    Timeout(Vec<ReceivedFragment>),
}

impl<T: Transceiver> Engine<T> {
    pub fn new(
        radio: T,
        dtu_serial: impl Into<String>,
        inverter_serials: &[String],
        config: EngineConfig,
        sinks: Vec<Box<dyn Sink>>,
        running: Arc<AtomicBool>,
    ) -> Self {
        let inverters = inverter_serials
            .iter()
            .map(|serial| {
                let prefix = crate::address::serial_prefix(serial).unwrap_or("");
                InverterTarget {
                    serial: serial.clone(),
                    model: registry::lookup(prefix),
                    last_poll: None,
                }
            })
            .collect();

        Engine {
            radio,
            dtu_serial: dtu_serial.into(),
            config,
            inverters,
            sinks,
            tx_idx: 0,
            rx_idx: 0,
            round_robin: 0,
            running,
        }
    }

    fn next_tx_channel(&mut self) -> u8 {
        let ch = self.config.tx_channels[self.tx_idx % self.config.tx_channels.len()];
        self.tx_idx = self.tx_idx.wrapping_add(1);
        ch
    }

    fn next_rx_channel(&mut self) -> u8 {
        let ch = self.config.rx_channels[self.rx_idx % self.config.rx_channels.len()];
        self.rx_idx = self.rx_idx.wrapping_add(1);
        ch
    }

    /// Finds the next inverter whose `min_refresh_interval` has elapsed,
    /// starting the scan at the current round-robin cursor. Returns the
    /// index, or `None` if a full lap found nothing eligible yet.
    fn next_due(&self) -> Option<usize> {
        let n = self.inverters.len();
        if n == 0 {
            return None;
        }
        for step in 0..n {
            let i = (self.round_robin + step) % n;
            let due = match self.inverters[i].last_poll {
                None => true,
                Some(t) => t.elapsed() >= self.config.min_refresh_interval,
            };
            if due {
                return Some(i);
            }
        }
        None
    }

    fn shutdown_matches(now_hhmm: &str, target: &str) -> bool {
        now_hhmm == target
    }

    /// Drives the engine until `running` is cleared or the configured
    /// shutdown time is reached.
    pub fn run(&mut self) -> Result<(), EngineError> {
        while self.running.load(Ordering::SeqCst) {
            if let Some(deadline) = self.config.shutdown_at.clone() {
                let now = chrono_like_hhmm();
                if Self::shutdown_matches(&now, &deadline) {
                    info!("reached configured shutdown time {}, powering down", deadline);
                    break;
                }
            }

            match self.next_due() {
                Some(idx) => {
                    self.round_robin = (idx + 1) % self.inverters.len();
                    self.poll_target(idx)?;
                }
                None => {
                    std::thread::sleep(self.config.idle_sleep_chunk.min(Duration::from_millis(50)));
                }
            }
        }
        self.radio.power_down()?;
        Ok(())
    }

    fn poll_target(&mut self, idx: usize) -> Result<(), EngineError> {
        let serial = self.inverters[idx].serial.clone();
        let model = self.inverters[idx].model;
        let prefix = crate::address::serial_prefix(&serial).unwrap_or("").to_string();

        let outcome = self.run_poll_cycle(&serial)?;
        self.inverters[idx].last_poll = Some(Instant::now());

        if !registry::is_known(&prefix) {
            warn!("{}", EngineError::UnknownModel(prefix));
            return Ok(());
        }

        let fragments = match outcome {
            PollOutcome::Complete(frags) => frags,
            PollOutcome::Timeout(frags) if frags.is_empty() => {
                warn!("poll of {} timed out with no fragments", serial);
                if let Some(t) = self.inverters[idx].last_poll {
                    self.inverters[idx].last_poll =
                        Some(t - self.config.min_refresh_interval / 2);
                }
                return Ok(());
            }
            PollOutcome::Timeout(frags) => frags,
        };

        let record = self.aggregate(&serial, &model, fragments);
        if log::log_enabled!(log::Level::Debug) {
            match serde_json::to_string(&record) {
                Ok(json) => debug!("record: {}", json),
                Err(e) => warn!("failed to serialize record for debug log: {}", e),
            }
        }
        for sink in self.sinks.iter_mut() {
            if !record.crc_valid {
                continue;
            }
            if let Err(e) = sink.publish(&record) {
                warn!("sink failed to publish record for {}: {}", serial, e);
            }
        }
        Ok(())
    }

    fn run_poll_cycle(&mut self, serial: &str) -> Result<PollOutcome, EngineError> {
        self.radio.flush_rx()?;
        self.radio.flush_tx()?;

        let tx_channel = self.next_tx_channel();
        self.radio.set_tx_channel(tx_channel)?;
        let pipe = serial_to_pipe_addr(serial)?;
        self.radio.open_write_pipe(pipe)?;

        let unix_ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        let request = encode_poll_request(serial, &self.dtu_serial, unix_ts)?;
        let t_tx = Instant::now();
        self.radio.send(&request)?;

        let rx_channel = self.next_rx_channel();
        self.radio.set_rx_channel(rx_channel)?;
        self.radio.begin_receive()?;

        let mut fragments: BTreeMap<u8, ReceivedFragment> = BTreeMap::new();
        let mut arrival_order = 0usize;
        let mut refetch_tries: Option<u8> = None;
        let expected = self.expected_fragment_count(serial);

        let deadline = t_tx + self.config.rx_sweep_window;
        let mut last_hop = Instant::now();

        while Instant::now() < deadline {
            match self.radio.try_receive()? {
                Some(raw) if raw.len() >= 11 => {
                    let frame = decode_response(&raw)?;
                    let latency = t_tx.elapsed();
                    let cmd = frame.command;
                    fragments.insert(
                        cmd,
                        ReceivedFragment {
                            command: cmd,
                            rx_channel: self.config.rx_channels[(self.rx_idx + self.config.rx_channels.len() - 1)
                                % self.config.rx_channels.len()],
                            arrival_order,
                            latency,
                            crc_valid: frame.crc_valid,
                            payload: frame.payload().to_vec(),
                        },
                    );
                    arrival_order += 1;

                    if fragments.len() >= expected as usize {
                        self.radio.end_receive()?;
                        return Ok(PollOutcome::Complete(fragments.into_values().collect()));
                    }

                    if let Some(hole) = self.find_fragment_gap(&fragments, expected) {
                        if matches!(refetch_tries, None | Some(0)) {
                            let refetch = encode_refetch_request(serial, &self.dtu_serial, hole)?;
                            self.radio.send(&refetch)?;
                            refetch_tries = Some(10);
                            debug!("requested re-fetch of fragment {} for {}", hole, serial);
                        }
                    }
                }
                Some(_) | None => {
                    if let Some(tries) = refetch_tries.as_mut() {
                        if *tries > 0 {
                            *tries -= 1;
                        }
                    }
                    if last_hop.elapsed() >= self.config.channel_hop_interval {
                        let ch = self.next_rx_channel();
                        self.radio.set_rx_channel(ch)?;
                        last_hop = Instant::now();
                    }
                }
            }
        }

        self.radio.end_receive()?;
        Ok(PollOutcome::Timeout(fragments.into_values().collect()))
    }

    fn expected_fragment_count(&self, serial: &str) -> u8 {
        let prefix = crate::address::serial_prefix(serial).unwrap_or("");
        registry::lookup(prefix).fragment_count
    }

    fn find_fragment_gap(&self, fragments: &BTreeMap<u8, ReceivedFragment>, expected: u8) -> Option<u8> {
        let highest = *fragments.keys().max()?;
        if highest <= 1 {
            return None;
        }
        for i in 1..=(highest.min(expected)) {
            if !fragments.contains_key(&i) {
                return Some(i);
            }
        }
        None
    }

    fn aggregate(&self, serial: &str, model: &ModelDescriptor, mut fragments: Vec<ReceivedFragment>) -> MeasurementRecord {
        fragments.sort_by_key(|f| f.command);

        let mut dc: BTreeMap<u8, DcPartial> = BTreeMap::new();
        let mut ac = AcPartial::default();
        let mut fragment_order = Vec::new();
        let mut rx_channels = Vec::new();
        let mut latencies = Vec::new();
        let mut crc_valid = true;

        for frag in &fragments {
            fragment_order.push(frag.command);
            rx_channels.push(frag.rx_channel);
            latencies.push(frag.latency.as_nanos() as i64);
            crc_valid &= frag.crc_valid;

            let decoded = decode_fragment(model.decoder, model.name, frag.command, &frag.payload);
            for (string_idx, partial) in decoded.dc {
                let entry = dc.entry(string_idx).or_default();
                merge_dc(entry, partial);
            }
            merge_ac(&mut ac, decoded.ac);
        }

        let string_count = dc.keys().max().copied().unwrap_or(0);
        let mut per_string = Vec::with_capacity(string_count as usize);
        for i in 1..=string_count {
            let mut partial = dc.get(&i).cloned().unwrap_or_default();

            // Some channels never report voltage directly; back-compute it
            // from power/current when current was seen, else clamp both to
            // zero rather than leave them contradictory.
            if partial.voltage.is_none() {
                match (partial.power, partial.current) {
                    (Some(p), Some(i)) if i != 0.0 => partial.voltage = Some(p / i),
                    (Some(_), Some(_)) => {
                        partial.voltage = Some(0.0);
                        partial.power = Some(0.0);
                    }
                    _ => {}
                }
            }

            let energy_total = match (partial.energy_total_high16, partial.energy_total_low32) {
                (Some(hi), Some(lo)) => Some(((hi as u64) << 16 | lo as u64) as f64),
                (None, Some(lo)) => Some(lo as f64),
                (Some(hi), None) => Some(((hi as u64) << 16) as f64),
                (None, None) => None,
            };
            per_string.push(StringMeasurement {
                voltage: partial.voltage,
                current: partial.current,
                power: partial.power,
                energy_today: partial.energy_today,
                energy_total,
            });
        }

        MeasurementRecord {
            inverter_serial: serial.to_string(),
            model_name: model.name.to_string(),
            timestamp_utc: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            tx_channel: self.config.tx_channels[(self.tx_idx + self.config.tx_channels.len() - 1)
                % self.config.tx_channels.len()],
            rx_channels,
            fragment_order,
            fragment_latencies_ns: latencies,
            per_string,
            ac: AcMeasurement {
                voltage: ac.voltage,
                current: ac.current,
                frequency: ac.frequency,
                power: ac.power,
                temperature: ac.temperature,
                load_pct: ac.load_pct,
            },
            crc_valid,
        }
    }
}

fn merge_dc(entry: &mut DcPartial, incoming: DcPartial) {
    entry.voltage = incoming.voltage.or(entry.voltage);
    entry.current = incoming.current.or(entry.current);
    entry.power = incoming.power.or(entry.power);
    entry.energy_today = incoming.energy_today.or(entry.energy_today);
    entry.energy_total_low32 = incoming.energy_total_low32.or(entry.energy_total_low32);
    entry.energy_total_high16 = incoming.energy_total_high16.or(entry.energy_total_high16);
}

fn merge_ac(entry: &mut AcPartial, incoming: AcPartial) {
    entry.voltage = incoming.voltage.or(entry.voltage);
    entry.current = incoming.current.or(entry.current);
    entry.frequency = incoming.frequency.or(entry.frequency);
    entry.power = incoming.power.or(entry.power);
    entry.temperature = incoming.temperature.or(entry.temperature);
    entry.load_pct = incoming.load_pct.or(entry.load_pct);
}

/// Wall-clock `HH:MM`, without pulling in a date/time crate.
fn chrono_like_hhmm() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let secs_of_day = now % 86_400;
    format!("{:02}:{:02}", secs_of_day / 3600, (secs_of_day % 3600) / 60)
}

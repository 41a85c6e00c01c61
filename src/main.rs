//! CLI front-end: wires configuration, the transceiver, sinks and the
//! polling engine together.
//!
//! Initializes logging, loads configuration, wires up sinks and a
//! cancellation flag, then drives the polling engine against whatever
//! `Transceiver` is linked in — this crate ships the protocol codec and
//! engine, not a concrete nRF24 driver.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

use ahoy_master::cli::Opt;
use ahoy_master::config;
use ahoy_master::engine::{Engine, EngineConfig};
use ahoy_master::mqtt_sink::MqttSink;
use ahoy_master::sink::{FileSink, NullSink, Sink};
use ahoy_master::transceiver::{self, RadioConfig, UnattachedRadio};

fn main() -> ExitCode {
    let opt = Opt::parse();

    stderrlog::new()
        .module(module_path!())
        .module("ahoy_master")
        .quiet(false)
        .verbosity(if opt.debug != 0 { 4 } else { 2 })
        .timestamp(stderrlog::Timestamp::Second)
        .init()
        .expect("failed to initialize logging");

    let file_cfg = match config::load(&opt.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("failed to load configuration {}: {}", opt.config, e);
            return ExitCode::FAILURE;
        }
    };

    if file_cfg.inverter_serials.is_empty() {
        warn!("no inverter serials configured in {}; nothing to poll", opt.config);
    }

    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
    if let Some(path) = &opt.file {
        sinks.push(Box::new(FileSink::new(path)));
    }
    if opt.mqtt != 0 {
        let host = file_cfg.mqtt.host.as_deref().unwrap_or("localhost");
        let port = file_cfg.mqtt.port.unwrap_or(1883);
        match MqttSink::connect(
            host,
            port,
            &file_cfg.dtu_serial,
            file_cfg.mqtt.user.as_deref(),
            file_cfg.mqtt.password.as_deref(),
            "ahoy",
        ) {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(e) => {
                error!("failed to connect to mqtt broker {}:{}: {}", host, port, e);
                return ExitCode::FAILURE;
            }
        }
    }
    if sinks.is_empty() {
        sinks.push(Box::new(NullSink));
    }

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("received interrupt, shutting down");
        handler_flag.store(false, Ordering::SeqCst);
    }) {
        warn!("failed to install Ctrl-C handler: {}", e);
    }

    let mut radio = UnattachedRadio;
    if let Err(e) = transceiver::configure(&mut radio, &RadioConfig::default()) {
        error!("radio initialization failed: {}", e);
        return ExitCode::FAILURE;
    }

    let engine_config = EngineConfig {
        min_refresh_interval: std::time::Duration::from_secs(opt.interval),
        shutdown_at: opt.end_at.clone(),
        ..EngineConfig::default()
    };

    let mut engine = Engine::new(
        radio,
        file_cfg.dtu_serial.clone(),
        &file_cfg.inverter_serials,
        engine_config,
        sinks,
        running,
    );

    match engine.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("engine exited with error: {}", e);
            ExitCode::FAILURE
        }
    }
}

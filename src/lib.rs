//! Protocol codec and polling engine for Hoymiles-family solar
//! micro-inverters, exposed as a library so the binary entrypoint and the
//! test suite share the same modules.

pub mod address;
pub mod cli;
pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod frame;
pub mod measurement;
pub mod mqtt_sink;
pub mod registry;
pub mod sink;
pub mod transceiver;

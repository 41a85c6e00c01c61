//! Command-line flags.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Polling master for Hoymiles-family micro-inverters")]
pub struct Opt {
    /// Configuration file location.
    #[arg(short = 'c', long, default_value = "ahoy.conf")]
    pub config: String,

    /// Enable message-bus publishing.
    #[arg(short = 'm', long, default_value_t = 0)]
    pub mqtt: u8,

    /// Enable verbose debug logging.
    #[arg(short = 'd', long, default_value_t = 0)]
    pub debug: u8,

    /// Minimum per-inverter poll interval, in seconds.
    #[arg(short = 'i', long, default_value_t = 30)]
    pub interval: u64,

    /// Append decoded records to this file.
    #[arg(short = 'f', long)]
    pub file: Option<String>,

    /// Terminate cleanly at this wall-clock minute, formatted HH:MM.
    #[arg(short = 'e', long)]
    pub end_at: Option<String>,
}

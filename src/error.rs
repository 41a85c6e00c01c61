use thiserror::Error;

/// Errors produced while deriving addresses, framing/parsing packets, and
/// running the polling engine.
///
/// Every variant corresponds to one row of the error-handling table: most
/// are non-fatal and only ever logged by the engine, never propagated past
/// a single poll cycle.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("radio initialization failed: {0}")]
    RadioInitFailure(String),

    #[error("serial number {0:?} is not a valid inverter serial")]
    InvalidSerial(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("frame failed outer CRC-8 check")]
    CrcMismatch,

    #[error("unknown model for serial prefix {0:?}")]
    UnknownModel(String),

    #[error("unknown command code {cmd:#04x} for model {model}")]
    UnknownCommand { model: String, cmd: u8 },

    #[error("poll timed out waiting for fragments")]
    PollTimeout,

    #[error("sink failed to publish record: {0}")]
    SinkFailure(String),
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TwampError {
    #[error("invalid {option}: {value} (expected {expected})")]
    InvalidOption {
        option: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("unknown DSCP name or value: {0}")]
    UnknownDscp(String),

    #[error("packet too short: {len} bytes (need {need})")]
    PacketTooShort { len: usize, need: usize },

    #[error("packet exceeds maximum size: {len} bytes (max {max})")]
    PacketTooLong { len: usize, max: usize },
}

use std::net::IpAddr;
use std::time::Duration;

use serde::Serialize;

use super::codec::MAX_PADDING;
use super::error::TwampError;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_COUNT: u16 = 100;
pub const MAX_COUNT: u16 = 9999;
pub const MIN_INTERVAL_MS: u64 = 10;
pub const MAX_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_INTERVAL_MS: u64 = 100;
pub const DEFAULT_TTL: u8 = 64;

/// Minimum drain window after the last scheduled transmission.
pub const MIN_GRACE: Duration = Duration::from_millis(100);

/// Sender session lifecycle.
///
/// Cancellation jumps to `Done` from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderState {
    Init,
    Sending,
    Drain,
    Done,
}

/// Parameters of a sender session.
#[derive(Debug, Clone)]
pub struct SenderSpec {
    pub destination: IpAddr,
    pub port: u16,
    pub count: u16,
    pub interval: Duration,
    pub padding: usize,
    pub ttl: u8,
    pub tos: u8,
    pub do_not_fragment: bool,
}

impl SenderSpec {
    pub fn validate(&self) -> Result<(), TwampError> {
        if self.port == 0 {
            return Err(invalid("port", self.port, "1-65535"));
        }
        if self.count == 0 || self.count > MAX_COUNT {
            return Err(invalid("count", self.count, "1-9999"));
        }
        let interval_ms = self.interval.as_millis() as u64;
        if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&interval_ms) {
            return Err(invalid("interval", interval_ms, "10-1000 ms"));
        }
        if self.padding > MAX_PADDING {
            return Err(invalid("padding", self.padding, "0-9000"));
        }
        if self.ttl == 0 {
            return Err(invalid("ttl", self.ttl, "1-255"));
        }
        if self.do_not_fragment && self.destination.is_ipv6() {
            return Err(TwampError::InvalidOption {
                option: "do-not-fragment",
                value: "ipv6".to_string(),
                expected: "IPv4 destination",
            });
        }
        Ok(())
    }

    /// Receive window kept open after the last scheduled send.
    pub fn grace(&self) -> Duration {
        (self.interval * 2).max(MIN_GRACE)
    }

    /// Offset from session start at which the receiver gives up.
    pub fn drain_deadline(&self) -> Duration {
        self.interval * u32::from(self.count) + self.grace()
    }
}

/// Parameters of a responder session.
#[derive(Debug, Clone)]
pub struct ResponderSpec {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub padding: usize,
    pub ttl: u8,
    pub tos: u8,
    pub do_not_fragment: bool,
    /// Reflector sequence reset for peers idle longer than this;
    /// zero disables.
    pub reset_timer: Duration,
}

impl ResponderSpec {
    pub fn validate(&self) -> Result<(), TwampError> {
        if self.port == 0 {
            return Err(invalid("port", self.port, "1-65535"));
        }
        if self.padding > MAX_PADDING {
            return Err(invalid("padding", self.padding, "0-9000"));
        }
        if self.ttl == 0 {
            return Err(invalid("ttl", self.ttl, "1-255"));
        }
        if self.do_not_fragment && self.bind_addr.is_ipv6() {
            return Err(TwampError::InvalidOption {
                option: "do-not-fragment",
                value: "ipv6".to_string(),
                expected: "IPv4 bind address",
            });
        }
        Ok(())
    }
}

fn invalid(option: &'static str, value: impl std::fmt::Display, expected: &'static str) -> TwampError {
    TwampError::InvalidOption {
        option,
        value: value.to_string(),
        expected,
    }
}

//! NTP 64-bit timestamps (RFC 1305) as used by TWAMP test packets:
//! 32-bit seconds since 1900-01-01 plus a 32-bit binary fraction, carried
//! big-endian on the wire.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
pub const NTP_UNIX_OFFSET: u32 = 2_208_988_800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NtpTimestamp {
    pub seconds: u32,
    pub fraction: u32,
}

impl NtpTimestamp {
    /// Capture the current wall-clock time.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let seconds = (since_epoch.as_secs() as u32).wrapping_add(NTP_UNIX_OFFSET);
        let fraction = ((u64::from(since_epoch.subsec_nanos()) << 32) / 1_000_000_000) as u32;
        Self { seconds, fraction }
    }

    pub fn to_bytes(self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&self.seconds.to_be_bytes());
        buf[4..8].copy_from_slice(&self.fraction.to_be_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            seconds: u32::from_be_bytes(bytes[0..4].try_into().unwrap()),
            fraction: u32::from_be_bytes(bytes[4..8].try_into().unwrap()),
        }
    }

    /// Total microseconds since the NTP epoch. Fits i64 comfortably
    /// (2^32 s ≈ 4.3e9 s ≈ 4.3e15 µs).
    fn total_micros(self) -> i64 {
        i64::from(self.seconds) * 1_000_000 + ((u64::from(self.fraction) * 1_000_000) >> 32) as i64
    }

    /// Signed microseconds elapsed from `earlier` to `self`.
    ///
    /// Negative results are possible between unsynchronized clocks and are
    /// reported as-is.
    pub fn micros_since(self, earlier: Self) -> i64 {
        self.total_micros() - earlier.total_micros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip() {
        let ts = NtpTimestamp {
            seconds: 0xDEAD_BEEF,
            fraction: 0x0102_0304,
        };
        assert_eq!(NtpTimestamp::from_bytes(&ts.to_bytes()), ts);
    }

    #[test]
    fn wire_format_is_big_endian() {
        let ts = NtpTimestamp {
            seconds: 1,
            fraction: 2,
        };
        assert_eq!(ts.to_bytes(), [0, 0, 0, 1, 0, 0, 0, 2]);
    }

    #[test]
    fn now_is_past_the_unix_epoch() {
        let ts = NtpTimestamp::now();
        assert!(ts.seconds > NTP_UNIX_OFFSET);
    }

    #[test]
    fn fraction_converts_to_micros() {
        let half_second = NtpTimestamp {
            seconds: 100,
            fraction: 1 << 31,
        };
        let whole = NtpTimestamp {
            seconds: 100,
            fraction: 0,
        };
        assert_eq!(half_second.micros_since(whole), 500_000);
    }

    #[test]
    fn negative_deltas_are_signed() {
        let a = NtpTimestamp {
            seconds: 10,
            fraction: 0,
        };
        let b = NtpTimestamp {
            seconds: 11,
            fraction: 0,
        };
        assert_eq!(a.micros_since(b), -1_000_000);
        assert_eq!(b.micros_since(a), 1_000_000);
    }

    #[test]
    fn monotone_between_calls() {
        let a = NtpTimestamp::now();
        let b = NtpTimestamp::now();
        assert!(b.micros_since(a) >= 0);
    }
}

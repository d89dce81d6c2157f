//! TWAMP Light wire formats (RFC 5357, unauthenticated mode).
//!
//! All multi-byte fields are network byte order. MBZ fields are zero-filled
//! on encode. Padding beyond the fixed fields is zero-filled and capped at
//! `MAX_PADDING`.

use super::error::TwampError;
use super::timestamp::NtpTimestamp;

/// Fixed bytes of a sender test packet: seq(4) + timestamp(8) + err(2).
pub const SENDER_PACKET_LEN: usize = 14;

/// Fixed bytes of a reflected test packet: seq(4) + ts(8) + err(2) + mbz(2)
/// + recv_ts(8) + sender_seq(4) + sender_ts(8) + sender_err(2) + mbz(2)
/// + sender_ttl(1).
pub const REFLECTED_PACKET_LEN: usize = 41;

/// Maximum padding bytes beyond the fixed fields.
pub const MAX_PADDING: usize = 9000;

/// Maximum acceptable datagram size.
pub const MAX_PACKET_LEN: usize = REFLECTED_PACKET_LEN + MAX_PADDING;

/// TTL value reported when the received TTL is unknown (RFC 5357 §4.2.1).
pub const TTL_UNKNOWN: u8 = 255;

// ── Sender test packet ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderPacket {
    pub seq: u32,
    pub timestamp: NtpTimestamp,
    pub err_estimate: u16,
}

impl SenderPacket {
    pub fn encode(&self, padding: usize) -> Result<Vec<u8>, TwampError> {
        if padding > MAX_PADDING {
            return Err(TwampError::PacketTooLong {
                len: SENDER_PACKET_LEN + padding,
                max: MAX_PACKET_LEN,
            });
        }
        let mut buf = vec![0u8; SENDER_PACKET_LEN + padding];
        buf[0..4].copy_from_slice(&self.seq.to_be_bytes());
        buf[4..12].copy_from_slice(&self.timestamp.to_bytes());
        buf[12..14].copy_from_slice(&self.err_estimate.to_be_bytes());
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, TwampError> {
        check_len(buf, SENDER_PACKET_LEN)?;
        Ok(Self {
            seq: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            timestamp: NtpTimestamp::from_bytes(&buf[4..12]),
            err_estimate: u16::from_be_bytes(buf[12..14].try_into().unwrap()),
        })
    }
}

// ── Reflected test packet ───────────────────────────────────────────

/// Reflector reply carrying both reflector timestamps and the echoed sender
/// fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReflectedPacket {
    /// Reflector sequence number.
    pub seq: u32,
    /// T3 — reflector transmit timestamp.
    pub timestamp: NtpTimestamp,
    pub err_estimate: u16,
    /// T2 — reflector receive timestamp.
    pub recv_timestamp: NtpTimestamp,
    /// Echo of the sender's sequence number.
    pub sender_seq: u32,
    /// Echo of T1, the sender's transmit timestamp.
    pub sender_timestamp: NtpTimestamp,
    pub sender_err_estimate: u16,
    pub sender_ttl: u8,
}

impl ReflectedPacket {
    pub fn encode(&self, padding: usize) -> Result<Vec<u8>, TwampError> {
        if padding > MAX_PADDING {
            return Err(TwampError::PacketTooLong {
                len: REFLECTED_PACKET_LEN + padding,
                max: MAX_PACKET_LEN,
            });
        }
        let mut buf = vec![0u8; REFLECTED_PACKET_LEN + padding];
        buf[0..4].copy_from_slice(&self.seq.to_be_bytes());
        buf[4..12].copy_from_slice(&self.timestamp.to_bytes());
        buf[12..14].copy_from_slice(&self.err_estimate.to_be_bytes());
        // 14..16 MBZ
        buf[16..24].copy_from_slice(&self.recv_timestamp.to_bytes());
        buf[24..28].copy_from_slice(&self.sender_seq.to_be_bytes());
        buf[28..36].copy_from_slice(&self.sender_timestamp.to_bytes());
        buf[36..38].copy_from_slice(&self.sender_err_estimate.to_be_bytes());
        // 38..40 MBZ
        buf[40] = self.sender_ttl;
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, TwampError> {
        check_len(buf, REFLECTED_PACKET_LEN)?;
        Ok(Self {
            seq: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            timestamp: NtpTimestamp::from_bytes(&buf[4..12]),
            err_estimate: u16::from_be_bytes(buf[12..14].try_into().unwrap()),
            recv_timestamp: NtpTimestamp::from_bytes(&buf[16..24]),
            sender_seq: u32::from_be_bytes(buf[24..28].try_into().unwrap()),
            sender_timestamp: NtpTimestamp::from_bytes(&buf[28..36]),
            sender_err_estimate: u16::from_be_bytes(buf[36..38].try_into().unwrap()),
            sender_ttl: buf[40],
        })
    }
}

fn check_len(buf: &[u8], need: usize) -> Result<(), TwampError> {
    if buf.len() < need {
        return Err(TwampError::PacketTooShort {
            len: buf.len(),
            need,
        });
    }
    if buf.len() > MAX_PACKET_LEN {
        return Err(TwampError::PacketTooLong {
            len: buf.len(),
            max: MAX_PACKET_LEN,
        });
    }
    Ok(())
}

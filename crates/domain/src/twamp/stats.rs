//! Per-direction delay statistics over matched test packets.

use serde::Serialize;

use super::entity::SenderState;
use super::timestamp::NtpTimestamp;

/// One matched test packet with its four timestamps reduced to delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub seq: u32,
    /// `t2 - t1`, signed: sender and reflector clocks may disagree.
    pub outbound_us: i64,
    /// `t4 - t3`, signed.
    pub inbound_us: i64,
    /// `(t4 - t1) - (t3 - t2)`, clamped to zero.
    pub roundtrip_us: i64,
    /// Whether the round-trip value had to be clamped.
    pub clamped: bool,
}

impl Sample {
    /// Reduce the four session timestamps to per-direction delays.
    ///
    /// The round trip excludes reflector processing time and cannot be
    /// negative on a sane clock; a negative result is clamped and flagged.
    pub fn from_timestamps(
        seq: u32,
        t1: NtpTimestamp,
        t2: NtpTimestamp,
        t3: NtpTimestamp,
        t4: NtpTimestamp,
    ) -> Self {
        let roundtrip = t4.micros_since(t1) - t3.micros_since(t2);
        Self {
            seq,
            outbound_us: t2.micros_since(t1),
            inbound_us: t4.micros_since(t3),
            roundtrip_us: roundtrip.max(0),
            clamped: roundtrip < 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DirectionStats {
    pub min_us: i64,
    pub max_us: i64,
    pub avg_us: f64,
    /// Mean absolute difference between consecutive samples (seq order).
    pub jitter_us: f64,
}

fn direction_stats(values: &[i64]) -> Option<DirectionStats> {
    if values.is_empty() {
        return None;
    }
    let min_us = *values.iter().min().unwrap();
    let max_us = *values.iter().max().unwrap();
    let avg_us = values.iter().sum::<i64>() as f64 / values.len() as f64;
    let jitter_us = if values.len() > 1 {
        values
            .windows(2)
            .map(|w| (w[1] - w[0]).abs() as f64)
            .sum::<f64>()
            / (values.len() - 1) as f64
    } else {
        0.0
    };
    Some(DirectionStats {
        min_us,
        max_us,
        avg_us,
        jitter_us,
    })
}

/// Final result of a sender session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub state: SenderState,
    pub sent: u32,
    pub matched: u32,
    pub lost: u32,
    pub loss_pct: f64,
    pub outbound: Option<DirectionStats>,
    pub inbound: Option<DirectionStats>,
    pub roundtrip: Option<DirectionStats>,
    /// Round trips clamped to zero because of clock skew.
    pub clamped_roundtrips: u32,
}

impl SessionReport {
    /// Aggregate matched samples into the final report.
    ///
    /// `sent` is the number of packets actually transmitted — for a
    /// canceled session that can be below the configured count, so the
    /// partial report still satisfies `matched + lost = sent`.
    pub fn compute(state: SenderState, sent: u32, samples: &[Sample]) -> Self {
        let mut ordered: Vec<&Sample> = samples.iter().collect();
        ordered.sort_by_key(|s| s.seq);

        let outbound: Vec<i64> = ordered.iter().map(|s| s.outbound_us).collect();
        let inbound: Vec<i64> = ordered.iter().map(|s| s.inbound_us).collect();
        let roundtrip: Vec<i64> = ordered.iter().map(|s| s.roundtrip_us).collect();

        let matched = ordered.len() as u32;
        let lost = sent.saturating_sub(matched);
        let loss_pct = if sent > 0 {
            f64::from(lost) / f64::from(sent) * 100.0
        } else {
            0.0
        };

        Self {
            state,
            sent,
            matched,
            lost,
            loss_pct,
            outbound: direction_stats(&outbound),
            inbound: direction_stats(&inbound),
            roundtrip: direction_stats(&roundtrip),
            clamped_roundtrips: ordered.iter().filter(|s| s.clamped).count() as u32,
        }
    }
}

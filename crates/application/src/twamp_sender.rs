//! TWAMP Light session sender.
//!
//! Two concurrent activities over one connected socket: a pacer that emits
//! `count` packets on an absolute schedule (`t_k = t_0 + k·interval`), and a
//! receiver that matches reflections by sender sequence number until the
//! drain deadline. Per-packet errors never end the session; ICMP-derived
//! socket errors from an absent responder simply count as loss.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use domain::common::error::CoreError;
use domain::twamp::codec::{MAX_PACKET_LEN, ReflectedPacket, SenderPacket};
use domain::twamp::entity::{SenderSpec, SenderState};
use domain::twamp::stats::{Sample, SessionReport};
use domain::twamp::timestamp::NtpTimestamp;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct TwampSender {
    socket: UdpSocket,
    spec: SenderSpec,
}

impl TwampSender {
    pub fn new(socket: UdpSocket, spec: SenderSpec) -> Self {
        Self { socket, spec }
    }

    /// Run the session to completion or cancellation.
    ///
    /// Cancellation stops the pacer immediately, keeps the receiver open
    /// for up to the grace window, and returns partial statistics over the
    /// packets actually sent. A cancel that lands before the first packet
    /// goes out has nothing to report and returns `Canceled` instead.
    pub async fn run(self, cancel: CancellationToken) -> Result<SessionReport, CoreError> {
        self.spec.validate().map_err(CoreError::from)?;

        let socket = Arc::new(self.socket);
        socket
            .connect((self.spec.destination, self.spec.port))
            .await
            .map_err(|e| CoreError::Network(format!("connect: {e}")))?;

        info!(
            destination = %self.spec.destination,
            port = self.spec.port,
            count = self.spec.count,
            interval_ms = self.spec.interval.as_millis() as u64,
            "TWAMP sender starting"
        );

        let start = Instant::now();
        let sent = Arc::new(AtomicU32::new(0));
        let sent_times: Arc<Mutex<HashMap<u32, NtpTimestamp>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let mut pacer = tokio::spawn(pace(
            socket.clone(),
            self.spec.clone(),
            start,
            sent.clone(),
            sent_times.clone(),
            cancel.clone(),
        ));

        let mut state = SenderState::Sending;
        let mut pacer_done = false;
        let mut canceled = false;
        let mut deadline = start + self.spec.drain_deadline();
        let mut samples: Vec<Sample> = Vec::new();
        let mut seen: HashSet<u32> = HashSet::new();
        let mut buf = vec![0u8; MAX_PACKET_LEN + 1];

        loop {
            if pacer_done && samples.len() as u32 >= sent.load(Ordering::Acquire) {
                break;
            }

            tokio::select! {
                () = cancel.cancelled(), if !canceled => {
                    canceled = true;
                    state = SenderState::Drain;
                    let cut = Instant::now() + self.spec.grace();
                    deadline = deadline.min(cut);
                    info!("sender canceled, draining in-flight reflections");
                }
                result = &mut pacer, if !pacer_done => {
                    pacer_done = true;
                    if result.is_err() {
                        warn!("pacer task failed");
                    }
                    if state == SenderState::Sending {
                        state = SenderState::Drain;
                        debug!(sent = sent.load(Ordering::Acquire), "all packets sent, draining");
                    }
                }
                () = tokio::time::sleep_until(deadline) => {
                    let outstanding =
                        sent.load(Ordering::Acquire).saturating_sub(samples.len() as u32);
                    if outstanding > 0 {
                        // Non-fatal per the session contract: report the
                        // timeout and return what was matched.
                        let timeout = CoreError::Timeout(format!(
                            "drain window expired with {outstanding} reflection(s) outstanding"
                        ));
                        warn!(%timeout, "returning partial statistics");
                    }
                    break;
                }
                received = socket.recv(&mut buf) => {
                    let t4 = NtpTimestamp::now();
                    let len = match received {
                        Ok(len) => len,
                        Err(e) => {
                            // Typically ECONNREFUSED bounced back from an
                            // absent responder; lost packets show up in the
                            // loss figure instead.
                            debug!(error = %e, "receive error ignored");
                            continue;
                        }
                    };
                    let reply = match ReflectedPacket::decode(&buf[..len]) {
                        Ok(reply) => reply,
                        Err(e) => {
                            debug!(len, error = %e, "dropping malformed reflection");
                            continue;
                        }
                    };
                    let Some(t1) = sent_times.lock().unwrap().get(&reply.sender_seq).copied() else {
                        debug!(seq = reply.sender_seq, "reflection for unknown sequence");
                        continue;
                    };
                    if !seen.insert(reply.sender_seq) {
                        debug!(seq = reply.sender_seq, "duplicate reflection ignored");
                        continue;
                    }
                    let sample = Sample::from_timestamps(
                        reply.sender_seq,
                        t1,
                        reply.recv_timestamp,
                        reply.timestamp,
                        t4,
                    );
                    if sample.clamped {
                        warn!(seq = sample.seq, "negative round trip clamped to zero");
                    }
                    samples.push(sample);
                }
            }
        }

        if !pacer_done {
            pacer.abort();
        }

        let transmitted = sent.load(Ordering::Acquire);
        if cancel.is_cancelled() && transmitted == 0 {
            return Err(CoreError::Canceled);
        }

        let report = SessionReport::compute(SenderState::Done, transmitted, &samples);
        info!(
            sent = report.sent,
            matched = report.matched,
            loss_pct = report.loss_pct,
            "TWAMP sender finished"
        );
        Ok(report)
    }
}

/// Emit `count` packets on the absolute schedule, stamping `t1` right
/// before each send. Sends are counted as transmitted even when the
/// syscall fails, so loss is computed over the full schedule.
async fn pace(
    socket: Arc<UdpSocket>,
    spec: SenderSpec,
    start: Instant,
    sent: Arc<AtomicU32>,
    sent_times: Arc<Mutex<HashMap<u32, NtpTimestamp>>>,
    cancel: CancellationToken,
) {
    for k in 0..u32::from(spec.count) {
        let tick = start + spec.interval * k;
        tokio::select! {
            // Cancellation wins over a due tick.
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep_until(tick) => {}
        }

        let t1 = NtpTimestamp::now();
        let packet = SenderPacket {
            seq: k,
            timestamp: t1,
            err_estimate: 0,
        };
        let payload = match packet.encode(spec.padding) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(seq = k, error = %e, "packet encode failed");
                return;
            }
        };

        sent_times.lock().unwrap().insert(k, t1);
        sent.fetch_add(1, Ordering::Release);
        if let Err(e) = socket.send(&payload).await {
            debug!(seq = k, error = %e, "send error ignored");
        }
    }
}

#![no_main]

use libfuzzer_sys::fuzz_target;

use domain::twamp::codec::{ReflectedPacket, SenderPacket};
use domain::twamp::timestamp::NtpTimestamp;

// Fuzz the TWAMP wire codec: arbitrary datagrams through the decoders and
// fuzz-built packets through encode -> decode round trips.
//
// Layout:
//   [0]    = selector (0=decode raw, 1=sender round trip, 2=reflect round trip)
//   [1..3] = padding length
//   rest   = packet fields / raw datagram
fuzz_target!(|data: &[u8]| {
    if data.len() < 44 {
        return;
    }

    let selector = data[0] % 3;
    let padding = usize::from(u16::from_le_bytes([data[1], data[2]])) % 9001;
    let body = &data[3..];

    match selector {
        0 => {
            // Decoders must never panic, whatever arrives on the socket.
            let _ = SenderPacket::decode(body);
            let _ = ReflectedPacket::decode(body);
        }
        1 => {
            let packet = SenderPacket {
                seq: u32::from_le_bytes([body[0], body[1], body[2], body[3]]),
                timestamp: NtpTimestamp::from_bytes(&body[4..12]),
                err_estimate: u16::from_le_bytes([body[12], body[13]]),
            };
            let wire = packet.encode(padding).expect("padding is in range");
            assert_eq!(SenderPacket::decode(&wire).unwrap(), packet);
        }
        _ => {
            let packet = ReflectedPacket {
                seq: u32::from_le_bytes([body[0], body[1], body[2], body[3]]),
                timestamp: NtpTimestamp::from_bytes(&body[4..12]),
                err_estimate: u16::from_le_bytes([body[12], body[13]]),
                recv_timestamp: NtpTimestamp::from_bytes(&body[14..22]),
                sender_seq: u32::from_le_bytes([body[22], body[23], body[24], body[25]]),
                sender_timestamp: NtpTimestamp::from_bytes(&body[26..34]),
                sender_err_estimate: u16::from_le_bytes([body[34], body[35]]),
                sender_ttl: body[36],
            };
            let wire = packet.encode(padding).expect("padding is in range");
            assert_eq!(ReflectedPacket::decode(&wire).unwrap(), packet);
            // MBZ bytes are zero on the wire.
            assert_eq!(&wire[14..16], &[0, 0]);
            assert_eq!(&wire[38..40], &[0, 0]);
        }
    }
});

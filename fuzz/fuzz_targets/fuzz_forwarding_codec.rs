#![no_main]

use libfuzzer_sys::fuzz_target;

use domain::forwarding::codec::{decode_key, decode_value, encode_key, encode_value};
use domain::forwarding::entity::ForwardingRule;
use ebpf_common::forwarding::{ActionStep, ForwardingKey, ForwardingValue, MAX_ACTIONS};

// Fuzz the map codec from both sides: arbitrary records through the
// decoders, and fuzz-built rules through encode -> decode round trips.
//
// Layout:
//   [0]      = selector (0=decode arbitrary records, 1=round trip)
//   [1..19]  = rule fields / ifindexes
//   [19..]   = consumed in 8-byte chunks as arbitrary action steps
fuzz_target!(|data: &[u8]| {
    if data.len() < 19 + 8 * MAX_ACTIONS {
        return;
    }

    let selector = data[0] % 2;

    if selector == 0 {
        // Decoders must never panic on records the kernel (or a buggy
        // writer) could hand back.
        let key = ForwardingKey {
            ingress_ifindex: u32::from_le_bytes([data[1], data[2], data[3], data[4]]),
            vlan_id: u16::from_le_bytes([data[5], data[6]]),
            svlan_id: u16::from_le_bytes([data[7], data[8]]),
            bmac: [data[9], data[10], data[11], data[12], data[13], data[14]],
            pad: [data[15], data[16]],
        };
        let _ = decode_key(&key);

        let mut steps = [ActionStep::NONE; MAX_ACTIONS];
        for (slot, chunk) in data[19..].chunks_exact(8).take(MAX_ACTIONS).enumerate() {
            steps[slot] = ActionStep {
                kind: chunk[0],
                tag_type: chunk[1],
                vlan_id: u16::from_le_bytes([chunk[2], chunk[3]]),
                target_ifindex: u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
            };
        }
        let value = ForwardingValue {
            num_actions: data[17],
            steps,
            pad: [0; 9],
        };
        let _ = decode_value(&value);
        return;
    }

    // Build a rule from the bytes; out-of-range fields must be rejected by
    // the encoder, in-range fields must round-trip exactly.
    let vlan = |b: u8, c: u8| -> Option<u16> {
        let raw = u16::from_le_bytes([b, c]);
        (raw != 0).then_some((raw - 1) % 4094 + 1)
    };
    let rule = ForwardingRule {
        name: "fuzz".to_string(),
        in_interface: "eth0".to_string(),
        svlan: vlan(data[1], data[2]),
        cvlan: vlan(data[3], data[4]),
        out_interface: "eth1".to_string(),
        pop_tags: data[5] % 3,
        push_svlan: vlan(data[6], data[7]),
        push_cvlan: vlan(data[8], data[9]),
        active: true,
        auto_inverse: false,
        origin_name: None,
    };
    let ingress = u32::from_le_bytes([data[10], data[11], data[12], data[13]]);
    let egress = u32::from_le_bytes([data[14], data[15], data[16], data[17]]);

    let key = encode_key(ingress, &rule);
    let decoded_key = decode_key(&key);
    assert_eq!(decoded_key.ingress_ifindex, ingress);
    assert_eq!(decoded_key.svlan, rule.svlan);
    assert_eq!(decoded_key.cvlan, rule.cvlan);

    if let Ok(value) = encode_value(&rule, egress) {
        let decoded = decode_value(&value).expect("encoder output must decode");
        assert_eq!(decoded.pop_tags, rule.pop_tags);
        assert_eq!(decoded.push_svlan, rule.push_svlan);
        assert_eq!(decoded.push_cvlan, rule.push_cvlan);
        assert_eq!(decoded.target_ifindex, egress);
    }
});

//! Projection between rules and the kernel map records.
//!
//! Produces the `#[repr(C)]` records the data plane expects (see
//! `ebpf_common::forwarding` for the layouts). Pops are emitted first, then
//! pushes innermost-first — the data plane prepends each pushed tag as the
//! new outermost header, so emitting the C-VLAN before the S-VLAN leaves the
//! S-tag outer — then the terminal forward.

use ebpf_common::forwarding::{
    ACTION_FORWARD, ACTION_POP, ACTION_PUSH, ActionStep, ForwardingKey, ForwardingValue,
    MAX_ACTIONS, TAG_CVLAN, TAG_NONE, TAG_SVLAN,
};

use super::entity::{ForwardingRule, VLAN_MAX, VLAN_MIN};
use super::error::ForwardingError;

/// Match fields recovered from a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedKey {
    pub ingress_ifindex: u32,
    pub svlan: Option<u16>,
    pub cvlan: Option<u16>,
}

/// Action fields recovered from a map value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedValue {
    pub pop_tags: u8,
    pub push_svlan: Option<u16>,
    pub push_cvlan: Option<u16>,
    pub target_ifindex: u32,
}

/// Encode the lookup key for a rule on its resolved ingress interface.
///
/// Absent match tags encode as 0; the reserved B-MAC field is zero-filled.
pub fn encode_key(ingress_ifindex: u32, rule: &ForwardingRule) -> ForwardingKey {
    ForwardingKey::new(
        ingress_ifindex,
        rule.cvlan.unwrap_or(0),
        rule.svlan.unwrap_or(0),
    )
}

/// Encode the action list for a rule with its resolved egress interface.
///
/// Rejects rules whose projection exceeds the data plane's step budget or
/// whose tag IDs fall outside 1..=4094.
pub fn encode_value(
    rule: &ForwardingRule,
    egress_ifindex: u32,
) -> Result<ForwardingValue, ForwardingError> {
    for (field, value) in [
        ("svlan", rule.svlan),
        ("cvlan", rule.cvlan),
        ("push_svlan", rule.push_svlan),
        ("push_cvlan", rule.push_cvlan),
    ] {
        if let Some(vlan) = value {
            if !(VLAN_MIN..=VLAN_MAX).contains(&vlan) {
                return Err(ForwardingError::InvalidVlanId { field, vlan });
            }
        }
    }

    let count = rule.pop_tags as usize + rule.pushed_tags() as usize + 1;
    if count > MAX_ACTIONS {
        return Err(ForwardingError::TooManyActions {
            count,
            max: MAX_ACTIONS,
        });
    }

    let mut steps = [ActionStep::NONE; MAX_ACTIONS];
    let mut slot = 0;
    for _ in 0..rule.pop_tags {
        steps[slot] = ActionStep {
            kind: ACTION_POP,
            tag_type: TAG_NONE,
            vlan_id: 0,
            target_ifindex: 0,
        };
        slot += 1;
    }
    if let Some(vlan) = rule.push_cvlan {
        steps[slot] = ActionStep {
            kind: ACTION_PUSH,
            tag_type: TAG_CVLAN,
            vlan_id: vlan,
            target_ifindex: 0,
        };
        slot += 1;
    }
    if let Some(vlan) = rule.push_svlan {
        steps[slot] = ActionStep {
            kind: ACTION_PUSH,
            tag_type: TAG_SVLAN,
            vlan_id: vlan,
            target_ifindex: 0,
        };
        slot += 1;
    }
    steps[slot] = ActionStep {
        kind: ACTION_FORWARD,
        tag_type: TAG_NONE,
        vlan_id: 0,
        target_ifindex: egress_ifindex,
    };

    Ok(ForwardingValue {
        num_actions: count as u8,
        steps,
        pad: [0; 9],
    })
}

/// Decode a map key back to its match fields.
pub fn decode_key(key: &ForwardingKey) -> DecodedKey {
    DecodedKey {
        ingress_ifindex: key.ingress_ifindex,
        svlan: (key.svlan_id != 0).then_some(key.svlan_id),
        cvlan: (key.vlan_id != 0).then_some(key.vlan_id),
    }
}

/// Decode a map value back to its action fields.
///
/// Enforces the canonical step shape: pops, then pushes, then exactly one
/// terminal forward.
pub fn decode_value(value: &ForwardingValue) -> Result<DecodedValue, ForwardingError> {
    let num_actions = value.num_actions as usize;
    if num_actions == 0 || num_actions > MAX_ACTIONS {
        return Err(ForwardingError::MalformedRecord("invalid action count"));
    }

    let mut pop_tags = 0u8;
    let mut push_svlan = None;
    let mut push_cvlan = None;
    let mut target_ifindex = None;

    for step in value.steps.iter().take(num_actions) {
        // Copy out: the step array is packed, so fields must not be
        // borrowed in place.
        let step = *step;

        if target_ifindex.is_some() {
            return Err(ForwardingError::MalformedRecord(
                "steps after the terminal forward",
            ));
        }

        match step.kind {
            ACTION_POP => {
                if push_svlan.is_some() || push_cvlan.is_some() {
                    return Err(ForwardingError::MalformedRecord("pop after push"));
                }
                pop_tags += 1;
            }
            ACTION_PUSH => match step.tag_type {
                TAG_SVLAN => push_svlan = Some(step.vlan_id),
                TAG_CVLAN => push_cvlan = Some(step.vlan_id),
                _ => return Err(ForwardingError::MalformedRecord("push without tag type")),
            },
            ACTION_FORWARD => target_ifindex = Some(step.target_ifindex),
            _ => return Err(ForwardingError::MalformedRecord("unknown action kind")),
        }
    }

    let target_ifindex = target_ifindex
        .ok_or(ForwardingError::MalformedRecord("missing terminal forward"))?;

    Ok(DecodedValue {
        pop_tags,
        push_svlan,
        push_cvlan,
        target_ifindex,
    })
}

//! Egress pair derivation.
//!
//! Every active user rule gets a computed inverse that matches the frame as
//! it leaves the rule's actions and restores the original tag stack on the
//! way back. The derivation runs on a two-slot tag model: a frame carries at
//! most an S-VLAN (outer) and a C-VLAN (inner); a pop clears the outer
//! occupied slot, a push sets its slot.

use super::entity::{ForwardingRule, inverse_name};

/// Frame tag state as the data plane keys it: S-VLAN outer, C-VLAN inner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TagPair {
    svlan: Option<u16>,
    cvlan: Option<u16>,
}

impl TagPair {
    fn pop_outer(&mut self) {
        if self.svlan.take().is_none() {
            self.cvlan = None;
        }
    }
}

/// Apply a rule's pops and pushes to its matched tag state.
fn state_after(rule: &ForwardingRule) -> TagPair {
    let mut pair = TagPair {
        svlan: rule.svlan,
        cvlan: rule.cvlan,
    };
    for _ in 0..rule.pop_tags {
        pair.pop_outer();
    }
    if let Some(vlan) = rule.push_svlan {
        pair.svlan = Some(vlan);
    }
    if let Some(vlan) = rule.push_cvlan {
        pair.cvlan = Some(vlan);
    }
    pair
}

/// Derive the egress pair for a user rule.
///
/// The inverse matches the post-rule tag state on the rule's output
/// interface, pops whatever the rule pushed, and re-pushes every original
/// match tag that is no longer on the frame.
pub fn derive_inverse(rule: &ForwardingRule) -> ForwardingRule {
    let egress_match = state_after(rule);
    let egress_pops = rule.pushed_tags();

    let mut after_egress_pops = egress_match;
    for _ in 0..egress_pops {
        after_egress_pops.pop_outer();
    }

    let push_svlan = rule.svlan.filter(|&v| after_egress_pops.svlan != Some(v));
    let push_cvlan = rule.cvlan.filter(|&v| after_egress_pops.cvlan != Some(v));

    ForwardingRule {
        name: inverse_name(&rule.name),
        in_interface: rule.out_interface.clone(),
        svlan: egress_match.svlan,
        cvlan: egress_match.cvlan,
        out_interface: rule.in_interface.clone(),
        pop_tags: egress_pops,
        push_svlan,
        push_cvlan,
        active: rule.active,
        auto_inverse: true,
        origin_name: Some(rule.name.clone()),
    }
}

//! Shared ABI for the transparent L2 forwarding table.
//!
//! These layouts are the kernel contract: the data-plane program looks up
//! `ForwardingKey` in a per-interface hash map and executes the steps in the
//! matching `ForwardingValue`. Field order, widths, and padding are part of
//! the ABI and must stay bit-for-bit stable.

/// Action step kinds — used in `ActionStep.kind`.
pub const ACTION_NONE: u8 = 0;
pub const ACTION_FORWARD: u8 = 1;
pub const ACTION_PUSH: u8 = 2;
pub const ACTION_POP: u8 = 3;

/// VLAN tag kinds — used in `ActionStep.tag_type`.
pub const TAG_NONE: u8 = 0;
pub const TAG_CVLAN: u8 = 1;
pub const TAG_SVLAN: u8 = 2;

/// Maximum action steps a single rule may encode.
///
/// Must match the data-plane loop bound; a pop + two pushes + forward fits
/// with one slot to spare.
pub const MAX_ACTIONS: usize = 5;

/// Hash map capacity per ingress interface. Must match the data-plane
/// object's `max_entries`.
pub const MAX_FORWARDING_ENTRIES: u32 = 4096;

/// Lookup key for the per-interface forwarding map (16 bytes).
///
/// `vlan_id` carries the outer 802.1Q (C-VLAN) match and `svlan_id` the
/// 802.1ad (S-VLAN) match; `0` means the tag is absent from the match.
/// `bmac` is reserved for PBB B-MAC matching and is always zero-filled.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ForwardingKey {
    pub ingress_ifindex: u32,
    pub vlan_id: u16,
    pub svlan_id: u16,
    pub bmac: [u8; 6],
    pub pad: [u8; 2],
}

impl ForwardingKey {
    /// Key for the given ingress interface and match tags; reserved fields
    /// zero-filled.
    pub fn new(ingress_ifindex: u32, vlan_id: u16, svlan_id: u16) -> Self {
        Self {
            ingress_ifindex,
            vlan_id,
            svlan_id,
            bmac: [0; 6],
            pad: [0; 2],
        }
    }
}

/// A single data-plane action (8 bytes, packed).
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionStep {
    /// `ACTION_FORWARD`, `ACTION_PUSH`, or `ACTION_POP`.
    pub kind: u8,
    /// `TAG_CVLAN` / `TAG_SVLAN` for pushes, `TAG_NONE` otherwise.
    pub tag_type: u8,
    /// VLAN ID for push steps, 0 otherwise.
    pub vlan_id: u16,
    /// Egress ifindex for the terminal forward step, 0 otherwise.
    pub target_ifindex: u32,
}

impl ActionStep {
    /// An empty slot: the data plane stops at `num_actions`, the rest stay
    /// zeroed.
    pub const NONE: Self = Self {
        kind: ACTION_NONE,
        tag_type: TAG_NONE,
        vlan_id: 0,
        target_ifindex: 0,
    };
}

/// Action list stored per key (50 bytes).
///
/// Only the first `num_actions` steps are executed; the rest are zeroed.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardingValue {
    pub num_actions: u8,
    pub steps: [ActionStep; MAX_ACTIONS],
    pub pad: [u8; 9],
}

#[cfg(feature = "user")]
mod user {
    use super::{ActionStep, ForwardingKey, ForwardingValue};

    // SAFETY: plain-old-data layouts with no invalid bit patterns.
    unsafe impl aya::Pod for ForwardingKey {}
    unsafe impl aya::Pod for ActionStep {}
    unsafe impl aya::Pod for ForwardingValue {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_16_bytes() {
        assert_eq!(core::mem::size_of::<ForwardingKey>(), 16);
    }

    #[test]
    fn step_is_8_bytes() {
        assert_eq!(core::mem::size_of::<ActionStep>(), 8);
    }

    #[test]
    fn value_is_50_bytes() {
        assert_eq!(core::mem::size_of::<ForwardingValue>(), 50);
    }

    #[test]
    fn value_has_byte_alignment() {
        // The 50-byte layout only exists if no padding is inserted after
        // `num_actions`, which requires the packed step array.
        assert_eq!(core::mem::align_of::<ForwardingValue>(), 1);
    }

    #[test]
    fn new_key_zero_fills_reserved_fields() {
        let key = ForwardingKey::new(7, 10, 100);
        assert_eq!(key.bmac, [0; 6]);
        assert_eq!(key.pad, [0; 2]);
        assert_eq!(key.vlan_id, 10);
        assert_eq!(key.svlan_id, 100);
    }
}

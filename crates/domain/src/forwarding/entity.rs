use serde::{Deserialize, Serialize};

use super::error::ForwardingError;

/// Prefix reserved for auto-generated egress pair rules.
pub const INVERSE_PREFIX: &str = "egress-";

/// Maximum rule name length, excluding any reserved prefix.
pub const MAX_NAME_LEN: usize = 31;

/// VLAN ID range valid for matching and pushing (0 is "absent", 4095 reserved).
pub const VLAN_MIN: u16 = 1;
pub const VLAN_MAX: u16 = 4094;

// ── Rule ────────────────────────────────────────────────────────────

/// A named transparent-forwarding entry.
///
/// Matches ingress traffic on `(in_interface, svlan, cvlan)` and rewrites it
/// with `pop_tags` pops followed by the configured pushes, then forwards out
/// of `out_interface`. `auto_inverse` marks the derived egress pair; its
/// `origin_name` points back to the user rule it was computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingRule {
    pub name: String,
    pub in_interface: String,
    pub svlan: Option<u16>,
    pub cvlan: Option<u16>,
    pub out_interface: String,
    pub pop_tags: u8,
    pub push_svlan: Option<u16>,
    pub push_cvlan: Option<u16>,
    pub active: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_inverse: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_name: Option<String>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Projected match identity of a rule: two active rules with the same key
/// would collide in the same kernel map slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchKey {
    pub in_interface: String,
    pub svlan: Option<u16>,
    pub cvlan: Option<u16>,
}

impl ForwardingRule {
    /// Number of VLAN tags the match criteria describe.
    pub fn matched_tags(&self) -> u8 {
        u8::from(self.svlan.is_some()) + u8::from(self.cvlan.is_some())
    }

    /// Number of tags this rule pushes.
    pub fn pushed_tags(&self) -> u8 {
        u8::from(self.push_svlan.is_some()) + u8::from(self.push_cvlan.is_some())
    }

    pub fn match_key(&self) -> MatchKey {
        MatchKey {
            in_interface: self.in_interface.clone(),
            svlan: self.svlan,
            cvlan: self.cvlan,
        }
    }

    /// Validate all fields.
    ///
    /// `allow_hairpin` permits `in_interface == out_interface`, which is
    /// rejected by default.
    pub fn validate(&self, allow_hairpin: bool) -> Result<(), ForwardingError> {
        validate_name(&self.name)?;
        self.validate_fields(allow_hairpin)
    }

    /// Validate everything except the name.
    ///
    /// Used for targeted updates of auto-generated egress rules, whose names
    /// carry the reserved prefix by construction.
    pub fn validate_fields(&self, allow_hairpin: bool) -> Result<(), ForwardingError> {
        for (field, value) in [
            ("svlan", self.svlan),
            ("cvlan", self.cvlan),
            ("push_svlan", self.push_svlan),
            ("push_cvlan", self.push_cvlan),
        ] {
            if let Some(vlan) = value {
                if !(VLAN_MIN..=VLAN_MAX).contains(&vlan) {
                    return Err(ForwardingError::InvalidVlanId { field, vlan });
                }
            }
        }

        if self.pop_tags > self.matched_tags() {
            return Err(ForwardingError::PopExceedsMatch {
                pop_tags: self.pop_tags,
                matched: self.matched_tags(),
            });
        }

        if self.in_interface.is_empty() || self.out_interface.is_empty() {
            return Err(ForwardingError::InvalidName {
                reason: "interface name must not be empty",
            });
        }

        if !allow_hairpin && self.in_interface == self.out_interface {
            return Err(ForwardingError::SameInterface {
                interface: self.in_interface.clone(),
            });
        }

        Ok(())
    }
}

/// Validate a user-supplied rule name: `[A-Za-z0-9_-]{1,31}`, and never
/// the reserved egress prefix (those names are allocated by the table).
pub fn validate_name(name: &str) -> Result<(), ForwardingError> {
    if name.is_empty() {
        return Err(ForwardingError::InvalidName {
            reason: "name must not be empty",
        });
    }
    if name.starts_with(INVERSE_PREFIX) {
        return Err(ForwardingError::InvalidName {
            reason: "the 'egress-' prefix is reserved for auto-generated rules",
        });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ForwardingError::InvalidName {
            reason: "name is longer than 31 characters",
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ForwardingError::InvalidName {
            reason: "name may only contain [A-Za-z0-9_-]",
        });
    }
    Ok(())
}

/// The egress pair name for a user rule.
pub fn inverse_name(origin: &str) -> String {
    format!("{INVERSE_PREFIX}{origin}")
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn make_rule(name: &str) -> ForwardingRule {
        ForwardingRule {
            name: name.to_string(),
            in_interface: "eth0".to_string(),
            svlan: Some(100),
            cvlan: Some(10),
            out_interface: "eth1".to_string(),
            pop_tags: 1,
            push_svlan: None,
            push_cvlan: Some(11),
            active: false,
            auto_inverse: false,
            origin_name: None,
        }
    }

    #[test]
    fn valid_rule_passes() {
        assert!(make_rule("r1").validate(false).is_ok());
    }

    #[test]
    fn empty_name_rejected() {
        assert!(matches!(
            make_rule("").validate(false),
            Err(ForwardingError::InvalidName { .. })
        ));
    }

    #[test]
    fn reserved_prefix_rejected() {
        assert!(matches!(
            make_rule("egress-r1").validate(false),
            Err(ForwardingError::InvalidName { .. })
        ));
    }

    #[test]
    fn overlong_name_rejected() {
        let name = "x".repeat(32);
        assert!(make_rule(&name).validate(false).is_err());
        let name = "x".repeat(31);
        assert!(make_rule(&name).validate(false).is_ok());
    }

    #[test]
    fn bad_characters_rejected() {
        for name in ["a b", "a.b", "a/b", "ñ"] {
            assert!(make_rule(name).validate(false).is_err(), "{name}");
        }
        assert!(make_rule("A-z_09").validate(false).is_ok());
    }

    #[test]
    fn vlan_ranges_enforced() {
        let mut rule = make_rule("r1");
        rule.svlan = Some(0);
        assert!(matches!(
            rule.validate(false),
            Err(ForwardingError::InvalidVlanId { field: "svlan", .. })
        ));

        let mut rule = make_rule("r1");
        rule.push_cvlan = Some(4095);
        assert!(rule.validate(false).is_err());

        let mut rule = make_rule("r1");
        rule.push_cvlan = Some(4094);
        assert!(rule.validate(false).is_ok());
    }

    #[test]
    fn pop_bounded_by_matched_tags() {
        let mut rule = make_rule("r1");
        rule.svlan = None; // only cvlan matched
        rule.pop_tags = 2;
        assert!(matches!(
            rule.validate(false),
            Err(ForwardingError::PopExceedsMatch {
                pop_tags: 2,
                matched: 1
            })
        ));

        rule.pop_tags = 1;
        assert!(rule.validate(false).is_ok());

        let mut untagged = make_rule("r2");
        untagged.svlan = None;
        untagged.cvlan = None;
        untagged.pop_tags = 1;
        assert!(untagged.validate(false).is_err());
    }

    #[test]
    fn hairpin_rejected_unless_allowed() {
        let mut rule = make_rule("r1");
        rule.out_interface = "eth0".to_string();
        assert!(matches!(
            rule.validate(false),
            Err(ForwardingError::SameInterface { .. })
        ));
        assert!(rule.validate(true).is_ok());
    }

    #[test]
    fn match_key_ignores_actions() {
        let mut a = make_rule("a");
        let mut b = make_rule("b");
        a.push_cvlan = Some(20);
        b.push_cvlan = None;
        b.pop_tags = 0;
        assert_eq!(a.match_key(), b.match_key());
    }

    #[test]
    fn snapshot_shape_omits_inverse_fields() {
        let rule = make_rule("r1");
        let json = serde_json::to_value(&rule).unwrap();
        assert!(json.get("auto_inverse").is_none());
        assert!(json.get("origin_name").is_none());
        assert_eq!(json["svlan"], 100);
        assert_eq!(json["push_svlan"], serde_json::Value::Null);
    }
}

//! In-memory forwarding rule table.
//!
//! Entries keep insertion order for display stability; every active user
//! rule is followed by its egress pair. Inverses are computed state: they
//! are regenerated authoritatively after every mutation (and on load), never
//! trusted from storage.

use std::collections::HashMap;

use super::entity::{ForwardingRule, INVERSE_PREFIX, MatchKey, inverse_name};
use super::error::ForwardingError;
use super::inverse::derive_inverse;

#[derive(Debug, Default)]
pub struct ForwardingTable {
    entries: Vec<ForwardingRule>,
    allow_hairpin: bool,
}

impl ForwardingTable {
    pub fn new(allow_hairpin: bool) -> Self {
        Self {
            entries: Vec::new(),
            allow_hairpin,
        }
    }

    /// Rebuild a table from persisted user rules.
    ///
    /// Stored inverses are discarded and regenerated. Rules that fail
    /// validation or collide with an earlier rule are dropped and returned
    /// with the rejection reason so the caller can log them.
    pub fn from_rules(
        rules: Vec<ForwardingRule>,
        allow_hairpin: bool,
    ) -> (Self, Vec<(String, ForwardingError)>) {
        let mut table = Self::new(allow_hairpin);
        let mut rejected = Vec::new();
        for mut rule in rules {
            if rule.auto_inverse || rule.name.starts_with(INVERSE_PREFIX) {
                continue;
            }
            rule.origin_name = None;
            if let Err(e) = table.upsert(rule.clone()) {
                rejected.push((rule.name, e));
            }
        }
        (table, rejected)
    }

    // ── Mutations ──────────────────────────────────────────────────

    /// Insert or replace a rule.
    ///
    /// A name carrying the reserved prefix is only accepted as a targeted
    /// update of an existing egress pair; the update clears `auto_inverse`
    /// so later regenerations leave it alone.
    pub fn upsert(&mut self, rule: ForwardingRule) -> Result<(), ForwardingError> {
        if rule.name.starts_with(INVERSE_PREFIX) {
            return self.override_inverse(rule);
        }

        rule.validate(self.allow_hairpin)?;

        if rule.active {
            self.check_conflicts(&rule)?;
        }

        match self.position(&rule.name) {
            Some(pos) => self.entries[pos] = rule,
            None => self.entries.push(rule),
        }
        self.rebuild_inverses();
        Ok(())
    }

    /// Remove a rule and its egress pair. The rule must be inactive.
    pub fn delete(&mut self, name: &str) -> Result<(), ForwardingError> {
        if name.starts_with(INVERSE_PREFIX) {
            return Err(ForwardingError::InverseManaged {
                name: name.to_string(),
                operation: "deleted",
            });
        }
        let pos = self
            .position(name)
            .ok_or_else(|| ForwardingError::NotFound {
                name: name.to_string(),
            })?;
        if self.entries[pos].active {
            return Err(ForwardingError::StillActive {
                name: name.to_string(),
            });
        }

        let pair = inverse_name(name);
        self.entries.retain(|r| r.name != name && r.name != pair);
        self.rebuild_inverses();
        Ok(())
    }

    /// Activate a rule; the egress pair follows.
    pub fn enable(&mut self, name: &str) -> Result<(), ForwardingError> {
        self.set_active(name, true)
    }

    /// Deactivate a rule; the egress pair follows.
    pub fn disable(&mut self, name: &str) -> Result<(), ForwardingError> {
        self.set_active(name, false)
    }

    fn set_active(&mut self, name: &str, active: bool) -> Result<(), ForwardingError> {
        if name.starts_with(INVERSE_PREFIX) {
            return Err(ForwardingError::InverseManaged {
                name: name.to_string(),
                operation: if active { "enabled" } else { "disabled" },
            });
        }
        let pos = self
            .position(name)
            .ok_or_else(|| ForwardingError::NotFound {
                name: name.to_string(),
            })?;
        if self.entries[pos].active == active {
            return Err(ForwardingError::AlreadyInState {
                name: name.to_string(),
                state: if active { "enabled" } else { "disabled" },
            });
        }

        if active {
            let mut candidate = self.entries[pos].clone();
            candidate.active = true;
            self.check_conflicts(&candidate)?;
        }

        self.entries[pos].active = active;
        self.rebuild_inverses();
        Ok(())
    }

    // ── Queries ────────────────────────────────────────────────────

    /// All entries (user rules and inverses) in display order.
    pub fn entries(&self) -> &[ForwardingRule] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&ForwardingRule> {
        self.entries.iter().find(|r| r.name == name)
    }

    /// User-created rules only, in insertion order (the persisted set).
    pub fn user_rules(&self) -> Vec<ForwardingRule> {
        self.entries
            .iter()
            .filter(|r| !r.name.starts_with(INVERSE_PREFIX))
            .cloned()
            .collect()
    }

    /// Active entries, the reconciler's desired set.
    pub fn active_rules(&self) -> impl Iterator<Item = &ForwardingRule> {
        self.entries.iter().filter(|r| r.active)
    }

    /// Clone of the full entry list, for rollback.
    pub fn snapshot(&self) -> Vec<ForwardingRule> {
        self.entries.clone()
    }

    /// Restore a previously taken snapshot.
    pub fn restore(&mut self, snapshot: Vec<ForwardingRule>) {
        self.entries = snapshot;
    }

    // ── Internals ──────────────────────────────────────────────────

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|r| r.name == name)
    }

    /// Targeted update of an existing egress pair. Clears `auto_inverse` so
    /// the override survives regeneration; the lifecycle stays tied to the
    /// origin rule.
    fn override_inverse(&mut self, rule: ForwardingRule) -> Result<(), ForwardingError> {
        let pos = self
            .position(&rule.name)
            .ok_or(ForwardingError::InvalidName {
                reason: "the 'egress-' prefix is reserved for auto-generated rules",
            })?;

        let origin = self.entries[pos].origin_name.clone();
        let origin_active = origin
            .as_deref()
            .and_then(|n| self.get(n))
            .is_some_and(|r| r.active);

        let mut updated = rule;
        updated.validate_fields(self.allow_hairpin)?;
        updated.auto_inverse = false;
        updated.origin_name = origin;
        updated.active = origin_active;

        if updated.active {
            self.check_conflicts(&updated)?;
        }

        self.entries[pos] = updated;
        Ok(())
    }

    /// Reject a candidate whose projected match key collides with another
    /// active entry (or with its own would-be egress pair).
    fn check_conflicts(&self, candidate: &ForwardingRule) -> Result<(), ForwardingError> {
        let pair = inverse_name(&candidate.name);
        let exclude = |name: &str| {
            name == candidate.name
                || name == pair
                || candidate
                    .origin_name
                    .as_deref()
                    .is_some_and(|origin| name == origin)
        };

        let mut keys: Vec<(String, MatchKey)> = vec![(candidate.name.clone(), candidate.match_key())];
        if !candidate.name.starts_with(INVERSE_PREFIX) {
            let mut active = candidate.clone();
            active.active = true;
            let inv = derive_inverse(&active);
            keys.push((inv.name.clone(), inv.match_key()));
        }

        for existing in self.entries.iter().filter(|r| r.active && !exclude(&r.name)) {
            let existing_key = existing.match_key();
            for (name, key) in &keys {
                if *key == existing_key {
                    return Err(ForwardingError::Conflict {
                        name: name.clone(),
                        existing: existing.name.clone(),
                    });
                }
            }
        }

        // A hairpin rule can collide with its own egress pair.
        if keys.len() == 2 && keys[0].1 == keys[1].1 {
            return Err(ForwardingError::Conflict {
                name: keys[0].0.clone(),
                existing: keys[1].0.clone(),
            });
        }

        Ok(())
    }

    /// Drop stale inverses and re-derive one per active user rule, keeping
    /// overridden (non-auto) inverses whose origin is still active.
    fn rebuild_inverses(&mut self) {
        let overrides: HashMap<String, ForwardingRule> = self
            .entries
            .iter()
            .filter(|r| r.name.starts_with(INVERSE_PREFIX) && !r.auto_inverse)
            .map(|r| (r.name.clone(), r.clone()))
            .collect();

        let mut rebuilt = Vec::with_capacity(self.entries.len());
        for rule in self
            .entries
            .iter()
            .filter(|r| !r.name.starts_with(INVERSE_PREFIX))
        {
            rebuilt.push(rule.clone());
            if !rule.active {
                continue;
            }
            let name = inverse_name(&rule.name);
            match overrides.get(&name) {
                Some(overridden) => {
                    let mut kept = overridden.clone();
                    kept.active = true;
                    rebuilt.push(kept);
                }
                None => rebuilt.push(derive_inverse(rule)),
            }
        }
        self.entries = rebuilt;
    }
}

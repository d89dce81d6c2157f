//! Consistency reconciler: table state → kernel maps.
//!
//! Runs at startup and after every table mutation. Computes the desired
//! per-interface entry set from the active rules, attaches/detaches the
//! data plane per interface, and applies the minimum set of put/delete
//! operations against each map. The reconciler is the only code path that
//! issues kernel writes.

use std::collections::BTreeMap;

use domain::common::error::CoreError;
use domain::forwarding::codec;
use domain::forwarding::table::ForwardingTable;
use ebpf_common::forwarding::{ForwardingKey, ForwardingValue, MAX_FORWARDING_ENTRIES};
use ports::secondary::dataplane_port::DataplanePort;
use tracing::{debug, warn};

/// Operation counts from a reconcile pass, mostly for logs and tests.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub puts: usize,
    pub deletes: usize,
    pub attached: usize,
    pub detached: usize,
    /// Rules skipped because an interface no longer exists (lenient mode).
    pub skipped: Vec<String>,
}

/// Reconcile kernel state with the table.
///
/// In strict mode (post-mutation) any failure aborts and is returned so the
/// caller can roll back. In lenient mode (startup) rules whose interfaces
/// are missing are skipped with a warning — the persisted rule is kept and
/// simply not applied.
pub fn reconcile(
    table: &ForwardingTable,
    dataplane: &mut dyn DataplanePort,
    lenient: bool,
) -> Result<ReconcileSummary, CoreError> {
    let mut summary = ReconcileSummary::default();

    // 1. Desired entries, grouped by ingress interface.
    type EntryMap = BTreeMap<ForwardingKey, ForwardingValue>;
    let mut desired: BTreeMap<String, (u32, EntryMap)> = BTreeMap::new();

    for rule in table.active_rules() {
        let resolved = dataplane
            .resolve_ifindex(&rule.in_interface)
            .and_then(|ingress| {
                dataplane
                    .resolve_ifindex(&rule.out_interface)
                    .map(|egress| (ingress, egress))
            });
        let (ingress, egress) = match resolved {
            Ok(pair) => pair,
            Err(e) if lenient => {
                warn!(rule = %rule.name, error = %e, "skipping rule: interface not present");
                summary.skipped.push(rule.name.clone());
                continue;
            }
            Err(e) => return Err(e),
        };

        let key = codec::encode_key(ingress, rule);
        let value = codec::encode_value(rule, egress).map_err(CoreError::from)?;
        desired
            .entry(rule.in_interface.clone())
            .or_insert_with(|| (ingress, EntryMap::new()))
            .1
            .insert(key, value);
    }

    // The per-interface map is a fixed-size hash map; refuse a desired set
    // that cannot fit instead of failing halfway through the writes.
    for (name, (_, entries)) in &desired {
        if entries.len() > MAX_FORWARDING_ENTRIES as usize {
            return Err(CoreError::Kernel {
                op: "map_update".to_string(),
                detail: format!(
                    "interface '{name}' needs {} entries, map capacity is {MAX_FORWARDING_ENTRIES}",
                    entries.len()
                ),
            });
        }
    }

    // 2. Attach and ensure a map for every referenced ingress interface.
    for (name, (ifindex, _)) in &desired {
        let attached_before = dataplane.attached().contains(ifindex);
        dataplane.attach(name)?;
        dataplane.ensure_map(*ifindex)?;
        if !attached_before {
            summary.attached += 1;
        }
    }

    // 3. Detach interfaces that no longer carry any active rule.
    let desired_ifindexes: Vec<u32> = desired.values().map(|(i, _)| *i).collect();
    for ifindex in dataplane.attached() {
        if !desired_ifindexes.contains(&ifindex) {
            dataplane.detach(ifindex)?;
            summary.detached += 1;
        }
    }

    // 4. Per-interface diff: delete stale keys, then write changed entries.
    for (name, (ifindex, entries)) in &desired {
        let current: EntryMap = dataplane.map_entries(*ifindex)?.into_iter().collect();

        for key in current.keys() {
            if !entries.contains_key(key) {
                dataplane.map_delete(*ifindex, *key)?;
                summary.deletes += 1;
            }
        }
        for (key, value) in entries {
            if current.get(key) != Some(value) {
                dataplane.map_put(*ifindex, *key, *value)?;
                summary.puts += 1;
            }
        }
        debug!(
            interface = %name,
            entries = entries.len(),
            "interface map reconciled"
        );
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::forwarding::entity::ForwardingRule;
    use ports::test_utils::MockDataplane;

    fn rule(name: &str, in_if: &str, out_if: &str, cvlan: u16, active: bool) -> ForwardingRule {
        ForwardingRule {
            name: name.to_string(),
            in_interface: in_if.to_string(),
            svlan: None,
            cvlan: Some(cvlan),
            out_interface: out_if.to_string(),
            pop_tags: 0,
            push_svlan: None,
            push_cvlan: None,
            active,
            auto_inverse: false,
            origin_name: None,
        }
    }

    fn dataplane() -> MockDataplane {
        MockDataplane::new()
            .with_interface("eth0", 2)
            .with_interface("eth1", 3)
    }

    fn table_with(rules: Vec<ForwardingRule>) -> ForwardingTable {
        let (table, rejected) = ForwardingTable::from_rules(rules, false);
        assert!(rejected.is_empty());
        table
    }

    #[test]
    fn empty_table_attaches_nothing() {
        let mut dp = dataplane();
        let summary = reconcile(&table_with(vec![]), &mut dp, false).unwrap();
        assert_eq!(summary, ReconcileSummary::default());
        assert!(dp.attached().is_empty());
    }

    #[test]
    fn active_rule_installs_both_directions() {
        let mut dp = dataplane();
        let table = table_with(vec![rule("r1", "eth0", "eth1", 10, true)]);
        let summary = reconcile(&table, &mut dp, false).unwrap();

        // The rule and its egress pair land in their own interface maps.
        assert_eq!(summary.attached, 2);
        assert_eq!(summary.puts, 2);
        assert_eq!(dp.map(2).unwrap().len(), 1);
        assert_eq!(dp.map(3).unwrap().len(), 1);
    }

    #[test]
    fn inactive_rules_install_nothing() {
        let mut dp = dataplane();
        let table = table_with(vec![rule("r1", "eth0", "eth1", 10, false)]);
        let summary = reconcile(&table, &mut dp, false).unwrap();
        assert_eq!(summary.puts, 0);
        assert!(dp.attached().is_empty());
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let mut dp = dataplane();
        let table = table_with(vec![rule("r1", "eth0", "eth1", 10, true)]);
        reconcile(&table, &mut dp, false).unwrap();
        dp.ops.clear();

        let summary = reconcile(&table, &mut dp, false).unwrap();
        assert_eq!(summary.puts, 0);
        assert_eq!(summary.deletes, 0);
        assert!(dp.ops.is_empty(), "unexpected kernel ops: {:?}", dp.ops);
    }

    #[test]
    fn adding_a_rule_touches_only_new_entries() {
        let mut dp = dataplane();
        let mut table = table_with(vec![rule("r1", "eth0", "eth1", 10, true)]);
        reconcile(&table, &mut dp, false).unwrap();
        dp.ops.clear();

        table.upsert(rule("r2", "eth0", "eth1", 20, true)).unwrap();
        let summary = reconcile(&table, &mut dp, false).unwrap();
        assert_eq!(summary.puts, 2); // r2 + egress-r2
        assert_eq!(summary.deletes, 0);
        assert_eq!(dp.map(2).unwrap().len(), 2);
    }

    #[test]
    fn removed_rules_are_deleted_and_interfaces_detached() {
        let mut dp = dataplane();
        let mut table = table_with(vec![rule("r1", "eth0", "eth1", 10, true)]);
        reconcile(&table, &mut dp, false).unwrap();

        table.disable("r1").unwrap();
        let summary = reconcile(&table, &mut dp, false).unwrap();
        assert_eq!(summary.detached, 2);
        assert!(dp.attached().is_empty());
        assert!(dp.map(2).is_none());
    }

    #[test]
    fn strict_mode_fails_on_missing_interface() {
        let mut dp = MockDataplane::new().with_interface("eth0", 2);
        let table = table_with(vec![rule("r1", "eth0", "eth1", 10, true)]);
        assert!(matches!(
            reconcile(&table, &mut dp, false),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn lenient_mode_skips_missing_interface() {
        let mut dp = MockDataplane::new().with_interface("eth0", 2);
        let table = table_with(vec![rule("r1", "eth0", "eth1", 10, true)]);
        let summary = reconcile(&table, &mut dp, true).unwrap();
        assert_eq!(summary.skipped, vec!["r1", "egress-r1"]);
        assert!(dp.attached().is_empty());
    }

    #[test]
    fn kernel_failure_propagates() {
        let mut dp = dataplane();
        let table = table_with(vec![rule("r1", "eth0", "eth1", 10, true)]);
        dp.fail_next = Some("enospc");
        assert!(matches!(
            reconcile(&table, &mut dp, false),
            Err(CoreError::Kernel { .. })
        ));
    }

    #[test]
    fn map_contents_match_encoded_active_rules() {
        let mut dp = dataplane();
        let table = table_with(vec![rule("r1", "eth0", "eth1", 10, true)]);
        reconcile(&table, &mut dp, false).unwrap();

        let r1 = table.get("r1").unwrap();
        let key = codec::encode_key(2, r1);
        let value = codec::encode_value(r1, 3).unwrap();
        assert_eq!(dp.map(2).unwrap().get(&key), Some(&value));
    }
}

//! Rule engine API: the command surface the CLI drives.
//!
//! Every mutation runs the same sequence — validate, mutate the table,
//! persist the snapshot, reconcile the kernel — and rolls back both memory
//! and disk if a kernel operation fails, leaving the previous consistent
//! state in place. The embedding wraps the service in a single mutex, so
//! each command is externally atomic.

use domain::common::error::CoreError;
use domain::forwarding::entity::ForwardingRule;
use domain::forwarding::table::ForwardingTable;
use ports::secondary::dataplane_port::DataplanePort;
use ports::secondary::rule_store::RuleStore;
use serde::Serialize;
use tracing::{info, warn};

use crate::reconciler::{self, ReconcileSummary};

/// Parameters for `create_rule`, one per command argument.
#[derive(Debug, Clone)]
pub struct CreateRuleParams {
    pub name: String,
    pub in_interface: String,
    pub svlan: Option<u16>,
    pub cvlan: Option<u16>,
    pub out_interface: String,
    pub pop_tags: u8,
    pub push_svlan: Option<u16>,
    pub push_cvlan: Option<u16>,
    /// New rules are created inactive unless asked otherwise.
    pub active: bool,
}

/// A table row as reported to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct RuleView {
    #[serde(flatten)]
    pub rule: ForwardingRule,
    /// Whether the rule is actually installed in the kernel: active, its
    /// interface present, and the data plane attached.
    pub applied: bool,
}

/// Outcome of a successful mutation.
#[derive(Debug, Clone, Serialize)]
pub struct CommandSummary {
    pub rule: String,
    pub detail: String,
}

pub struct ForwardingService {
    table: ForwardingTable,
    store: Box<dyn RuleStore>,
    dataplane: Box<dyn DataplanePort>,
}

impl ForwardingService {
    /// Load the persisted snapshot and bring the kernel in line with it.
    ///
    /// Startup reconciliation is lenient: rules referencing interfaces that
    /// no longer exist stay persisted but are not applied.
    pub fn start(
        store: Box<dyn RuleStore>,
        mut dataplane: Box<dyn DataplanePort>,
        allow_hairpin: bool,
    ) -> Result<Self, CoreError> {
        let stored = store.load()?;
        let (table, rejected) = ForwardingTable::from_rules(stored, allow_hairpin);
        for (name, error) in &rejected {
            warn!(rule = %name, %error, "dropping invalid persisted rule");
        }

        let summary = reconciler::reconcile(&table, dataplane.as_mut(), true)?;
        info!(
            puts = summary.puts,
            detached = summary.detached,
            skipped = summary.skipped.len(),
            "startup reconciliation complete"
        );

        let service = Self {
            table,
            store,
            dataplane,
        };
        // Invalid entries were dropped; rewrite the snapshot so disk and
        // table agree again.
        if !rejected.is_empty() {
            service.store.save(&service.table.user_rules())?;
        }
        Ok(service)
    }

    // ── Commands ───────────────────────────────────────────────────

    pub fn create_rule(&mut self, params: CreateRuleParams) -> Result<CommandSummary, CoreError> {
        let rule = ForwardingRule {
            name: params.name.clone(),
            in_interface: params.in_interface,
            svlan: params.svlan,
            cvlan: params.cvlan,
            out_interface: params.out_interface,
            pop_tags: params.pop_tags,
            push_svlan: params.push_svlan,
            push_cvlan: params.push_cvlan,
            active: params.active,
            auto_inverse: false,
            origin_name: None,
        };
        let active = rule.active;
        self.mutate(|table| table.upsert(rule))?;
        Ok(CommandSummary {
            rule: params.name,
            detail: if active {
                "created and enabled".to_string()
            } else {
                "created (inactive)".to_string()
            },
        })
    }

    pub fn delete_rule(&mut self, name: &str) -> Result<CommandSummary, CoreError> {
        self.mutate(|table| table.delete(name))?;
        Ok(CommandSummary {
            rule: name.to_string(),
            detail: "deleted with its egress pair".to_string(),
        })
    }

    pub fn enable_rule(&mut self, name: &str) -> Result<CommandSummary, CoreError> {
        self.mutate(|table| table.enable(name))?;
        Ok(CommandSummary {
            rule: name.to_string(),
            detail: "enabled with its egress pair".to_string(),
        })
    }

    pub fn disable_rule(&mut self, name: &str) -> Result<CommandSummary, CoreError> {
        self.mutate(|table| table.disable(name))?;
        Ok(CommandSummary {
            rule: name.to_string(),
            detail: "disabled with its egress pair".to_string(),
        })
    }

    /// Rules as displayed, optionally filtered by exact name.
    pub fn show_forwarding(&self, filter: Option<&str>) -> Vec<RuleView> {
        self.table
            .entries()
            .iter()
            .filter(|rule| filter.is_none_or(|name| rule.name == name))
            .map(|rule| RuleView {
                applied: self.is_applied(rule),
                rule: rule.clone(),
            })
            .collect()
    }

    // ── Internals ──────────────────────────────────────────────────

    fn is_applied(&self, rule: &ForwardingRule) -> bool {
        if !rule.active {
            return false;
        }
        match self.dataplane.resolve_ifindex(&rule.in_interface) {
            Ok(ifindex) => self.dataplane.attached().contains(&ifindex),
            Err(_) => false,
        }
    }

    /// Validate-mutate-persist-reconcile with rollback.
    ///
    /// Table errors surface before any side effect. A persistence failure
    /// rolls back the table; a kernel failure rolls back table and disk.
    fn mutate<F>(&mut self, op: F) -> Result<ReconcileSummary, CoreError>
    where
        F: FnOnce(&mut ForwardingTable) -> Result<(), domain::forwarding::error::ForwardingError>,
    {
        let table_before = self.table.snapshot();
        let disk_before = self.table.user_rules();

        op(&mut self.table).map_err(CoreError::from)?;

        if let Err(e) = self.store.save(&self.table.user_rules()) {
            self.table.restore(table_before);
            return Err(e);
        }

        match reconciler::reconcile(&self.table, self.dataplane.as_mut(), false) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                self.table.restore(table_before);
                if let Err(persist_err) = self.store.save(&disk_before) {
                    warn!(%persist_err, "rollback snapshot write failed; disk is ahead of memory");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::forwarding::codec;
    use ebpf_common::forwarding::{ForwardingKey, ForwardingValue};
    use ports::test_utils::{MemoryRuleStore, MockDataplane};
    use std::sync::{Arc, Mutex};

    struct SharedStore(Arc<MemoryRuleStore>);

    impl RuleStore for SharedStore {
        fn load(&self) -> Result<Vec<ForwardingRule>, CoreError> {
            self.0.load()
        }
        fn save(&self, rules: &[ForwardingRule]) -> Result<(), CoreError> {
            self.0.save(rules)
        }
    }

    /// Hands the service a data plane the test can still inspect.
    #[derive(Clone)]
    struct SharedDataplane(Arc<Mutex<MockDataplane>>);

    impl DataplanePort for SharedDataplane {
        fn resolve_ifindex(&self, name: &str) -> Result<u32, CoreError> {
            self.0.lock().unwrap().resolve_ifindex(name)
        }
        fn attach(&mut self, name: &str) -> Result<u32, CoreError> {
            self.0.lock().unwrap().attach(name)
        }
        fn detach(&mut self, ifindex: u32) -> Result<(), CoreError> {
            self.0.lock().unwrap().detach(ifindex)
        }
        fn attached(&self) -> Vec<u32> {
            self.0.lock().unwrap().attached()
        }
        fn ensure_map(&mut self, ifindex: u32) -> Result<(), CoreError> {
            self.0.lock().unwrap().ensure_map(ifindex)
        }
        fn map_put(
            &mut self,
            ifindex: u32,
            key: ForwardingKey,
            value: ForwardingValue,
        ) -> Result<(), CoreError> {
            self.0.lock().unwrap().map_put(ifindex, key, value)
        }
        fn map_delete(&mut self, ifindex: u32, key: ForwardingKey) -> Result<(), CoreError> {
            self.0.lock().unwrap().map_delete(ifindex, key)
        }
        fn map_clear(&mut self, ifindex: u32) -> Result<(), CoreError> {
            self.0.lock().unwrap().map_clear(ifindex)
        }
        fn map_entries(
            &self,
            ifindex: u32,
        ) -> Result<Vec<(ForwardingKey, ForwardingValue)>, CoreError> {
            self.0.lock().unwrap().map_entries(ifindex)
        }
    }

    fn params(name: &str) -> CreateRuleParams {
        CreateRuleParams {
            name: name.to_string(),
            in_interface: "eth0".to_string(),
            svlan: Some(100),
            cvlan: Some(10),
            out_interface: "eth1".to_string(),
            pop_tags: 1,
            push_svlan: None,
            push_cvlan: Some(11),
            active: false,
        }
    }

    fn service() -> (
        ForwardingService,
        Arc<MemoryRuleStore>,
        Arc<Mutex<MockDataplane>>,
    ) {
        let store = Arc::new(MemoryRuleStore::new());
        let dataplane = Arc::new(Mutex::new(
            MockDataplane::new()
                .with_interface("eth0", 2)
                .with_interface("eth1", 3),
        ));
        let service = ForwardingService::start(
            Box::new(SharedStore(store.clone())),
            Box::new(SharedDataplane(dataplane.clone())),
            false,
        )
        .unwrap();
        (service, store, dataplane)
    }

    // ── create / persist ───────────────────────────────────────────

    #[test]
    fn create_persists_user_rule_only() {
        let (mut service, store, _) = service();
        service.create_rule(params("r1")).unwrap();

        let saved = store.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].name, "r1");
        assert!(!saved[0].active);
    }

    #[test]
    fn enable_installs_expected_map_entries() {
        let (mut service, _, dataplane) = service();
        service.create_rule(params("r1")).unwrap();
        service.enable_rule("r1").unwrap();

        let rule = service.show_forwarding(Some("r1"))[0].rule.clone();
        let expected_key = codec::encode_key(2, &rule);
        let expected_value = codec::encode_value(&rule, 3).unwrap();

        let dp = dataplane.lock().unwrap();
        // Ingress map on eth0.
        assert_eq!(dp.map(2).unwrap().get(&expected_key), Some(&expected_value));
        // Egress pair map on eth1, keyed on the rewritten frame.
        let inverse_keys: Vec<_> = dp.map(3).unwrap().keys().copied().collect();
        assert_eq!(inverse_keys.len(), 1);
        let decoded = codec::decode_key(&inverse_keys[0]);
        assert_eq!(decoded.cvlan, Some(11));
        assert_eq!(decoded.svlan, None);
    }

    #[test]
    fn table_and_snapshot_agree_after_every_mutation() {
        let (mut service, store, _) = service();
        service.create_rule(params("r1")).unwrap();
        service.enable_rule("r1").unwrap();
        service.create_rule(params("r2-unused")).unwrap();
        service.disable_rule("r1").unwrap();
        service.delete_rule("r1").unwrap();

        let user_rules: Vec<_> = service
            .show_forwarding(None)
            .into_iter()
            .map(|v| v.rule)
            .filter(|r| !r.auto_inverse)
            .collect();
        assert_eq!(store.saved(), user_rules);
    }

    // ── conflict (S2) ──────────────────────────────────────────────

    #[test]
    fn conflicting_enable_is_rejected_with_both_names() {
        let (mut service, _, _) = service();
        service.create_rule(params("r1")).unwrap();
        service.enable_rule("r1").unwrap();

        let mut p2 = params("r2");
        p2.push_cvlan = None;
        p2.pop_tags = 0;
        service.create_rule(p2).unwrap();

        match service.enable_rule("r2").unwrap_err() {
            CoreError::Conflict { rule, existing } => {
                assert_eq!(rule, "r2");
                assert_eq!(existing, "r1");
            }
            other => panic!("unexpected: {other}"),
        }
        assert!(!service.show_forwarding(Some("r2"))[0].rule.active);
    }

    // ── delete lifecycle (S4) ──────────────────────────────────────

    #[test]
    fn delete_requires_disable_then_cleans_everything() {
        let (mut service, store, dataplane) = service();
        service.create_rule(params("r1")).unwrap();
        service.enable_rule("r1").unwrap();

        assert!(matches!(
            service.delete_rule("r1"),
            Err(CoreError::StateViolation(_))
        ));

        service.disable_rule("r1").unwrap();
        service.delete_rule("r1").unwrap();

        assert!(service.show_forwarding(None).is_empty());
        assert!(store.saved().is_empty());
        let dp = dataplane.lock().unwrap();
        assert!(dp.attached().is_empty());
        assert!(dp.map(2).is_none());
    }

    // ── rollback (§7) ──────────────────────────────────────────────

    #[test]
    fn kernel_failure_rolls_back_memory_and_disk() {
        let (mut service, store, dataplane) = service();
        service.create_rule(params("r1")).unwrap();
        let disk_before = store.saved();

        dataplane.lock().unwrap().fail_next = Some("einval");
        let err = service.enable_rule("r1").unwrap_err();
        assert!(matches!(err, CoreError::Kernel { .. }));

        assert!(!service.show_forwarding(Some("r1"))[0].rule.active);
        assert_eq!(store.saved(), disk_before);
    }

    #[test]
    fn persistence_failure_rolls_back_memory() {
        let (mut service, store, _) = service();
        service.create_rule(params("r1")).unwrap();

        store.fail_next_save();
        assert!(matches!(
            service.enable_rule("r1"),
            Err(CoreError::Persistence(_))
        ));
        assert!(!service.show_forwarding(Some("r1"))[0].rule.active);
    }

    #[test]
    fn validation_failure_has_no_side_effects() {
        let (mut service, store, dataplane) = service();
        let mut bad = params("bad name!");
        bad.active = true;
        assert!(matches!(
            service.create_rule(bad),
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(store.saved().is_empty());
        assert!(dataplane.lock().unwrap().ops.is_empty());
    }

    // ── startup (S3) ───────────────────────────────────────────────

    #[test]
    fn startup_restores_persisted_active_rules() {
        let (mut service, store, _) = service();
        service.create_rule(params("r1")).unwrap();
        service.enable_rule("r1").unwrap();
        let persisted = store.saved();

        // "Restart": fresh service over the same snapshot.
        let dataplane = MockDataplane::new()
            .with_interface("eth0", 2)
            .with_interface("eth1", 3);
        let restarted = ForwardingService::start(
            Box::new(SharedStore(Arc::new(MemoryRuleStore::with_rules(persisted)))),
            Box::new(dataplane),
            false,
        )
        .unwrap();

        let views = restarted.show_forwarding(None);
        assert_eq!(views.len(), 2);
        assert!(views.iter().all(|v| v.applied));
    }

    #[test]
    fn startup_with_missing_interface_keeps_rule_unapplied() {
        let mut active = params("r1");
        active.active = true;
        let rule = ForwardingRule {
            name: active.name,
            in_interface: active.in_interface,
            svlan: active.svlan,
            cvlan: active.cvlan,
            out_interface: active.out_interface,
            pop_tags: active.pop_tags,
            push_svlan: active.push_svlan,
            push_cvlan: active.push_cvlan,
            active: true,
            auto_inverse: false,
            origin_name: None,
        };
        let store = Arc::new(MemoryRuleStore::with_rules(vec![rule]));

        // eth0/eth1 do not exist at boot.
        let service = ForwardingService::start(
            Box::new(SharedStore(store.clone())),
            Box::new(MockDataplane::new()),
            false,
        )
        .unwrap();

        let views = service.show_forwarding(Some("r1"));
        assert_eq!(views.len(), 1);
        assert!(views[0].rule.active, "rule must stay persisted-active");
        assert!(!views[0].applied);
        assert_eq!(store.saved().len(), 1);
    }

    // ── show ───────────────────────────────────────────────────────

    #[test]
    fn show_filter_matches_inverse_names_too() {
        let (mut service, _, _) = service();
        service.create_rule(params("r1")).unwrap();
        service.enable_rule("r1").unwrap();

        assert_eq!(service.show_forwarding(Some("egress-r1")).len(), 1);
        assert_eq!(service.show_forwarding(None).len(), 2);
        assert!(service.show_forwarding(Some("ghost")).is_empty());
    }

    #[test]
    fn show_serializes_with_applied_flag() {
        let (mut service, _, _) = service();
        service.create_rule(params("r1")).unwrap();
        let json = serde_json::to_value(service.show_forwarding(None)).unwrap();
        assert_eq!(json[0]["name"], "r1");
        assert_eq!(json[0]["applied"], false);
    }
}

//! In-memory port implementations for tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use domain::common::error::CoreError;
use domain::forwarding::entity::ForwardingRule;
use ebpf_common::forwarding::{ForwardingKey, ForwardingValue};

use crate::secondary::dataplane_port::DataplanePort;
use crate::secondary::rule_store::RuleStore;

/// Fake data plane: fake interfaces, in-memory maps, an operation log, and
/// injectable kernel failures.
#[derive(Default)]
pub struct MockDataplane {
    ifindexes: HashMap<String, u32>,
    names: HashMap<u32, String>,
    attached: BTreeSet<u32>,
    maps: HashMap<u32, BTreeMap<ForwardingKey, ForwardingValue>>,
    /// Every mutating call, for minimal-diff assertions.
    pub ops: Vec<String>,
    /// When set, the next mutating kernel call fails with this detail.
    pub fail_next: Option<&'static str>,
}

impl MockDataplane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fake interface.
    #[must_use]
    pub fn with_interface(mut self, name: &str, ifindex: u32) -> Self {
        self.add_interface(name, ifindex);
        self
    }

    pub fn add_interface(&mut self, name: &str, ifindex: u32) {
        self.ifindexes.insert(name.to_string(), ifindex);
        self.names.insert(ifindex, name.to_string());
    }

    /// Simulate an interface disappearing from the system.
    pub fn remove_interface(&mut self, name: &str) {
        if let Some(ifindex) = self.ifindexes.remove(name) {
            self.names.remove(&ifindex);
        }
    }

    /// Map contents for an interface, if its map exists.
    pub fn map(&self, ifindex: u32) -> Option<&BTreeMap<ForwardingKey, ForwardingValue>> {
        self.maps.get(&ifindex)
    }

    pub fn is_attached(&self, ifindex: u32) -> bool {
        self.attached.contains(&ifindex)
    }

    fn take_failure(&mut self, op: &str) -> Result<(), CoreError> {
        if let Some(detail) = self.fail_next.take() {
            return Err(CoreError::Kernel {
                op: op.to_string(),
                detail: detail.to_string(),
            });
        }
        Ok(())
    }
}

impl DataplanePort for MockDataplane {
    fn resolve_ifindex(&self, name: &str) -> Result<u32, CoreError> {
        self.ifindexes
            .get(name)
            .copied()
            .ok_or_else(|| CoreError::NotFound(format!("interface '{name}'")))
    }

    fn attach(&mut self, name: &str) -> Result<u32, CoreError> {
        let ifindex = self.resolve_ifindex(name)?;
        self.take_failure("attach")?;
        if self.attached.insert(ifindex) {
            self.ops.push(format!("attach {name}"));
        }
        self.maps.entry(ifindex).or_default();
        Ok(ifindex)
    }

    fn detach(&mut self, ifindex: u32) -> Result<(), CoreError> {
        self.take_failure("detach")?;
        if self.attached.remove(&ifindex) {
            self.ops.push(format!("detach {ifindex}"));
        }
        self.maps.remove(&ifindex);
        Ok(())
    }

    fn attached(&self) -> Vec<u32> {
        self.attached.iter().copied().collect()
    }

    fn ensure_map(&mut self, ifindex: u32) -> Result<(), CoreError> {
        self.take_failure("ensure_map")?;
        self.maps.entry(ifindex).or_default();
        Ok(())
    }

    fn map_put(
        &mut self,
        ifindex: u32,
        key: ForwardingKey,
        value: ForwardingValue,
    ) -> Result<(), CoreError> {
        self.take_failure("map_put")?;
        self.ops.push(format!("put {ifindex}"));
        self.maps.entry(ifindex).or_default().insert(key, value);
        Ok(())
    }

    fn map_delete(&mut self, ifindex: u32, key: ForwardingKey) -> Result<(), CoreError> {
        self.take_failure("map_delete")?;
        self.ops.push(format!("delete {ifindex}"));
        if let Some(map) = self.maps.get_mut(&ifindex) {
            map.remove(&key);
        }
        Ok(())
    }

    fn map_clear(&mut self, ifindex: u32) -> Result<(), CoreError> {
        self.take_failure("map_clear")?;
        self.ops.push(format!("clear {ifindex}"));
        if let Some(map) = self.maps.get_mut(&ifindex) {
            map.clear();
        }
        Ok(())
    }

    fn map_entries(
        &self,
        ifindex: u32,
    ) -> Result<Vec<(ForwardingKey, ForwardingValue)>, CoreError> {
        Ok(self
            .maps
            .get(&ifindex)
            .map(|m| m.iter().map(|(k, v)| (*k, *v)).collect())
            .unwrap_or_default())
    }
}

/// Rule store backed by a mutex-guarded vector.
#[derive(Default)]
pub struct MemoryRuleStore {
    rules: Mutex<Vec<ForwardingRule>>,
    fail_next_save: Mutex<bool>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<ForwardingRule>) -> Self {
        Self {
            rules: Mutex::new(rules),
            fail_next_save: Mutex::new(false),
        }
    }

    /// Make the next `save` fail with a persistence error.
    pub fn fail_next_save(&self) {
        *self.fail_next_save.lock().unwrap() = true;
    }

    /// The last snapshot written.
    pub fn saved(&self) -> Vec<ForwardingRule> {
        self.rules.lock().unwrap().clone()
    }
}

impl RuleStore for MemoryRuleStore {
    fn load(&self) -> Result<Vec<ForwardingRule>, CoreError> {
        Ok(self.rules.lock().unwrap().clone())
    }

    fn save(&self, rules: &[ForwardingRule]) -> Result<(), CoreError> {
        let mut fail = self.fail_next_save.lock().unwrap();
        if *fail {
            *fail = false;
            return Err(CoreError::Persistence("injected write failure".to_string()));
        }
        *self.rules.lock().unwrap() = rules.to_vec();
        Ok(())
    }
}

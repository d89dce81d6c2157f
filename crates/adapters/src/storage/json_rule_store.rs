//! JSON snapshot of the user-created forwarding rules.
//!
//! Shape: `{ "rules": [ { name, in_interface, svlan, cvlan, out_interface,
//! pop_tags, push_svlan, push_cvlan, active } ] }`. Inverses are never
//! stored; they are recomputed on load. Writes go through a temp file,
//! fsync, and rename so a crash mid-write leaves the old snapshot intact.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use domain::common::error::CoreError;
use domain::forwarding::entity::ForwardingRule;
use ports::secondary::rule_store::RuleStore;
use serde::Serialize;
use tracing::warn;

pub struct JsonRuleStore {
    path: PathBuf,
}

#[derive(Serialize)]
struct Snapshot<'a> {
    rules: &'a [ForwardingRule],
}

impl JsonRuleStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn persistence(e: impl std::fmt::Display) -> CoreError {
        CoreError::Persistence(e.to_string())
    }
}

impl RuleStore for JsonRuleStore {
    fn load(&self) -> Result<Vec<ForwardingRule>, CoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).map_err(Self::persistence)?;
        let doc: serde_json::Value =
            serde_json::from_str(&content).map_err(Self::persistence)?;

        // Entries are decoded one by one: a single malformed rule must not
        // take the whole snapshot down with it.
        let mut rules = Vec::new();
        let entries = doc
            .get("rules")
            .and_then(|v| v.as_array())
            .ok_or_else(|| Self::persistence("snapshot is missing the 'rules' array"))?;
        for entry in entries {
            match serde_json::from_value::<ForwardingRule>(entry.clone()) {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    warn!(snapshot = %self.path.display(), error = %e, "dropping malformed rule entry");
                }
            }
        }
        Ok(rules)
    }

    fn save(&self, rules: &[ForwardingRule]) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(Self::persistence)?;
        }

        let body =
            serde_json::to_vec_pretty(&Snapshot { rules }).map_err(Self::persistence)?;

        let tmp = self.path.with_extension("json.tmp");
        let mut file = File::create(&tmp).map_err(Self::persistence)?;
        file.write_all(&body).map_err(Self::persistence)?;
        file.sync_all().map_err(Self::persistence)?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(Self::persistence)?;
        Ok(())
    }
}

mod json_rule_store;

pub use json_rule_store::JsonRuleStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForwardingError {
    #[error("invalid rule name: {reason}")]
    InvalidName { reason: &'static str },

    #[error("invalid {field}: {vlan} (must be 1-4094)")]
    InvalidVlanId { field: &'static str, vlan: u16 },

    #[error("invalid pop_tags: {pop_tags} (rule matches {matched} tag(s))")]
    PopExceedsMatch { pop_tags: u8, matched: u8 },

    #[error("in_interface and out_interface are both '{interface}'")]
    SameInterface { interface: String },

    #[error("rule not found: {name}")]
    NotFound { name: String },

    #[error("rule '{name}' projects the same match key as active rule '{existing}'")]
    Conflict { name: String, existing: String },

    #[error("rule '{name}' is active; disable it before deletion")]
    StillActive { name: String },

    #[error("rule '{name}' is already {state}")]
    AlreadyInState { name: String, state: &'static str },

    #[error("'{name}' is an auto-generated egress rule and cannot be {operation} directly")]
    InverseManaged {
        name: String,
        operation: &'static str,
    },

    #[error("rule projects {count} action steps (maximum {max})")]
    TooManyActions { count: usize, max: usize },

    #[error("map record malformed: {0}")]
    MalformedRecord(&'static str),
}

//! Paths and defaults shared between config, adapters, and the agent.

/// Default YAML configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/edgemark/config.yaml";

/// Default directory for persisted state (rules snapshot).
pub const DEFAULT_STATE_DIR: &str = "/var/lib/edgemark";

/// Rules snapshot file name inside the state directory.
pub const RULES_SNAPSHOT_FILE: &str = "forwarding_rules.json";

/// Default bpffs pin directory for per-interface maps.
pub const DEFAULT_BPF_PIN_DIR: &str = "/sys/fs/bpf/edgemark";

/// Default location of the compiled XDP forwarding object.
pub const DEFAULT_XDP_OBJECT_PATH: &str = "/usr/lib/edgemark/xdp_forwarding.o";

use std::net::IpAddr;

use clap::{Args, Parser, Subcommand};
use infrastructure::config::{LogFormat, LogLevel};
use infrastructure::constants::DEFAULT_CONFIG_PATH;

#[derive(Parser, Debug)]
#[command(
    name = "edgemark-agent",
    about = "Ethernet demarcation agent: XDP MEF switch + TWAMP Light",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Log level override (takes precedence over config file)
    #[arg(short, long)]
    pub log_level: Option<LogLevel>,

    /// Log format: text (default, development) or json (production)
    #[arg(long)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Display version information
    Version,

    /// Manage transparent forwarding rules
    Rule {
        #[command(subcommand)]
        command: RuleCommand,
    },

    /// Run TWAMP Light measurement sessions
    Twamp {
        #[command(subcommand)]
        command: TwampCommand,
    },
}

// ── Forwarding rules ───────────────────────────────────────────────

#[derive(Subcommand, Debug)]
pub enum RuleCommand {
    /// Create a forwarding rule (inactive unless --enable is given)
    Create(CreateRuleArgs),

    /// Delete a rule and its egress pair (must be disabled first)
    Delete {
        /// Rule name
        name: String,
    },

    /// Enable a rule and its egress pair, then program the kernel maps
    Enable {
        /// Rule name
        name: String,
    },

    /// Disable a rule and its egress pair, then program the kernel maps
    Disable {
        /// Rule name
        name: String,
    },

    /// Show rules, optionally a single one by name
    Show {
        /// Rule name filter (user or egress-<name>)
        name: Option<String>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct CreateRuleArgs {
    /// Unique rule name
    #[arg(long)]
    pub name: String,

    /// Ingress interface
    #[arg(long)]
    pub in_interface: String,

    /// S-VLAN match (omit to match untagged/single-tagged)
    #[arg(long)]
    pub svlan: Option<u16>,

    /// C-VLAN match
    #[arg(long)]
    pub cvlan: Option<u16>,

    /// Egress interface
    #[arg(long)]
    pub out_interface: String,

    /// Number of VLAN tags to pop (0-2)
    #[arg(long, default_value_t = 0)]
    pub pop_tags: u8,

    /// S-VLAN to push (outer tag)
    #[arg(long)]
    pub push_svlan: Option<u16>,

    /// C-VLAN to push (inner tag)
    #[arg(long)]
    pub push_cvlan: Option<u16>,

    /// Activate the rule immediately
    #[arg(long)]
    pub enable: bool,
}

// ── TWAMP ───────────────────────────────────────────────────────────

#[derive(Args, Debug, Clone)]
pub struct IpOptions {
    /// IP TTL (v4) or hop limit (v6)
    #[arg(long, default_value_t = 64)]
    pub ttl: u8,

    /// IP TOS (v4) or traffic class (v6)
    #[arg(long, default_value_t = 0)]
    pub tos: u8,

    /// DSCP name (ef, af41, cs5, ...) or value 0-63; overrides --tos
    #[arg(long)]
    pub dscp: Option<String>,

    /// Set the Don't Fragment bit (IPv4 only)
    #[arg(long)]
    pub do_not_fragment: bool,

    /// Padding bytes beyond the fixed packet fields (0-9000)
    #[arg(long, default_value_t = 0)]
    pub padding: usize,
}

#[derive(Subcommand, Debug)]
pub enum TwampCommand {
    /// Reflect test packets until interrupted
    Responder {
        /// UDP port to listen on
        #[arg(long)]
        port: u16,

        /// Local address to bind (v4 or v6)
        #[arg(long, default_value = "0.0.0.0")]
        bind_addr: IpAddr,

        /// Reflector sequence reset after this many seconds idle (0 = off)
        #[arg(long, default_value_t = 0)]
        timer: u64,

        #[command(flatten)]
        ip: IpOptions,
    },

    /// Send a paced packet train and report per-direction statistics
    Sender {
        /// Responder address (v4 or v6 literal)
        #[arg(long)]
        destination_ip: IpAddr,

        /// Responder UDP port
        #[arg(long)]
        port: u16,

        /// Number of test packets (1-9999)
        #[arg(long, default_value_t = 100)]
        count: u16,

        /// Inter-packet interval in milliseconds (10-1000)
        #[arg(long, default_value_t = 100)]
        interval: u64,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        ip: IpOptions,
    },

    /// Print the DSCP name/value mapping
    DscpTable,
}

pub fn parse() -> Cli {
    Cli::parse()
}

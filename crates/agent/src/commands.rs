//! Command execution and result rendering.
//!
//! Services return structured values; everything printable lives here so
//! the application layer stays free of I/O concerns.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use adapters::ebpf::XdpDataplane;
use adapters::net::{SocketOptions, bind_udp};
use adapters::storage::JsonRuleStore;
use anyhow::Result;
use application::forwarding_service::{CreateRuleParams, ForwardingService, RuleView};
use application::twamp_responder::TwampResponder;
use application::twamp_sender::TwampSender;
use domain::twamp::dscp::{DSCP_NAMES, resolve_tos};
use domain::twamp::entity::{ResponderSpec, SenderSpec};
use domain::twamp::stats::{DirectionStats, SessionReport};
use infrastructure::config::AgentConfig;
use tokio_util::sync::CancellationToken;

use crate::cli::{CreateRuleArgs, IpOptions};

// ── Forwarding rules ───────────────────────────────────────────────

pub fn build_forwarding_service(config: &AgentConfig) -> Result<ForwardingService> {
    let store = JsonRuleStore::new(&config.rules_snapshot_path());
    let dataplane = XdpDataplane::new(
        &config.forwarding.xdp_object,
        &config.forwarding.bpf_pin_dir,
    )?;
    let service = ForwardingService::start(
        Box::new(store),
        Box::new(dataplane),
        config.forwarding.allow_hairpin,
    )?;
    Ok(service)
}

pub fn cmd_rule_create(service: &mut ForwardingService, args: CreateRuleArgs) -> Result<()> {
    let summary = service.create_rule(CreateRuleParams {
        name: args.name,
        in_interface: args.in_interface,
        svlan: args.svlan,
        cvlan: args.cvlan,
        out_interface: args.out_interface,
        pop_tags: args.pop_tags,
        push_svlan: args.push_svlan,
        push_cvlan: args.push_cvlan,
        active: args.enable,
    })?;
    println!("rule '{}': {}", summary.rule, summary.detail);
    Ok(())
}

pub fn cmd_rule_delete(service: &mut ForwardingService, name: &str) -> Result<()> {
    let summary = service.delete_rule(name)?;
    println!("rule '{}': {}", summary.rule, summary.detail);
    Ok(())
}

pub fn cmd_rule_enable(service: &mut ForwardingService, name: &str) -> Result<()> {
    let summary = service.enable_rule(name)?;
    println!("rule '{}': {}", summary.rule, summary.detail);
    Ok(())
}

pub fn cmd_rule_disable(service: &mut ForwardingService, name: &str) -> Result<()> {
    let summary = service.disable_rule(name)?;
    println!("rule '{}': {}", summary.rule, summary.detail);
    Ok(())
}

pub fn cmd_rule_show(
    service: &ForwardingService,
    name: Option<&str>,
    json: bool,
) -> Result<()> {
    let views = service.show_forwarding(name);

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    println!("{}", render_rule_table(&views, name));
    Ok(())
}

fn render_rule_table(views: &[RuleView], filter: Option<&str>) -> String {
    const HEADER: &str = "+-----------------+--------------+-------+-------+--------------+----------+------------+------------+--------+---------+\n\
                          | name            | in_interface | svlan | cvlan | out_interface| pop_tags | push_svlan | push_cvlan | active | applied |\n\
                          +-----------------+--------------+-------+-------+--------------+----------+------------+------------+--------+---------+";
    const FOOTER: &str = "+-----------------+--------------+-------+-------+--------------+----------+------------+------------+--------+---------+";

    let mut lines = vec![HEADER.to_string()];
    if views.is_empty() {
        let message = match filter {
            Some(name) => format!("rule '{name}' not found"),
            None => "no rules configured".to_string(),
        };
        lines.push(format!("| {:<116} |", format!("({message})")));
    }
    for view in views {
        let r = &view.rule;
        lines.push(format!(
            "| {:<15} | {:<12} | {:<5} | {:<5} | {:<12} | {:<8} | {:<10} | {:<10} | {:<6} | {:<7} |",
            truncate(&r.name, 15),
            truncate(&r.in_interface, 12),
            opt(r.svlan),
            opt(r.cvlan),
            truncate(&r.out_interface, 12),
            r.pop_tags,
            opt(r.push_svlan),
            opt(r.push_cvlan),
            yes_no(r.active),
            yes_no(view.applied),
        ));
    }
    lines.push(FOOTER.to_string());
    lines.join("\n")
}

fn opt(value: Option<u16>) -> String {
    value.map_or_else(|| "null".to_string(), |v| v.to_string())
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max { s } else { &s[..max] }
}

// ── TWAMP ───────────────────────────────────────────────────────────

fn effective_tos(ip: &IpOptions) -> Result<u8> {
    match &ip.dscp {
        Some(dscp) => Ok(resolve_tos(dscp)?),
        None => Ok(ip.tos),
    }
}

pub async fn cmd_twamp_responder(
    port: u16,
    bind_addr: IpAddr,
    timer: u64,
    ip: IpOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let tos = effective_tos(&ip)?;
    let spec = ResponderSpec {
        bind_addr,
        port,
        padding: ip.padding,
        ttl: ip.ttl,
        tos,
        do_not_fragment: ip.do_not_fragment,
        reset_timer: Duration::from_secs(timer),
    };
    spec.validate()?;

    let socket = bind_udp(
        SocketAddr::new(bind_addr, port),
        SocketOptions {
            ttl: ip.ttl,
            tos,
            do_not_fragment: ip.do_not_fragment,
        },
    )?;

    println!("TWAMP responder on {bind_addr}:{port} (Ctrl+C to stop)");
    let summary = TwampResponder::new(socket, spec).run(cancel).await?;
    println!(
        "reflected {} packet(s) from {} peer(s), {} malformed",
        summary.reflected, summary.peers, summary.malformed
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_twamp_sender(
    destination_ip: IpAddr,
    port: u16,
    count: u16,
    interval_ms: u64,
    json: bool,
    ip: IpOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let tos = effective_tos(&ip)?;
    let spec = SenderSpec {
        destination: destination_ip,
        port,
        count,
        interval: Duration::from_millis(interval_ms),
        padding: ip.padding,
        ttl: ip.ttl,
        tos,
        do_not_fragment: ip.do_not_fragment,
    };
    spec.validate()?;

    let bind: SocketAddr = if destination_ip.is_ipv6() {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    };
    let socket = bind_udp(
        bind,
        SocketOptions {
            ttl: ip.ttl,
            tos,
            do_not_fragment: ip.do_not_fragment,
        },
    )?;

    let report = TwampSender::new(socket, spec).run(cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_report(&report));
    }
    Ok(())
}

fn render_report(report: &SessionReport) -> String {
    let mut out = String::from("--- TWAMP sender results ---\n");
    out.push_str(&format!(
        "  Packets Tx/Rx:    {} / {}\n",
        report.sent, report.matched
    ));
    out.push_str(&format!("  Loss:             {:.2}%\n", report.loss_pct));
    out.push_str(&render_direction("Round trip", report.roundtrip.as_ref()));
    out.push_str(&render_direction("Outbound", report.outbound.as_ref()));
    out.push_str(&render_direction("Inbound", report.inbound.as_ref()));
    if report.clamped_roundtrips > 0 {
        out.push_str(&format!(
            "  ({} round trip(s) clamped to zero: clocks unsynchronized)\n",
            report.clamped_roundtrips
        ));
    }
    out
}

fn render_direction(label: &str, stats: Option<&DirectionStats>) -> String {
    match stats {
        Some(s) => format!(
            "  {label}:\n    Min/Avg/Max:    {} / {} / {}\n    Jitter:         {}\n",
            ms(s.min_us as f64),
            ms(s.avg_us),
            ms(s.max_us as f64),
            ms(s.jitter_us),
        ),
        None => format!("  {label}:          N/A\n"),
    }
}

/// Microseconds to a millisecond display string.
fn ms(us: f64) -> String {
    format!("{:.2}ms", us / 1000.0)
}

pub fn cmd_dscp_table() {
    println!("DSCP name      DSCP value     TOS (hex)");
    println!("----------------------------------------");
    for &(name, value) in DSCP_NAMES {
        println!("{name:<14} {value:<14} {:02x}", value << 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::forwarding::entity::ForwardingRule;
    use domain::twamp::entity::SenderState;

    fn view(name: &str, active: bool, applied: bool) -> RuleView {
        RuleView {
            rule: ForwardingRule {
                name: name.to_string(),
                in_interface: "eth0".to_string(),
                svlan: Some(100),
                cvlan: None,
                out_interface: "eth1".to_string(),
                pop_tags: 1,
                push_svlan: None,
                push_cvlan: Some(11),
                active,
                auto_inverse: false,
                origin_name: None,
            },
            applied,
        }
    }

    #[test]
    fn table_renders_rows_and_null_tags() {
        let rendered = render_rule_table(&[view("r1", true, true)], None);
        assert!(rendered.contains("| r1 "));
        assert!(rendered.contains("null"));
        assert!(rendered.contains("yes"));
    }

    #[test]
    fn table_reports_missing_rule() {
        let rendered = render_rule_table(&[], Some("ghost"));
        assert!(rendered.contains("rule 'ghost' not found"));
    }

    #[test]
    fn table_reports_empty_table() {
        let rendered = render_rule_table(&[], None);
        assert!(rendered.contains("no rules configured"));
    }

    #[test]
    fn report_render_covers_all_directions() {
        let stats = DirectionStats {
            min_us: 100,
            max_us: 300,
            avg_us: 200.0,
            jitter_us: 50.0,
        };
        let report = SessionReport {
            state: SenderState::Done,
            sent: 10,
            matched: 9,
            lost: 1,
            loss_pct: 10.0,
            outbound: Some(stats),
            inbound: Some(stats),
            roundtrip: Some(stats),
            clamped_roundtrips: 1,
        };
        let rendered = render_report(&report);
        assert!(rendered.contains("10 / 9"));
        assert!(rendered.contains("10.00%"));
        assert!(rendered.contains("0.20ms"));
        assert!(rendered.contains("clamped to zero"));
    }

    #[test]
    fn report_render_handles_total_loss() {
        let report = SessionReport {
            state: SenderState::Done,
            sent: 5,
            matched: 0,
            lost: 5,
            loss_pct: 100.0,
            outbound: None,
            inbound: None,
            roundtrip: None,
            clamped_roundtrips: 0,
        };
        let rendered = render_report(&report);
        assert!(rendered.contains("N/A"));
        assert!(rendered.contains("100.00%"));
    }

    #[test]
    fn dscp_override_beats_tos() {
        let ip = IpOptions {
            ttl: 64,
            tos: 7,
            dscp: Some("ef".to_string()),
            do_not_fragment: false,
            padding: 0,
        };
        assert_eq!(effective_tos(&ip).unwrap(), 0xB8);

        let plain = IpOptions { dscp: None, ..ip };
        assert_eq!(effective_tos(&plain).unwrap(), 7);
    }
}

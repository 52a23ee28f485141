//! Rule-text builders for bandwidth operations
//!
//! Everything here is pure: given names and values, produce the exact
//! iptables argument string or restore batch. Deciding *which* commands to
//! issue lives in the controller.

use crate::chains::{
    self, tables, BW_COSTLY_SHARED, BW_DATA_SAVER, BW_FORWARD, BW_HAPPY_BOX, BW_INPUT,
    BW_MANGLE_POSTROUTING, BW_OUTPUT, BW_PENALTY_BOX, BW_RAW_PREROUTING, FILTER_CHAINS,
    TETHER_COUNTERS_CHAIN,
};
use crate::types::{AppUid, IptOp, UidRange};

/// Terminator of every restore table block.
pub const COMMIT: &str = "COMMIT\n";

/// Wraps rule lines in a table block.
fn table_block(table: &str, lines: &[String]) -> String {
    let mut out = format!("*{}\n", table);
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(COMMIT);
    out
}

/// `-S` listing of the filter table.
pub fn build_list_chains_batch() -> String {
    table_block(tables::FILTER, &["-S".to_string()])
}

/// Extracts leftover per-interface costly chains from a `-S` listing, in
/// the order they were listed.
pub fn find_orphan_chains(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| line.trim().strip_prefix("-N "))
        .map(str::trim)
        .filter(|chain| chains::is_interface_costly_chain(chain))
        .map(str::to_string)
        .collect()
}

/// Flushes (and optionally deletes) leftover costly chains.
///
/// Returns `None` when there is nothing to clean.
pub fn build_orphan_cleanup_batch(orphans: &[String], delete: bool) -> Option<String> {
    if orphans.is_empty() {
        return None;
    }
    let mut lines = Vec::with_capacity(orphans.len() * 2);
    for chain in orphans {
        lines.push(format!(":{} -", chain));
        if delete {
            lines.push(format!("-X {}", chain));
        }
    }
    Some(table_block(tables::FILTER, &lines))
}

/// Creates or flushes every fixed chain across filter, raw and mangle.
pub fn build_flush_batch() -> String {
    let filter: Vec<String> = FILTER_CHAINS.iter().map(|c| format!(":{} -", c)).collect();
    let mut out = table_block(tables::FILTER, &filter);
    out.push_str(&table_block(tables::RAW, &[format!(":{} -", BW_RAW_PREROUTING)]));
    out.push_str(&table_block(
        tables::MANGLE,
        &[format!(":{} -", BW_MANGLE_POSTROUTING)],
    ));
    out
}

/// Wires accounting matches and the box hierarchy.
///
/// `system_uids`, when given, adds the happy-box exemption for that range.
pub fn build_accounting_batch(system_uids: Option<UidRange>) -> String {
    let mut filter = vec![
        format!("-A {} -m owner --socket-exists", BW_INPUT),
        format!("-A {} -m owner --socket-exists", BW_OUTPUT),
        format!("-A {} --jump {}", BW_COSTLY_SHARED, BW_PENALTY_BOX),
        format!("-A {} --jump {}", BW_PENALTY_BOX, BW_HAPPY_BOX),
        format!("-A {} --jump {}", BW_HAPPY_BOX, BW_DATA_SAVER),
        format!("-A {} -j RETURN", BW_DATA_SAVER),
    ];
    if let Some(range) = system_uids {
        filter.push(format!(
            "-I {} -m owner --uid-owner {} --jump RETURN",
            BW_HAPPY_BOX, range
        ));
    }

    let mut out = table_block(tables::FILTER, &filter);
    out.push_str(&table_block(
        tables::RAW,
        &[format!("-A {} -m owner --socket-exists", BW_RAW_PREROUTING)],
    ));
    out.push_str(&table_block(
        tables::MANGLE,
        &[format!("-A {} -m owner --socket-exists", BW_MANGLE_POSTROUTING)],
    ));
    out
}

/// Replaces rule 1 of the data-saver chain.
pub fn build_data_saver_batch(enable: bool) -> String {
    let target = if enable { "REJECT" } else { "RETURN" };
    table_block(
        tables::FILTER,
        &[format!("-R {} 1 --jump {}", BW_DATA_SAVER, target)],
    )
}

/// quota2 match text shared by quota and alert rules.
fn quota_match(bytes: u64, name: &str) -> String {
    format!("-m quota2 ! --quota {} --name {}", bytes, name)
}

/// Alert rule pair in `bw_INPUT` and `bw_OUTPUT`.
pub fn build_alert_batch(op: IptOp, name: &str, bytes: u64) -> String {
    let m = quota_match(bytes, name);
    table_block(
        tables::FILTER,
        &[
            format!("{} {} {}", op, BW_INPUT, m),
            format!("{} {} {}", op, BW_OUTPUT, m),
        ],
    )
}

/// Alert rule in `bw_FORWARD`.
pub fn build_alert_forward_batch(op: IptOp, name: &str, bytes: u64) -> String {
    table_block(
        tables::FILTER,
        &[format!("{} {} {}", op, BW_FORWARD, quota_match(bytes, name))],
    )
}

/// Happy/penalty box rules for a list of uids, one line per uid.
pub fn build_app_batch(op: IptOp, chain: &str, target: &str, uids: &[AppUid]) -> String {
    let lines: Vec<String> = uids
        .iter()
        .map(|uid| format!("{} {} -m owner --uid-owner {} --jump {}", op, chain, uid, target))
        .collect();
    table_block(tables::FILTER, &lines)
}

/// Counter listing of the tether chain.
pub fn build_tether_counters_batch() -> String {
    table_block(
        tables::FILTER,
        &[format!("-nvx -L {}", TETHER_COUNTERS_CHAIN)],
    )
}

/// `-F <chain>`
pub fn build_flush_chain_cmd(chain: &str) -> String {
    format!("-F {}", chain)
}

/// `-N <chain>`
pub fn build_new_chain_cmd(chain: &str) -> String {
    format!("-N {}", chain)
}

/// `-X <chain>`
pub fn build_delete_chain_cmd(chain: &str) -> String {
    format!("-X {}", chain)
}

/// Penalty-box jump appended to a freshly prepared costly chain.
pub fn build_penalty_jump_cmd(chain: &str) -> String {
    format!("-A {} -j {}", chain, BW_PENALTY_BOX)
}

/// Quota-and-reject rule for a costly chain.
pub fn build_quota_cmd(op: IptOp, chain: &str, bytes: u64, name: &str) -> String {
    format!("{} {} {} --jump REJECT", op, chain, quota_match(bytes, name))
}

/// Alert rule (no jump) inside a costly chain.
pub fn build_costly_alert_cmd(op: IptOp, chain: &str, bytes: u64, name: &str) -> String {
    format!("{} {} {}", op, chain, quota_match(bytes, name))
}

/// One step of linking an interface to a costly chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStep {
    /// iptables arguments.
    pub args: String,
    /// Whether a non-zero exit is expected and should not fail the call.
    pub ignore_failure: bool,
}

impl LinkStep {
    fn checked(args: String) -> Self {
        Self {
            args,
            ignore_failure: false,
        }
    }

    fn tolerant(args: String) -> Self {
        Self {
            args,
            ignore_failure: true,
        }
    }
}

fn input_jump(iface: &str, chain: &str) -> String {
    format!("{} -i {} --jump {}", BW_INPUT, iface, chain)
}

fn output_jump(iface: &str, chain: &str) -> String {
    format!("{} -o {} --jump {}", BW_OUTPUT, iface, chain)
}

fn forward_jump(iface: &str, chain: &str) -> String {
    format!("{} -o {} --jump {}", BW_FORWARD, iface, chain)
}

/// Links `iface` to `chain` from the three hierarchy chains.
///
/// Each insert is preceded by a delete of the same rule so a repeated
/// link never leaves duplicates; those deletes are allowed to fail.
/// `rule_index` is where INPUT/OUTPUT jumps land.
pub fn build_link_steps(iface: &str, chain: &str, rule_index: u32) -> Vec<LinkStep> {
    let input = input_jump(iface, chain);
    let output = output_jump(iface, chain);
    let forward = forward_jump(iface, chain);
    vec![
        LinkStep::tolerant(format!("-D {}", input)),
        LinkStep::checked(format!(
            "-I {} {} -i {} --jump {}",
            BW_INPUT, rule_index, iface, chain
        )),
        LinkStep::tolerant(format!("-D {}", output)),
        LinkStep::checked(format!(
            "-I {} {} -o {} --jump {}",
            BW_OUTPUT, rule_index, iface, chain
        )),
        LinkStep::tolerant(format!("-D {}", forward)),
        LinkStep::checked(format!("-A {}", forward)),
    ]
}

/// Removes the three hierarchy jumps from `iface` to `chain`.
pub fn build_unlink_cmds(iface: &str, chain: &str) -> Vec<String> {
    vec![
        format!("-D {}", input_jump(iface, chain)),
        format!("-D {}", output_jump(iface, chain)),
        format!("-D {}", forward_jump(iface, chain)),
    ]
}

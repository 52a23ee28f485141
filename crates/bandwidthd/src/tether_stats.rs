//! Tether counter parsing and aggregation
//!
//! Counter dumps come from `-nvx -L natctrl_tether_counters`, one per
//! address family:
//!
//! ```text
//! Chain natctrl_tether_counters (4 references)
//!     pkts      bytes target     prot opt in     out     source               destination
//!       26     2373 RETURN     all  --  wlan0  rmnet0  0.0.0.0/0            0.0.0.0/0
//!       27     2002 RETURN     all  --  rmnet0 wlan0   0.0.0.0/0            0.0.0.0/0
//! ```
//!
//! Each forwarding direction is one row. A pair of rows, `int -> ext` then
//! `ext -> int`, gives the rx and tx counters of one tethered pair. IPv6
//! dumps omit the `opt` column.

use netd_common::{codes, IpFamily, NetdError, NetdResult, MAX_RESPONSE_LEN};
use tracing::debug;

/// Which pairs a stats query reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TetherFilter {
    /// Every pair present in the IPv4 dump.
    All,
    /// One specific pair.
    Pair { int_iface: String, ext_iface: String },
}

impl TetherFilter {
    pub fn pair(int_iface: impl Into<String>, ext_iface: impl Into<String>) -> Self {
        TetherFilter::Pair {
            int_iface: int_iface.into(),
            ext_iface: ext_iface.into(),
        }
    }
}

/// Aggregated counters for one tethered pair.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TetherStats {
    pub int_iface: String,
    pub ext_iface: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
}

impl TetherStats {
    fn new(int_iface: &str, ext_iface: &str) -> Self {
        Self {
            int_iface: int_iface.to_string(),
            ext_iface: ext_iface.to_string(),
            ..Self::default()
        }
    }

    fn same_pair(&self, other: &TetherStats) -> bool {
        self.int_iface == other.int_iface && self.ext_iface == other.ext_iface
    }

    // Counters saturate rather than wrap
    fn add(&mut self, other: &TetherStats) {
        self.rx_bytes = self.rx_bytes.saturating_add(other.rx_bytes);
        self.rx_packets = self.rx_packets.saturating_add(other.rx_packets);
        self.tx_bytes = self.tx_bytes.saturating_add(other.tx_bytes);
        self.tx_packets = self.tx_packets.saturating_add(other.tx_packets);
    }

    /// `<int> <ext> <rxBytes> <rxPackets> <txBytes> <txPackets>`
    pub fn to_message(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            self.int_iface,
            self.ext_iface,
            self.rx_bytes,
            self.rx_packets,
            self.tx_bytes,
            self.tx_packets
        )
    }
}

/// One forwarding-direction row of a counter dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRow {
    pub packets: u64,
    pub bytes: u64,
    pub iface_in: String,
    pub iface_out: String,
}

/// Parses one dump line; `None` for headers, wildcards and anything else
/// that is not a counter row.
pub fn parse_row(line: &str) -> Option<CounterRow> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    // pkts bytes target prot [opt] in out source destination
    let ifaces = match tokens.len() {
        9 => &tokens[5..7],
        8 => &tokens[4..6],
        _ => return None,
    };
    if tokens[2] != "RETURN" || tokens[3] != "all" {
        return None;
    }
    let packets = tokens[0].parse().ok()?;
    let bytes = tokens[1].parse().ok()?;
    let (iface_in, iface_out) = (ifaces[0], ifaces[1]);
    if iface_in == "*" || iface_out == "*" {
        return None;
    }
    Some(CounterRow {
        packets,
        bytes,
        iface_in: iface_in.to_string(),
        iface_out: iface_out.to_string(),
    })
}

/// Raw dump text with every line newline-terminated, for diagnostics.
fn diagnostic(dump: &str) -> String {
    dump.lines().map(|l| format!("{}\n", l)).collect()
}

/// Extracts the pairs present in one family's dump.
///
/// With a pair filter at most one entry is returned. Without a filter,
/// rows must come in rx/tx pairs; a row that does not complete the pending
/// pair, or a pair left half-open at the end, fails the whole dump.
pub fn parse_family(filter: &TetherFilter, dump: &str) -> NetdResult<Vec<TetherStats>> {
    let rows = dump.lines().filter_map(parse_row);
    match filter {
        TetherFilter::Pair {
            int_iface,
            ext_iface,
        } => {
            let mut stats = TetherStats::new(int_iface, ext_iface);
            let (mut rx_seen, mut tx_seen) = (false, false);
            for row in rows {
                if row.iface_in == *int_iface && row.iface_out == *ext_iface {
                    stats.rx_bytes = stats.rx_bytes.saturating_add(row.bytes);
                    stats.rx_packets = stats.rx_packets.saturating_add(row.packets);
                    rx_seen = true;
                } else if row.iface_in == *ext_iface && row.iface_out == *int_iface {
                    stats.tx_bytes = stats.tx_bytes.saturating_add(row.bytes);
                    stats.tx_packets = stats.tx_packets.saturating_add(row.packets);
                    tx_seen = true;
                }
            }
            match (rx_seen, tx_seen) {
                (true, true) => Ok(vec![stats]),
                (false, false) => Ok(Vec::new()),
                _ => Err(NetdError::tether_stats(diagnostic(dump))),
            }
        }
        TetherFilter::All => {
            let mut out: Vec<TetherStats> = Vec::new();
            let mut pending: Option<TetherStats> = None;
            for row in rows {
                match pending.take() {
                    None => {
                        let mut stats = TetherStats::new(&row.iface_in, &row.iface_out);
                        stats.rx_bytes = row.bytes;
                        stats.rx_packets = row.packets;
                        pending = Some(stats);
                    }
                    Some(mut stats) => {
                        if row.iface_in != stats.ext_iface || row.iface_out != stats.int_iface {
                            return Err(NetdError::tether_stats(diagnostic(dump)));
                        }
                        stats.tx_bytes = row.bytes;
                        stats.tx_packets = row.packets;
                        match out.iter_mut().find(|s| s.same_pair(&stats)) {
                            Some(existing) => existing.add(&stats),
                            None => out.push(stats),
                        }
                    }
                }
            }
            if pending.is_some() {
                return Err(NetdError::tether_stats(diagnostic(dump)));
            }
            Ok(out)
        }
    }
}

/// Combines per-family dumps into the final list, IPv4 first.
///
/// Without a filter each family must contribute at least one pair, and
/// IPv6 pairs only add to pairs already seen over IPv4.
pub fn aggregate(
    filter: &TetherFilter,
    dumps: &[(IpFamily, String)],
) -> NetdResult<Vec<TetherStats>> {
    let mut list: Vec<TetherStats> = Vec::new();
    for (family, dump) in dumps {
        let pairs = parse_family(filter, dump)?;
        if *filter == TetherFilter::All && pairs.is_empty() {
            debug!(%family, "No tether pairs in counter dump");
            return Err(NetdError::tether_stats(diagnostic(dump)));
        }
        let establishes = *family == IpFamily::V4 || *filter != TetherFilter::All;
        for stats in pairs {
            match list.iter_mut().find(|s| s.same_pair(&stats)) {
                Some(existing) => existing.add(&stats),
                None if establishes => list.push(stats),
                None => {}
            }
        }
    }
    Ok(list)
}

/// Renders the reply lines for a completed query.
///
/// A pair filter that found its pair answers with a single result line;
/// everything else is a listing closed by a completion line.
pub fn render_response(
    filter: &TetherFilter,
    list: &[TetherStats],
) -> NetdResult<Vec<(u16, String)>> {
    let lines = match (filter, list) {
        (TetherFilter::Pair { .. }, [single]) => {
            vec![(codes::TETHERING_STATS_RESULT, single.to_message())]
        }
        _ => {
            let mut lines: Vec<(u16, String)> = list
                .iter()
                .map(|s| (codes::TETHERING_STATS_LIST_RESULT, s.to_message()))
                .collect();
            lines.push((
                codes::COMMAND_OKAY,
                "Tethering stats list completed".to_string(),
            ));
            lines
        }
    };

    // code, space, message, delimiter
    if let Some((_, msg)) = lines.iter().find(|(_, m)| m.len() + 5 > MAX_RESPONSE_LEN) {
        return Err(NetdError::invalid_argument(
            "response",
            format!("{} byte line exceeds {}", msg.len() + 5, MAX_RESPONSE_LEN),
        ));
    }
    Ok(lines)
}

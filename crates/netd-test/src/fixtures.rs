//! Test fixtures for packet-filter output
//!
//! Provides canned `-S` chain listings and `-nvx -L` counter dumps in the
//! shape the kernel tooling prints them.

/// Chain listings returned by the `-S` list query.
pub mod chain_fixtures {
    /// Listing with two orphaned per-interface costly chains.
    pub const WITH_ORPHANS: &str = "-P OUTPUT ACCEPT\n\
        -N bw_costly_rmnet_data0\n\
        -N bw_costly_shared\n\
        -N unrelated\n\
        -N bw_costly_rmnet_data7\n";

    /// Listing where only the shared costly chain exists.
    pub const CLEAN: &str = "-P OUTPUT ACCEPT\n\
        -N bw_costly_shared\n\
        -N unrelated\n";
}

/// Tether counter dumps returned by `-nvx -L natctrl_tether_counters`.
pub mod tether_fixtures {
    /// IPv4 dump: two interface pairs, with the `opt` column.
    pub const IPV4_COUNTERS: &str = concat!(
        "Chain natctrl_tether_counters (4 references)\n",
        "    pkts      bytes target     prot opt in     out     source               destination\n",
        "      26     2373 RETURN     all  --  wlan0  rmnet0  0.0.0.0/0            0.0.0.0/0\n",
        "      27     2002 RETURN     all  --  rmnet0 wlan0   0.0.0.0/0            0.0.0.0/0\n",
        "    1040   107471 RETURN     all  --  bt-pan rmnet0  0.0.0.0/0            0.0.0.0/0\n",
        "    1450  1708806 RETURN     all  --  rmnet0 bt-pan  0.0.0.0/0            0.0.0.0/0",
    );

    /// IPv6 dump: one interface pair, without the `opt` column.
    pub const IPV6_COUNTERS: &str = concat!(
        "Chain natctrl_tether_counters (2 references)\n",
        "    pkts      bytes target     prot opt in     out     source               destination\n",
        "   10000 10000000 RETURN     all      wlan0  rmnet0  ::/0                 ::/0\n",
        "   20000 20000000 RETURN     all      rmnet0 wlan0   ::/0                 ::/0",
    );

    /// Listing reply for both families combined, as emitted for no filter.
    pub const ALL_PAIRS_REPLY: &str = concat!(
        "114 wlan0 rmnet0 10002373 10026 20002002 20027\n",
        "114 bt-pan rmnet0 107471 1040 1708806 1450\n",
        "200 Tethering stats list completed\n",
    );

    /// Returns the first `n` lines of `dump`, each newline-terminated.
    pub fn first_lines(dump: &str, n: usize) -> String {
        dump.lines().take(n).map(|l| format!("{}\n", l)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::tether_fixtures::*;

    #[test]
    fn test_first_lines() {
        let head = first_lines(IPV4_COUNTERS, 3);
        assert_eq!(head.lines().count(), 3);
        assert!(head.ends_with("0.0.0.0/0\n"));
        assert!(head.starts_with("Chain natctrl_tether_counters"));
    }
}

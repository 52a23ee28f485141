//! Chain, table and rule-name constants for bandwidthd

// Fixed chains (filter table)
pub const BW_INPUT: &str = "bw_INPUT";
pub const BW_OUTPUT: &str = "bw_OUTPUT";
pub const BW_FORWARD: &str = "bw_FORWARD";
pub const BW_HAPPY_BOX: &str = "bw_happy_box";
pub const BW_PENALTY_BOX: &str = "bw_penalty_box";
pub const BW_DATA_SAVER: &str = "bw_data_saver";
pub const BW_COSTLY_SHARED: &str = "bw_costly_shared";

// Fixed chains (raw and mangle tables)
pub const BW_RAW_PREROUTING: &str = "bw_raw_PREROUTING";
pub const BW_MANGLE_POSTROUTING: &str = "bw_mangle_POSTROUTING";

/// Prefix of every costly chain, per-interface and shared alike.
pub const COSTLY_PREFIX: &str = "bw_costly_";

/// Tether counter chain maintained by the NAT controller.
pub const TETHER_COUNTERS_CHAIN: &str = "natctrl_tether_counters";

/// Restore table names
pub mod tables {
    pub const FILTER: &str = "filter";
    pub const RAW: &str = "raw";
    pub const MANGLE: &str = "mangle";
}

/// quota2 rule names
pub mod quota_names {
    /// Shared quota rule in `bw_costly_shared`.
    pub const SHARED: &str = "shared";
    /// Global alert rule pair in `bw_INPUT`/`bw_OUTPUT` (and `bw_FORWARD`).
    pub const GLOBAL_ALERT: &str = "globalAlert";
    /// Shared alert rule in `bw_costly_shared`.
    pub const SHARED_ALERT: &str = "sharedAlert";
    /// Suffix appended to an interface name for its alert rule.
    pub const ALERT_SUFFIX: &str = "Alert";
}

/// Filter-table chains flushed on every hook setup, in flush order.
pub const FILTER_CHAINS: &[&str] = &[
    BW_INPUT,
    BW_OUTPUT,
    BW_FORWARD,
    BW_HAPPY_BOX,
    BW_PENALTY_BOX,
    BW_DATA_SAVER,
    BW_COSTLY_SHARED,
];

/// Returns the costly chain for an interface.
pub fn costly_chain(iface: &str) -> String {
    format!("{}{}", COSTLY_PREFIX, iface)
}

/// Returns the alert rule name for an interface.
pub fn interface_alert_name(iface: &str) -> String {
    format!("{}{}", iface, quota_names::ALERT_SUFFIX)
}

/// Returns true if `chain` is a per-interface costly chain.
///
/// `bw_costly_shared` is fixed and never treated as per-interface.
pub fn is_interface_costly_chain(chain: &str) -> bool {
    match chain.strip_prefix(COSTLY_PREFIX) {
        Some(suffix) => !suffix.is_empty() && suffix != quota_names::SHARED,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_costly_chain_names() {
        assert_eq!(costly_chain("wlan0"), "bw_costly_wlan0");
        assert_eq!(interface_alert_name("wlan0"), "wlan0Alert");
    }

    #[test]
    fn test_is_interface_costly_chain() {
        assert!(is_interface_costly_chain("bw_costly_rmnet_data0"));
        assert!(!is_interface_costly_chain("bw_costly_shared"));
        assert!(!is_interface_costly_chain("bw_costly_"));
        assert!(!is_interface_costly_chain("unrelated"));
        assert!(!is_interface_costly_chain("bw_INPUT"));
    }

    #[test]
    fn test_filter_chain_order() {
        assert_eq!(FILTER_CHAINS.first(), Some(&BW_INPUT));
        assert_eq!(FILTER_CHAINS.last(), Some(&BW_COSTLY_SHARED));
        assert_eq!(FILTER_CHAINS.len(), 7);
    }
}

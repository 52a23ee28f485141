//! Bandwidth controller type definitions

use std::fmt;
use std::str::FromStr;

use netd_common::{NetdError, NetdResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Interface names: 1-16 chars, alphanumeric start, then alphanumerics
/// or `_ - :`.
static IFACE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_:\-]{0,15}$").expect("Invalid regex pattern")
});

/// quota2 counter names: same characters as interface names, up to the
/// 31 usable bytes of an xt_quota2 name so `<iface>Alert` always fits.
static QUOTA_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_:\-]{0,30}$").expect("Invalid regex pattern")
});

fn check_name(re: &Regex, field: &str, name: &str) -> NetdResult<()> {
    if re.is_match(name) {
        Ok(())
    } else {
        Err(NetdError::invalid_argument(
            field,
            format!("'{}' is not a valid name", name),
        ))
    }
}

/// Validates an interface name.
pub fn validate_iface(iface: &str) -> NetdResult<()> {
    check_name(&IFACE_NAME_RE, "iface", iface)
}

/// Validates a quota2 counter name.
///
/// The name becomes a file name under the quota directory, so path
/// separators and dots are never accepted.
pub fn validate_quota_name(name: &str) -> NetdResult<()> {
    check_name(&QUOTA_NAME_RE, "quota name", name)
}

/// Validates a quota or alert byte count.
pub fn validate_bytes(field: &str, bytes: u64) -> NetdResult<()> {
    if bytes == 0 {
        return Err(NetdError::invalid_argument(field, "must be greater than 0"));
    }
    Ok(())
}

/// Rule operation flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IptOp {
    /// `-I`
    Insert,
    /// `-A`
    Append,
    /// `-D`
    Delete,
}

impl IptOp {
    pub fn flag(&self) -> &'static str {
        match self {
            IptOp::Insert => "-I",
            IptOp::Append => "-A",
            IptOp::Delete => "-D",
        }
    }
}

impl fmt::Display for IptOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag())
    }
}

/// Tracked quota for one interface with its own costly chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterfaceQuota {
    /// Quota in bytes.
    pub quota: u64,
    /// Alert threshold in bytes; 0 means no alert rule exists.
    pub alert: u64,
}

impl InterfaceQuota {
    pub fn new(quota: u64) -> Self {
        Self { quota, alert: 0 }
    }

    pub fn has_alert(&self) -> bool {
        self.alert > 0
    }
}

/// Application UID for the happy/penalty box lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppUid(pub u32);

impl fmt::Display for AppUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AppUid {
    type Err = NetdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>()
            .map(AppUid)
            .map_err(|_| NetdError::invalid_argument("uid", format!("'{}' is not a uid", s)))
    }
}

/// Inclusive UID range, rendered as `start-end` in owner matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UidRange {
    pub start: u32,
    pub end: u32,
}

impl UidRange {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }
}

/// System UIDs, exempt from the happy-box deny path.
pub const SYSTEM_UID_RANGE: UidRange = UidRange::new(0, 9999);

impl Default for UidRange {
    fn default() -> Self {
        SYSTEM_UID_RANGE
    }
}

impl fmt::Display for UidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_iface() {
        assert!(validate_iface("wlan0").is_ok());
        assert!(validate_iface("rmnet_data0").is_ok());
        assert!(validate_iface("bt-pan").is_ok());
        assert!(validate_iface("eth0:1").is_ok());
        assert!(validate_iface("abcdefghijklmnop").is_ok());

        assert!(validate_iface("").is_err());
        assert!(validate_iface("_wlan0").is_err());
        assert!(validate_iface("wlan0;rm").is_err());
        assert!(validate_iface("../shared").is_err());
        assert!(validate_iface("abcdefghijklmnopq").is_err());
    }

    #[test]
    fn test_validate_quota_name() {
        assert!(validate_quota_name("globalAlert").is_ok());
        assert!(validate_quota_name("abcdefghijklmnopAlert").is_ok());
        assert!(validate_quota_name("shared").is_ok());

        assert!(validate_quota_name("").is_err());
        assert!(validate_quota_name("../wlan0").is_err());
        assert!(validate_quota_name("wlan0.old").is_err());
        assert!(validate_quota_name(&"a".repeat(32)).is_err());
    }

    #[test]
    fn test_validate_bytes() {
        assert!(validate_bytes("bytes", 1).is_ok());
        let err = validate_bytes("bytes", 0).unwrap_err();
        assert!(err.is_parameter_error());
    }

    #[test]
    fn test_ipt_op_flag() {
        assert_eq!(IptOp::Insert.to_string(), "-I");
        assert_eq!(IptOp::Append.flag(), "-A");
        assert_eq!(IptOp::Delete.flag(), "-D");
    }

    #[test]
    fn test_app_uid_parse() {
        assert_eq!("10012".parse::<AppUid>().unwrap(), AppUid(10012));
        assert!("-1".parse::<AppUid>().is_err());
        assert!("root".parse::<AppUid>().is_err());
    }

    #[test]
    fn test_uid_range() {
        assert_eq!(SYSTEM_UID_RANGE.to_string(), "0-9999");
        assert!(UidRange::new(5, 5).is_valid());
        assert!(!UidRange::new(6, 5).is_valid());
    }

    #[test]
    fn test_interface_quota() {
        let q = InterfaceQuota::new(123456);
        assert_eq!(q.quota, 123456);
        assert!(!q.has_alert());
    }
}

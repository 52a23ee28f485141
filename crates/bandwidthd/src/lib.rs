//! Bandwidth Controller - per-UID and per-interface data quota policy
//!
//! bandwidthd programs the `bw_*` packet-filter chain hierarchy, handling:
//! - Setup and teardown of the fixed accounting chains
//! - Per-interface and shared data quotas with the quota2 fast path
//! - Global, shared and per-interface alert thresholds
//! - Happy box / penalty box UID lists and the data-saver switch
//! - Tether counter aggregation across IPv4 and IPv6

pub mod bandwidth_ctrl;
pub mod chains;
pub mod command;
pub mod commands;
pub mod config;
pub mod costly;
pub mod quota;
pub mod shared_quota;
pub mod tether_stats;
pub mod types;

pub use bandwidth_ctrl::BandwidthCtrl;
pub use command::{parse_command, BandwidthCommand, CommandHandler, ParseError};
pub use config::BandwidthConfig;
pub use quota::QuotaUpdater;
pub use tether_stats::{TetherFilter, TetherStats};
pub use types::{AppUid, InterfaceQuota, IptOp, UidRange};

//! `bandwidth` command parsing and dispatch
//!
//! One request per line, tokens separated by whitespace. A leading
//! `bandwidth` token is accepted and ignored. Every request gets exactly one
//! response line except `gettetherstats`, which may stream a listing.

use netd_common::{codes, NetdError, NetdResult, ResponseSink};
use thiserror::Error;
use tracing::{debug, warn};

use crate::bandwidth_ctrl::BandwidthCtrl;
use crate::tether_stats::TetherFilter;
use crate::types::AppUid;

const COMMAND_NAME: &str = "bandwidth";

/// Errors detected before any controller operation runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Usage: bandwidth <cmd> [args...]")]
    Empty,

    #[error("Unknown bandwidth cmd: {0}")]
    Unknown(String),

    #[error("Usage: bandwidth {0}")]
    Usage(&'static str),

    #[error("Invalid {field}: {value}")]
    Parameter { field: &'static str, value: String },
}

impl ParseError {
    /// Response code for this error.
    pub fn code(&self) -> u16 {
        match self {
            ParseError::Parameter { .. } => codes::COMMAND_PARAMETER_ERROR,
            _ => codes::COMMAND_SYNTAX_ERROR,
        }
    }
}

/// A parsed `bandwidth` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BandwidthCommand {
    Enable,
    Disable,
    SetSharedQuota { bytes: u64, ifaces: Vec<String> },
    RemoveSharedQuota { ifaces: Vec<String> },
    SetInterfaceQuota { iface: String, bytes: u64 },
    RemoveInterfaceQuota { iface: String },
    GetInterfaceQuota { iface: String },
    SetGlobalAlert { bytes: u64 },
    RemoveGlobalAlert,
    SetGlobalAlertInForwardChain,
    RemoveGlobalAlertInForwardChain,
    SetSharedAlert { bytes: u64 },
    RemoveSharedAlert,
    SetInterfaceAlert { iface: String, bytes: u64 },
    RemoveInterfaceAlert { iface: String },
    AddNaughtyApps(Vec<AppUid>),
    RemoveNaughtyApps(Vec<AppUid>),
    AddNiceApps(Vec<AppUid>),
    RemoveNiceApps(Vec<AppUid>),
    SetDataSaver(bool),
    GetTetherStats(TetherFilter),
}

fn parse_bytes(value: &str) -> Result<u64, ParseError> {
    value.parse().map_err(|_| ParseError::Parameter {
        field: "bytes",
        value: value.to_string(),
    })
}

fn parse_uids(values: &[&str]) -> Result<Vec<AppUid>, ParseError> {
    values
        .iter()
        .map(|v| {
            v.parse().map_err(|_| ParseError::Parameter {
                field: "uid",
                value: v.to_string(),
            })
        })
        .collect()
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Parses one request line.
pub fn parse_command(line: &str) -> Result<BandwidthCommand, ParseError> {
    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.first() == Some(&COMMAND_NAME) {
        tokens.remove(0);
    }
    let (name, args) = match tokens.split_first() {
        Some((name, args)) => (*name, args),
        None => return Err(ParseError::Empty),
    };

    use BandwidthCommand::*;
    let cmd = match (name, args) {
        ("enable", []) => Enable,
        ("disable", []) => Disable,

        ("setquota", [iface, bytes]) => SetSharedQuota {
            bytes: parse_bytes(bytes)?,
            ifaces: vec![iface.to_string()],
        },
        ("setquota", _) => return Err(ParseError::Usage("setquota <interface> <bytes>")),

        ("setquotas", [bytes, ifaces @ ..]) if !ifaces.is_empty() => SetSharedQuota {
            bytes: parse_bytes(bytes)?,
            ifaces: owned(ifaces),
        },
        ("setquotas", _) => {
            return Err(ParseError::Usage("setquotas <bytes> <interface> ..."))
        }

        ("removequota", [iface]) => RemoveSharedQuota {
            ifaces: vec![iface.to_string()],
        },
        ("removequota", _) => return Err(ParseError::Usage("removequota <interface>")),

        ("removequotas", ifaces) if !ifaces.is_empty() => RemoveSharedQuota {
            ifaces: owned(ifaces),
        },
        ("removequotas", _) => {
            return Err(ParseError::Usage("removequotas <interface> ..."))
        }

        ("setiquota", [iface, bytes]) => SetInterfaceQuota {
            iface: iface.to_string(),
            bytes: parse_bytes(bytes)?,
        },
        ("setiquota", _) => return Err(ParseError::Usage("setiquota <interface> <bytes>")),

        ("removeiquota", [iface]) => RemoveInterfaceQuota {
            iface: iface.to_string(),
        },
        ("removeiquota", _) => return Err(ParseError::Usage("removeiquota <interface>")),

        ("getiquota", [iface]) => GetInterfaceQuota {
            iface: iface.to_string(),
        },
        ("getiquota", _) => return Err(ParseError::Usage("getiquota <interface>")),

        ("setglobalalert", [bytes]) => SetGlobalAlert {
            bytes: parse_bytes(bytes)?,
        },
        ("setglobalalert", _) => return Err(ParseError::Usage("setglobalalert <bytes>")),
        ("removeglobalalert", []) => RemoveGlobalAlert,
        ("setglobalalertinforwardchain", []) => SetGlobalAlertInForwardChain,
        ("removeglobalalertinforwardchain", []) => RemoveGlobalAlertInForwardChain,

        ("setsharedalert", [bytes]) => SetSharedAlert {
            bytes: parse_bytes(bytes)?,
        },
        ("setsharedalert", _) => return Err(ParseError::Usage("setsharedalert <bytes>")),
        ("removesharedalert", []) => RemoveSharedAlert,

        ("setinterfacealert", [iface, bytes]) => SetInterfaceAlert {
            iface: iface.to_string(),
            bytes: parse_bytes(bytes)?,
        },
        ("setinterfacealert", _) => {
            return Err(ParseError::Usage("setinterfacealert <interface> <bytes>"))
        }
        ("removeinterfacealert", [iface]) => RemoveInterfaceAlert {
            iface: iface.to_string(),
        },
        ("removeinterfacealert", _) => {
            return Err(ParseError::Usage("removeinterfacealert <interface>"))
        }

        ("addnaughtyapps", uids) if !uids.is_empty() => AddNaughtyApps(parse_uids(uids)?),
        ("removenaughtyapps", uids) if !uids.is_empty() => RemoveNaughtyApps(parse_uids(uids)?),
        ("addniceapps", uids) if !uids.is_empty() => AddNiceApps(parse_uids(uids)?),
        ("removeniceapps", uids) if !uids.is_empty() => RemoveNiceApps(parse_uids(uids)?),
        ("addnaughtyapps" | "removenaughtyapps" | "addniceapps" | "removeniceapps", _) => {
            return Err(ParseError::Usage("<add|remove><naughty|nice>apps <uid> ..."))
        }

        ("setdatasaver", [flag]) => match *flag {
            "true" => SetDataSaver(true),
            "false" => SetDataSaver(false),
            other => {
                return Err(ParseError::Parameter {
                    field: "datasaver flag",
                    value: other.to_string(),
                })
            }
        },
        ("setdatasaver", _) => return Err(ParseError::Usage("setdatasaver <true|false>")),

        ("gettetherstats", []) => GetTetherStats(TetherFilter::All),
        ("gettetherstats", [int_iface, ext_iface]) => {
            GetTetherStats(TetherFilter::pair(*int_iface, *ext_iface))
        }
        ("gettetherstats", _) => {
            return Err(ParseError::Usage("gettetherstats [<intInterface> <extInterface>]"))
        }

        (
            "enable"
            | "disable"
            | "removeglobalalert"
            | "setglobalalertinforwardchain"
            | "removeglobalalertinforwardchain"
            | "removesharedalert",
            _,
        ) => return Err(ParseError::Usage("<cmd> takes no arguments")),

        (other, _) => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(cmd)
}

/// Runs `bandwidth` requests against one controller.
pub struct CommandHandler {
    ctrl: BandwidthCtrl,

    /// Passed to every `enable`
    first_run: bool,
}

impl CommandHandler {
    pub fn new(ctrl: BandwidthCtrl, first_run: bool) -> Self {
        Self { ctrl, first_run }
    }

    pub fn ctrl(&self) -> &BandwidthCtrl {
        &self.ctrl
    }

    /// Parses and runs one line, writing the response to `sink`.
    ///
    /// Only a failing `sink` is reported as an error; command failures are
    /// answered on the sink. Blank lines are ignored.
    pub async fn handle_line(&mut self, sink: &mut dyn ResponseSink, line: &str) -> NetdResult<()> {
        if line.trim().is_empty() {
            return Ok(());
        }

        let cmd = match parse_command(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                debug!(line, error = %e, "Rejected bandwidth command");
                return sink.send_msg(e.code(), &e.to_string()).await;
            }
        };

        match cmd {
            BandwidthCommand::GetInterfaceQuota { iface } => {
                match self.ctrl.get_interface_quota(&iface).await {
                    Ok(bytes) => {
                        sink.send_msg(codes::QUOTA_COUNTER_RESULT, &bytes.to_string())
                            .await
                    }
                    Err(e) => send_failure(sink, &e).await,
                }
            }
            BandwidthCommand::GetTetherStats(filter) => {
                match self.ctrl.get_tether_stats(sink, &filter).await {
                    Ok(()) => Ok(()),
                    Err(e @ NetdError::Response { .. }) => Err(e),
                    Err(e) if e.is_parameter_error() => send_failure(sink, &e).await,
                    Err(e) => {
                        warn!(error = %e, diagnostic = ?e.diagnostic(), "Tether stats query failed");
                        sink.send_msg(codes::OPERATION_FAILED, "Failed to get tethering stats")
                            .await
                    }
                }
            }
            cmd => match self.run(cmd).await {
                Ok(()) => {
                    sink.send_msg(codes::COMMAND_OKAY, "Bandwidth command succeeded")
                        .await
                }
                Err(e) => send_failure(sink, &e).await,
            },
        }
    }

    /// Runs a command that answers with a plain success or failure.
    async fn run(&mut self, cmd: BandwidthCommand) -> NetdResult<()> {
        use BandwidthCommand::*;
        let ctrl = &mut self.ctrl;
        match cmd {
            Enable => ctrl.enable(self.first_run).await,
            Disable => ctrl.disable().await,
            SetSharedQuota { bytes, ifaces } => {
                for iface in &ifaces {
                    ctrl.set_interface_shared_quota(iface, bytes).await?;
                }
                Ok(())
            }
            RemoveSharedQuota { ifaces } => {
                for iface in &ifaces {
                    ctrl.remove_interface_shared_quota(iface).await?;
                }
                Ok(())
            }
            SetInterfaceQuota { iface, bytes } => ctrl.set_interface_quota(&iface, bytes).await,
            RemoveInterfaceQuota { iface } => ctrl.remove_interface_quota(&iface).await,
            SetGlobalAlert { bytes } => ctrl.set_global_alert(bytes).await,
            RemoveGlobalAlert => ctrl.remove_global_alert().await,
            SetGlobalAlertInForwardChain => ctrl.set_global_alert_in_forward_chain().await,
            RemoveGlobalAlertInForwardChain => ctrl.remove_global_alert_in_forward_chain().await,
            SetSharedAlert { bytes } => ctrl.set_shared_alert(bytes).await,
            RemoveSharedAlert => ctrl.remove_shared_alert().await,
            SetInterfaceAlert { iface, bytes } => ctrl.set_interface_alert(&iface, bytes).await,
            RemoveInterfaceAlert { iface } => ctrl.remove_interface_alert(&iface).await,
            AddNaughtyApps(uids) => ctrl.add_naughty_apps(&uids).await,
            RemoveNaughtyApps(uids) => ctrl.remove_naughty_apps(&uids).await,
            AddNiceApps(uids) => ctrl.add_nice_apps(&uids).await,
            RemoveNiceApps(uids) => ctrl.remove_nice_apps(&uids).await,
            SetDataSaver(enable) => ctrl.set_data_saver(enable).await,
            GetInterfaceQuota { .. } | GetTetherStats(_) => {
                Err(NetdError::invalid_argument("command", "not a plain command"))
            }
        }
    }
}

async fn send_failure(sink: &mut dyn ResponseSink, err: &NetdError) -> NetdResult<()> {
    if err.is_parameter_error() {
        return sink
            .send_msg(codes::COMMAND_PARAMETER_ERROR, &err.to_string())
            .await;
    }
    warn!(error = %err, "Bandwidth command failed");
    sink.send_msg(codes::OPERATION_FAILED, "Bandwidth command failed")
        .await
}

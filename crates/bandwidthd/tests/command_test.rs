//! `bandwidth` command handler tests
//!
//! Feeds request lines through `CommandHandler` and checks the response
//! lines written to a newline-delimited client.

use std::sync::Arc;

use netd_bandwidthd::quota::QUOTA_DIR;
use netd_bandwidthd::{BandwidthCtrl, CommandHandler, QuotaUpdater};
use netd_common::SocketClient;
use netd_test::{expect_restore_commands, tether_fixtures, CommandVerifier, FakeIptables, FakeSyscalls};
use pretty_assertions::assert_eq;

struct Harness {
    ipt: Arc<FakeIptables>,
    sys: FakeSyscalls,
    handler: CommandHandler,
}

fn harness() -> Harness {
    let ipt = Arc::new(FakeIptables::new());
    let sys = FakeSyscalls::new();
    let quota = QuotaUpdater::new(Arc::new(sys.clone()), QUOTA_DIR);
    let handler = CommandHandler::new(BandwidthCtrl::new(ipt.clone(), quota), false);
    Harness { ipt, sys, handler }
}

impl Harness {
    /// Runs `lines` and returns everything written back.
    async fn run(&mut self, lines: &[&str]) -> String {
        let mut client = SocketClient::with_delimiter(Vec::new(), b'\n');
        for line in lines {
            self.handler
                .handle_line(&mut client, line)
                .await
                .expect("response transport failed");
        }
        String::from_utf8(client.into_inner()).expect("reply is not utf-8")
    }
}

#[tokio::test]
async fn test_success_reply() {
    let mut h = harness();
    let reply = h.run(&["bandwidth setdatasaver true"]).await;
    assert_eq!(reply, "200 Bandwidth command succeeded\n");
    expect_restore_commands(
        &h.ipt,
        &["*filter\n-R bw_data_saver 1 --jump REJECT\nCOMMIT\n"],
    );
}

#[tokio::test]
async fn test_syntax_errors() {
    let mut h = harness();
    let reply = h.run(&["frobnicate", "setiquota wlan0", "", "bandwidth"]).await;
    assert_eq!(
        reply,
        "500 Unknown bandwidth cmd: frobnicate\n\
         500 Usage: bandwidth setiquota <interface> <bytes>\n\
         500 Usage: bandwidth <cmd> [args...]\n"
    );
}

#[tokio::test]
async fn test_parameter_errors() {
    let mut h = harness();
    let reply = h
        .run(&["setiquota wlan0 lots", "setiquota wlan0 0", "addniceapps root"])
        .await;
    let codes: Vec<&str> = reply.lines().map(|l| &l[..3]).collect();
    assert_eq!(codes, vec!["501", "501", "501"]);
    CommandVerifier::from_fake(&h.ipt)
        .assert_command_count(0)
        .expect("commands issued for rejected requests");
}

#[tokio::test]
async fn test_operation_failure() {
    let mut h = harness();
    let reply = h.run(&["removeiquota wlan0", "removeglobalalert"]).await;
    assert_eq!(
        reply,
        "400 Bandwidth command failed\n400 Bandwidth command failed\n"
    );
}

/// setquotas applies one shared quota to every listed interface
#[tokio::test]
async fn test_setquotas() {
    let mut h = harness();
    let reply = h.run(&["setquotas 123456 wlan0 rmnet0"]).await;
    assert_eq!(reply, "200 Bandwidth command succeeded\n");

    let ctrl = h.handler.ctrl();
    assert!(ctrl.shared_quota().is_member("wlan0"));
    assert!(ctrl.shared_quota().is_member("rmnet0"));
    assert_eq!(ctrl.shared_quota().quota(), 123456);

    let reply = h.run(&["removequotas wlan0 rmnet0"]).await;
    assert_eq!(reply, "200 Bandwidth command succeeded\n");
    assert!(h.handler.ctrl().shared_quota().is_empty());
}

#[tokio::test]
async fn test_getiquota() {
    let mut h = harness();
    h.sys.set_contents("/proc/net/xt_quota/rmnet0", "8192\n");

    let reply = h.run(&["getiquota rmnet0", "getiquota wlan0"]).await;
    let mut lines = reply.lines();
    assert_eq!(lines.next(), Some("220 8192"));
    // Empty counter file
    assert_eq!(lines.next(), Some("400 Bandwidth command failed"));
}

#[tokio::test]
async fn test_gettetherstats() {
    let mut h = harness();
    h.ipt.add_restore_output(tether_fixtures::IPV4_COUNTERS);
    h.ipt.add_restore_output(tether_fixtures::IPV6_COUNTERS);

    let reply = h.run(&["gettetherstats"]).await;
    assert_eq!(reply, tether_fixtures::ALL_PAIRS_REPLY);

    h.ipt.add_restore_output(tether_fixtures::IPV4_COUNTERS);
    let reply = h.run(&["gettetherstats"]).await;
    assert_eq!(reply, "400 Failed to get tethering stats\n");
}

#[tokio::test]
async fn test_enable_without_first_run() {
    let mut h = harness();
    h.ipt.add_restore_output("-N bw_costly_shared\n");

    let reply = h.run(&["enable"]).await;
    assert_eq!(reply, "200 Bandwidth command succeeded\n");

    let restores = h.ipt.take_restores();
    assert!(restores
        .iter()
        .all(|(_, batch)| !batch.contains("--uid-owner")));
}

//! End-to-end verification runs over a scripted emulated network.
//!
//! Hosts answer interface introspection with canned output; captures are
//! short shell scripts that print what tcpdump would.

use std::sync::Arc;

use topoverify::config::Config;
use topoverify::correlate::{BandwidthOutcome, HopOutcome, Reachability, RoutingVerdict};
use topoverify::exec::scripted::{ScriptedExecutor, ANY_HOST};
use topoverify::topology::radio_node_for;
use topoverify::verify::{Check, RoutingRow, Rows};

fn fast_config(ue_count: usize) -> Config {
    let mut config = Config::default();
    config.topology.ue_count = ue_count;
    config.capture.access_timeout_secs = 1;
    config.capture.core_timeout_secs = 1;
    config.capture.settle_delay_ms = 100;
    config.capture.stop_grace_ms = 200;
    config.capture.drain_timeout_ms = 1000;
    config
}

/// Canned introspection for `host`: each `(interface, address)` in order,
/// plus `lo` and `eth0`.
fn host(exec: &ScriptedExecutor, name: &str, interfaces: &[(&str, &str)]) {
    let mut listing = String::from("eth0\nlo\n");
    for (iface, _) in interfaces {
        listing.push_str(iface);
        listing.push('\n');
    }
    exec.reply(name, "ls /sys/class/net", &listing);
    for (iface, addr) in interfaces {
        exec.reply(
            name,
            &format!("ip -4 addr show {}", iface),
            &format!("3: {iface}: <UP> mtu 1500\n    inet {addr}/24 scope global {iface}\n"),
        );
    }
}

/// tcpdump stand-in that prints `lines`, outlives its 1 s window and then
/// prints a summary.
fn capture_script(listen_on: &str, lines: &[&str], captured: u32, filtered: u32) -> String {
    let mut script = format!("echo 'listening on {listen_on}, link-type EN10MB'; ");
    for line in lines {
        script.push_str(&format!("echo '{line}'; "));
    }
    script.push_str(&format!(
        "sleep 1.1; \
         echo '{captured} packets captured' >&2; \
         echo '{filtered} packets received by filter' >&2; \
         echo '0 packets dropped by kernel' >&2"
    ));
    script
}

/// Four UEs on two radio nodes. Only `ue4` holds the edge slice.
fn four_ue_network() -> Arc<ScriptedExecutor> {
    let exec = Arc::new(ScriptedExecutor::new());

    host(&exec, "ue1", &[("ue1", "172.22.0.11"), ("uesimtun0", "10.45.0.2")]);
    host(&exec, "ue2", &[("ue2", "172.22.0.12"), ("uesimtun0", "10.45.0.3")]);
    host(&exec, "ue3", &[("ue3", "172.22.0.13"), ("uesimtun0", "10.45.0.4")]);
    host(
        &exec,
        "ue4",
        &[
            ("ue4", "172.22.0.14"),
            ("uesimtun0", "10.45.0.5"),
            ("uesimtun1", "10.46.0.5"),
        ],
    );
    // host-named interface first: later rules win on prefix overlap
    host(&exec, "gnb1", &[("gnb1", "172.22.0.21"), ("gnb1-s1", "10.0.1.21")]);
    host(&exec, "gnb2", &[("gnb2", "172.22.0.22"), ("gnb2-s1", "10.0.1.22")]);
    host(&exec, "upf_cld", &[("upf_cld", "172.22.0.31"), ("ogstun", "10.45.0.1")]);
    host(&exec, "upf_mec", &[("upf_mec", "172.22.0.32"), ("ogstun", "10.46.0.1")]);
    host(&exec, "cp", &[("cp", "172.22.0.40")]);
    host(&exec, "mec_server", &[("mec_server", "172.22.0.50")]);

    // Access links carry GTP-U between the UE's radio-side address and the
    // radio node.
    exec.process(
        "gnb1",
        "timeout 1 tcpdump -i gnb1-s1",
        &capture_script(
            "gnb1-s1",
            &[
                "IP 172.22.0.11.4997 > 172.22.0.21.4997: UDP, length 120",
                "IP 172.22.0.13.4997 > 172.22.0.21.4997: UDP, length 120",
                "IP 172.22.0.21.4997 > 172.22.0.13.4997: UDP, length 120",
                "IP 172.22.0.13 > 172.22.0.21: ICMP echo request, id 3, seq 1, length 64",
            ],
            16,
            16,
        ),
    );
    exec.process(
        "gnb2",
        "timeout 1 tcpdump -i gnb2-s1",
        &capture_script(
            "gnb2-s1",
            &[
                "IP 172.22.0.12.4997 > 172.22.0.22.4997: UDP, length 120",
                "IP 172.22.0.14.4997 > 172.22.0.22.4997: UDP, length 120",
            ],
            9,
            9,
        ),
    );
    exec.process(
        "upf_cld",
        "timeout 1 tcpdump -i ogstun",
        &capture_script("ogstun", &["IP 10.45.0.4 > 142.250.184.4: ICMP echo request"], 12, 11),
    );
    exec.process(
        "upf_mec",
        "timeout 1 tcpdump -i ogstun",
        &capture_script("ogstun", &["IP 10.46.0.5 > 172.22.0.50: ICMP echo request"], 10, 10),
    );

    exec.reply(
        ANY_HOST,
        "ping",
        "8 packets transmitted, 8 received, 0% packet loss, time 7010ms\n",
    );
    exec
}

const IPERF_REPORT: &str = "[ ID] Interval           Transfer     Bitrate         Retr\n\
     [  5]   0.00-5.00   sec  56.4 MBytes  94.6 Mbits/sec    0             sender\n\
     [  5]   0.00-5.04   sec  55.9 MBytes  93.1 Mbits/sec                  receiver\n";

fn routing_rows(rows: Rows) -> Vec<RoutingRow> {
    match rows {
        Rows::Routing(rows) => rows,
        other => panic!("expected routing rows, got {other:?}"),
    }
}

fn verdicts(rows: &[RoutingRow]) -> Vec<&RoutingVerdict> {
    rows.iter()
        .filter_map(|r| match r {
            RoutingRow::Verdict(v) => Some(v),
            RoutingRow::Skipped { .. } => None,
        })
        .collect()
}

#[tokio::test]
async fn test_routing_uses_modulo_radio_node_assignment() {
    let exec = four_ue_network();
    let rows = routing_rows(
        topoverify::run_with(exec.clone(), fast_config(4), Check::Routing)
            .await
            .unwrap(),
    );
    // every UE gets a row per slice
    assert_eq!(rows.len(), 8);

    let verdicts = verdicts(&rows);
    let assigned: Vec<(&str, &str)> = verdicts
        .iter()
        .map(|v| (v.ue.as_str(), v.radio_node.as_str()))
        .collect();
    assert_eq!(
        assigned,
        vec![
            ("ue1", "gnb1"),
            ("ue2", "gnb2"),
            ("ue3", "gnb1"),
            ("ue4", "gnb2"),
            ("ue4", "gnb2"),
        ]
    );

    // The access captures really went to those hosts, in that order.
    let access_hosts: Vec<String> = exec
        .calls()
        .into_iter()
        .filter(|c| c.background && c.command.contains("-s1"))
        .map(|c| c.host)
        .collect();
    assert_eq!(access_hosts, vec!["gnb1", "gnb2", "gnb1", "gnb2", "gnb2"]);

    // UE3's capture runs on the radio node the modulo rule picks, on that
    // node's own access interface.
    let expected = format!("gnb{}", radio_node_for(3, 2));
    let ue3 = verdicts[2];
    assert_eq!(ue3.access.host, expected);
    assert_eq!(ue3.access.interface, format!("{expected}-s1"));
    assert_eq!(access_hosts[2], expected);
    assert_eq!(
        exec.calls_to(&expected, &format!("timeout 1 tcpdump -i {expected}-s1")).len(),
        2
    );

    assert_eq!(ue3.route(), "ue3[uesimtun0] -> gnb1 -> upf_cld -> www.google.com");
    assert_eq!(
        ue3.core.outcome,
        HopOutcome::Observed {
            captured: 12,
            filtered: 11
        }
    );
    assert_eq!(
        ue3.access.outcome,
        HopOutcome::Observed {
            captured: 16,
            filtered: 16
        }
    );
    assert_eq!(ue3.packets.to_string(), "12/8");
    assert!(ue3.passed());
}

#[tokio::test]
async fn test_access_hop_filter_matches_radio_side_address() {
    let exec = four_ue_network();
    let rows = routing_rows(
        topoverify::run_with(exec, fast_config(4), Check::Routing)
            .await
            .unwrap(),
    );
    let verdicts = verdicts(&rows);

    // Two UDP lines carry ue3's 172.22.0.13; its ICMP line does not count.
    let ue3 = verdicts[2];
    assert_eq!(ue3.access.matched_lines, Some(2));
    assert_eq!(verdicts[0].access.matched_lines, Some(1));
    assert_eq!(verdicts[1].access.matched_lines, Some(1));
    // The core hop is not filtered.
    assert_eq!(ue3.core.matched_lines, None);
}

#[tokio::test]
async fn test_edge_slice_goes_through_edge_user_plane() {
    let exec = four_ue_network();
    let rows = routing_rows(
        topoverify::run_with(exec.clone(), fast_config(4), Check::Routing)
            .await
            .unwrap(),
    );
    let RoutingRow::Verdict(edge) = &rows[7] else {
        panic!("expected a verdict");
    };
    assert_eq!(edge.route(), "ue4[uesimtun1] -> gnb2 -> upf_mec -> mec_server");
    assert_eq!(edge.core.host, "upf_mec");
    assert_eq!(edge.core.outcome.to_string(), "10/10");

    // The edge ping targets the edge server's address, from the edge tunnel.
    assert_eq!(
        exec.calls_to("ue4", "ping -c 8 -n -I uesimtun1 172.22.0.50").len(),
        1
    );
}

#[tokio::test]
async fn test_missing_edge_tunnel_gets_failure_rows() {
    let exec = four_ue_network();
    exec.reply_exit(ANY_HOST, "pkill", 1, "", "");
    exec.process(ANY_HOST, "iperf3 -s", "exec sleep 5");
    exec.reply(ANY_HOST, "iperf3 -c", IPERF_REPORT);
    let config = fast_config(1);

    let latency = match topoverify::run_with(exec.clone(), config.clone(), Check::Latency)
        .await
        .unwrap()
    {
        Rows::Latency(rows) => rows,
        other => panic!("expected latency rows, got {other:?}"),
    };
    assert_eq!(latency.len(), 2);
    assert_eq!(latency[1].interface, "uesimtun1");
    assert_eq!(latency[1].to, "upf_mec");
    assert_eq!(latency[1].result, Reachability::NotFound);

    let bandwidth = match topoverify::run_with(exec.clone(), config.clone(), Check::Bandwidth)
        .await
        .unwrap()
    {
        Rows::Bandwidth(rows) => rows,
        other => panic!("expected bandwidth rows, got {other:?}"),
    };
    let pairs: Vec<(&str, &str)> = bandwidth
        .iter()
        .map(|r| (r.server.as_str(), r.host.as_str()))
        .collect();
    assert_eq!(pairs, vec![("upf_mec", "ue1"), ("upf_cld", "ue1")]);
    assert!(matches!(
        &bandwidth[0].outcome,
        BandwidthOutcome::ExecFailed { reason } if reason == "no uesimtun1"
    ));
    assert!(bandwidth[1].outcome.passed());
    assert!(exec.calls_to("upf_mec", "iperf3 -s").is_empty());

    let routing = routing_rows(
        topoverify::run_with(exec, config, Check::Routing)
            .await
            .unwrap(),
    );
    assert_eq!(routing.len(), 2);
    assert!(matches!(&routing[0], RoutingRow::Verdict(v) if v.ue == "ue1"));
    match &routing[1] {
        RoutingRow::Skipped { ue, reason } => {
            assert_eq!(ue, "ue1");
            assert_eq!(reason, "no uesimtun1");
        }
        other => panic!("expected a skipped row, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_hop_does_not_hide_other_rows() {
    let exec = four_ue_network();
    // gnb2 has gone away after discovery.
    exec.process(
        "gnb2",
        "timeout 1 tcpdump",
        "echo 'tcpdump: gnb2-s1: No such device exists' >&2; exit 1",
    );
    let rows = routing_rows(
        topoverify::run_with(exec, fast_config(4), Check::Routing)
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 8);

    let verdicts = verdicts(&rows);
    assert_eq!(verdicts.len(), 5);
    let mut passed = 0;
    for v in verdicts {
        if v.radio_node == "gnb2" {
            assert!(v.access.error.is_some());
            assert_eq!(v.access.outcome, HopOutcome::NoData);
            assert!(!v.passed());
        } else {
            assert!(v.passed());
            passed += 1;
        }
    }
    assert_eq!(passed, 2);
}

#[tokio::test]
async fn test_latency_reports_each_failure_mode() {
    let exec = four_ue_network();
    exec.reply(
        "ue2",
        "ping",
        "ping: SO_BINDTODEVICE uesimtun0: No such device\n",
    );
    exec.reply("ue3", "ping", "garbled output\n");
    exec.timeout("ue4", "ping -c 8 -n -I uesimtun1");

    let rows = match topoverify::run_with(exec, fast_config(4), Check::Latency)
        .await
        .unwrap()
    {
        Rows::Latency(rows) => rows,
        other => panic!("expected latency rows, got {other:?}"),
    };
    let results: Vec<(String, String, Reachability)> = rows
        .into_iter()
        .map(|r| (format!("{}[{}]", r.ue, r.interface), r.to, r.result))
        .collect();

    // cloud then edge for every UE
    assert_eq!(results.len(), 8);
    assert_eq!(results[0].0, "ue1[uesimtun0]");
    assert_eq!(results[0].1, "upf_cld");
    assert_eq!(results[0].2.to_string(), "8/8");
    assert_eq!(results[1].0, "ue1[uesimtun1]");
    assert_eq!(results[1].2, Reachability::NotFound);
    assert_eq!(results[2].2, Reachability::NotFound);
    assert!(matches!(results[4].2, Reachability::Error { .. }));
    assert_eq!(results[6].2.to_string(), "8/8");
    assert_eq!(results[7].1, "upf_mec");
    assert!(matches!(results[7].2, Reachability::ExecFailed { .. }));
}

#[tokio::test]
async fn test_missing_user_plane_aborts_before_probing() {
    let exec = four_ue_network();
    exec.unreachable("upf_mec");

    let err = topoverify::run_with(exec.clone(), fast_config(4), Check::Routing)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("upf_mec"));
    assert!(exec.calls().iter().all(|c| !c.background));
    assert!(exec.calls_to(ANY_HOST, "ping").is_empty());
}

#[tokio::test]
async fn test_details_lists_components_in_order() {
    let exec = four_ue_network();
    let rows = match topoverify::run_with(exec, fast_config(4), Check::Details)
        .await
        .unwrap()
    {
        Rows::Details(rows) => rows,
        other => panic!("expected detail rows, got {other:?}"),
    };
    let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["ue1", "ue2", "ue3", "ue4", "gnb1", "gnb2", "upf_mec", "upf_cld", "cp", "mec_server"]
    );
    let ue4 = &rows[3];
    assert_eq!(ue4.interfaces.to_string(), "uesimtun0:10.45.0.5 uesimtun1:10.46.0.5");
    assert!(rows.iter().all(|r| !r.interfaces.contains("lo") && !r.interfaces.contains("eth0")));
}

#[tokio::test]
async fn test_bandwidth_restarts_server_for_every_ue() {
    let exec = four_ue_network();
    // pkill finds nothing to kill
    exec.reply_exit(ANY_HOST, "pkill", 1, "", "");
    exec.process(ANY_HOST, "iperf3 -s", "exec sleep 5");
    exec.reply(ANY_HOST, "iperf3 -c", IPERF_REPORT);

    let rows = match topoverify::run_with(exec.clone(), fast_config(4), Check::Bandwidth)
        .await
        .unwrap()
    {
        Rows::Bandwidth(rows) => rows,
        other => panic!("expected bandwidth rows, got {other:?}"),
    };

    // Edge slice first, then the cloud slice, one row per UE each.
    let pairs: Vec<(&str, &str, bool)> = rows
        .iter()
        .map(|r| (r.server.as_str(), r.host.as_str(), r.outcome.passed()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("upf_mec", "ue1", false),
            ("upf_mec", "ue2", false),
            ("upf_mec", "ue3", false),
            ("upf_mec", "ue4", true),
            ("upf_cld", "ue1", true),
            ("upf_cld", "ue2", true),
            ("upf_cld", "ue3", true),
            ("upf_cld", "ue4", true),
        ]
    );

    assert_eq!(exec.calls_to("upf_cld", "iperf3 -s").len(), 4);
    assert_eq!(exec.calls_to("upf_mec", "iperf3 -s").len(), 1);
    assert_eq!(
        exec.calls_to("ue4", "iperf3 -c 172.22.0.32 -B 10.46.0.5").len(),
        1
    );
}

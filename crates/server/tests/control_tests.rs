//! End-to-end tests of the control channel
//!
//! A real `ControlServer` on an ephemeral port, driven both through
//! `ControlClient` and through raw JSON lines.
//!
//! Run with: `cargo test -p server --test control_tests`

#![cfg(unix)]

mod support;

use common::test_utils::{DEFAULT_TEST_TIMEOUT, wait_until, with_timeout};
use protocol::{HotplugAction, HotplugEvent, Request, Response};
use server::network::{ControlClient, ControlServer};
use std::net::SocketAddr;
use support::Harness;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct RunningServer {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<anyhow::Result<()>>,
}

async fn serve(h: &Harness) -> RunningServer {
    let server = ControlServer::bind("127.0.0.1:0", h.portal.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel();
    let task = tokio::spawn(server.run(async {
        let _ = stopped.await;
    }));
    RunningServer { addr, stop, task }
}

impl RunningServer {
    async fn client(&self) -> ControlClient {
        ControlClient::connect(&self.addr.to_string()).await.unwrap()
    }

    async fn shutdown(self) {
        let _ = self.stop.send(());
        with_timeout(DEFAULT_TEST_TIMEOUT, self.task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

/// Send raw lines and collect one response line per request line
async fn raw_exchange(addr: SocketAddr, lines: &[&str]) -> Vec<serde_json::Value> {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut responses = Vec::new();
    for line in lines {
        writer.write_all(line.as_bytes()).await.unwrap();
        writer.write_all(b"\n").await.unwrap();
        let mut response = String::new();
        reader.read_line(&mut response).await.unwrap();
        responses.push(serde_json::from_str(&response).unwrap());
    }
    responses
}

#[tokio::test]
async fn test_info_and_status() {
    let h = Harness::new(&[("usb-1", "SLOT1"), ("usb-2", "SLOT2")]);
    let server = serve(&h).await;
    let mut client = server.client().await;

    match client.call(&Request::Info).await.unwrap() {
        Response::Info(info) => {
            assert_eq!(info.host_ip, "127.0.0.1");
            assert_eq!(info.slots_configured, 2);
            assert_eq!(info.slots_running, 0);
        }
        other => panic!("unexpected response: {:?}", other),
    }

    match client.call(&Request::Status).await.unwrap() {
        Response::Status { slots, hostname, .. } => {
            assert_eq!(hostname, "localhost");
            let keys: Vec<&str> = slots.iter().map(|s| s.slot_key.as_str()).collect();
            assert_eq!(keys, vec!["usb-1", "usb-2"]);
            assert!(slots.iter().all(|s| !s.present && !s.running));
        }
        other => panic!("unexpected response: {:?}", other),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_hotplug_lifecycle_over_wire() {
    let h = Harness::new(&[("usb-1", "SLOT1")]);
    let dev = h.device("ttyACM0");
    let server = serve(&h).await;
    let mut client = server.client().await;

    let add = Request::Hotplug {
        event: HotplugEvent {
            action: HotplugAction::Add,
            devnode: Some(dev.clone()),
            id_path: "usb-1".to_string(),
            devpath: "/devices/usb1/1-2".to_string(),
        },
    };
    match client.call(&add).await.unwrap() {
        Response::Hotplug {
            slot_key, accepted, ..
        } => {
            assert_eq!(slot_key, "usb-1");
            assert!(accepted);
        }
        other => panic!("unexpected response: {:?}", other),
    }

    let slot = h.portal.registry().get("usb-1").unwrap();
    assert!(wait_until(DEFAULT_TEST_TIMEOUT, || slot.state().running).await);

    let remove = Request::Hotplug {
        event: HotplugEvent {
            action: HotplugAction::Remove,
            devnode: Some(dev),
            id_path: "usb-1".to_string(),
            devpath: String::new(),
        },
    };
    client.call(&remove).await.unwrap();
    assert!(!slot.state().running);
    assert!(h.live_pids().is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_manual_controls_over_wire() {
    let h = Harness::new(&[("usb-1", "SLOT1")]);
    let dev = h.device("ttyUSB0");
    let server = serve(&h).await;
    let mut client = server.client().await;

    let start = Request::Start {
        slot_key: "usb-1".to_string(),
        devnode: dev,
    };
    match client.call(&start).await.unwrap() {
        Response::Control {
            ok, running, error, ..
        } => {
            assert!(ok);
            assert!(running);
            assert_eq!(error, None);
        }
        other => panic!("unexpected response: {:?}", other),
    }

    let stop = Request::Stop {
        slot_key: "usb-1".to_string(),
    };
    let response = client.call(&stop).await.unwrap();
    assert!(response.is_ok());
    assert!(h.live_pids().is_empty());

    let unknown = Request::Stop {
        slot_key: "usb-5".to_string(),
    };
    match client.call(&unknown).await.unwrap() {
        Response::Control { ok, error, .. } => {
            assert!(!ok);
            assert!(error.unwrap().contains("usb-5"));
        }
        other => panic!("unexpected response: {:?}", other),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_failed_start_reports_error() {
    let h = Harness::new(&[("usb-1", "SLOT1")]);
    let missing = h.dir.path().join("ttyACM9").to_string_lossy().into_owned();
    let server = serve(&h).await;
    let mut client = server.client().await;

    let response = client
        .call(&Request::Start {
            slot_key: "usb-1".to_string(),
            devnode: missing,
        })
        .await
        .unwrap();
    assert!(!response.is_ok());
    match response {
        Response::Control { running, error, .. } => {
            assert!(!running);
            assert!(error.unwrap().contains("device not ready"));
        }
        other => panic!("unexpected response: {:?}", other),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_malformed_lines_do_not_touch_state() {
    let h = Harness::new(&[("usb-1", "SLOT1")]);
    let server = serve(&h).await;

    let responses = raw_exchange(
        server.addr,
        &[
            "not json",
            r#"{"method":"hotplug","event":{"action":"change","id_path":"usb-1"}}"#,
            r#"{"method":"hotplug","event":{"action":"add","devnode":"/dev/ttyACM0"}}"#,
            r#"{"method":"info"}"#,
        ],
    )
    .await;

    assert_eq!(responses[0]["result"], "error");
    assert_eq!(responses[1]["result"], "error");
    assert_eq!(responses[2]["result"], "error");
    assert!(
        responses[2]["error"]
            .as_str()
            .unwrap()
            .contains("missing id_path and devpath")
    );
    // Connection survives bad input
    assert_eq!(responses[3]["result"], "info");

    assert_eq!(h.portal.registry().len(), 1);
    assert_eq!(h.portal.registry().next_seq(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_client_reports_error_responses() {
    let h = Harness::new(&[]);
    let server = serve(&h).await;
    let mut client = server.client().await;

    let bad = Request::Hotplug {
        event: HotplugEvent {
            action: HotplugAction::Remove,
            devnode: None,
            id_path: String::new(),
            devpath: String::new(),
        },
    };
    assert!(matches!(
        client.request(&bad).await.unwrap(),
        Response::Error { .. }
    ));
    assert!(client.call(&bad).await.is_err());

    server.shutdown().await;
}

#[tokio::test]
async fn test_status_larger_than_request_limit() {
    let h = Harness::new(&[]);
    let server = serve(&h).await;
    let mut client = server.client().await;

    let prefix = "platform-fd500000.pcie-pci-0000:01:00.0-usb-0:1.4.".repeat(4);
    for i in 0..300 {
        let event = HotplugEvent {
            action: HotplugAction::Add,
            devnode: Some(format!("/dev/ttyUSB{}", i)),
            id_path: format!("{}{}:1.0", prefix, i),
            devpath: String::new(),
        };
        client.call(&Request::Hotplug { event }).await.unwrap();
    }

    let line = protocol::encode_line(&Response::Status {
        slots: h.portal.status(),
        host_ip: String::new(),
        hostname: String::new(),
    })
    .unwrap();
    assert!(line.len() > protocol::MAX_LINE_LEN);

    match client.call(&Request::Status).await.unwrap() {
        Response::Status { slots, .. } => assert_eq!(slots.len(), 300),
        other => panic!("unexpected response: {:?}", other),
    }

    server.shutdown().await;
}

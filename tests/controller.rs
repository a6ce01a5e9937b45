//! End-to-end exercise of a `Controller` over a real TCP socket: bind to
//! an ephemeral port, dial in as a worker, and walk one request/response
//! cycle.

use bearmon_core::alert::NullAlertBackend;
use bearmon_core::check::StoredCheck;
use bearmon_core::config::ControllerConfig;
use bearmon_core::controller::Controller;
use bearmon_core::proto::{CheckStatus, ControllerRequest, ControllerResponse};
use bearmon_core::store::MemStore;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

async fn dial(addr: SocketAddr, password: &str) -> (BufReader<tokio::net::tcp::OwnedReadHalf>, tokio::net::tcp::OwnedWriteHalf) {
    let stream = TcpStream::connect(addr).await.expect("connect to controller");
    let (read_half, mut write_half) = stream.into_split();
    write_half.write_all(format!("{password}\n").as_bytes()).await.unwrap();
    (BufReader::new(read_half), write_half)
}

async fn roundtrip(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    request: &ControllerRequest,
) -> ControllerResponse {
    let mut line = serde_json::to_string(request).unwrap();
    line.push('\n');
    writer.write_all(line.as_bytes()).await.unwrap();

    let mut response_line = String::new();
    reader.read_line(&mut response_line).await.unwrap();
    serde_json::from_str(response_line.trim_end()).unwrap()
}

/// A worker that authenticates and asks for one check is handed it, and a
/// second worker asking in the same beat gets nothing (the check is locked).
#[tokio::test]
async fn worker_receives_assignment_and_second_worker_is_locked_out() {
    let store = Arc::new(
        MemStore::new().with_check(StoredCheck {
            id: 1,
            name: "example".into(),
            check_type: "http".into(),
            data: Value::Null,
            interval_secs: 0,
            delay: 0,
            status: CheckStatus::Online,
        }),
    );
    let alerts = Arc::new(NullAlertBackend::default());
    let config = ControllerConfig { addr: "127.0.0.1:0".parse().unwrap(), confirmations: 1 };
    let controller = Controller::new(&config, "secret".into(), false, store, alerts);

    let listener = tokio::net::TcpListener::bind(config.addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let ctl = controller.clone();
    tokio::spawn(async move {
        ctl.serve(listener).await.unwrap();
    });

    // Give the reload loop a tick against the store before dialing in.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let (mut reader_a, mut writer_a) = dial(addr, "secret").await;
    let resp_a = roundtrip(&mut reader_a, &mut writer_a, &ControllerRequest { results: Default::default(), count: 1 }).await;
    assert_eq!(resp_a.checks, vec![1]);

    let (mut reader_b, mut writer_b) = dial(addr, "secret").await;
    let resp_b = roundtrip(&mut reader_b, &mut writer_b, &ControllerRequest { results: Default::default(), count: 1 }).await;
    assert!(resp_b.checks.is_empty(), "check 1 is locked by worker A");
}

/// A wrong password gets the connection dropped with no response line.
#[tokio::test]
async fn wrong_password_disconnects_without_reply() {
    let store = Arc::new(MemStore::new());
    let alerts = Arc::new(NullAlertBackend::default());
    let config = ControllerConfig { addr: "127.0.0.1:0".parse().unwrap(), confirmations: 1 };
    let controller = Controller::new(&config, "secret".into(), false, store, alerts);

    let listener = tokio::net::TcpListener::bind(config.addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        controller.serve(listener).await.unwrap();
    });

    let (mut reader, _writer) = dial(addr, "wrong").await;
    let mut line = String::new();
    let n = reader.read_line(&mut line).await.unwrap();
    assert_eq!(n, 0, "connection should be closed, not answered");
}

//! End-to-end exercise of the view server's request protocol over a real
//! TCP socket.

use bearmon_core::config::ViewServerConfig;
use bearmon_core::viewserver::ViewServer;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// With no controllers configured the view server has no active leader and
/// answers every `request` with an empty line.
#[tokio::test]
async fn request_with_no_active_controller_returns_empty_line() {
    let config = ViewServerConfig { addr: "127.0.0.1:0".parse().unwrap(), controllers: vec![] };
    let view_server = ViewServer::new(&config);

    let listener = TcpListener::bind(config.addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        view_server.serve(listener).await.unwrap();
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_half.write_all(b"request\n").await.unwrap();
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line, "\n");
}

/// A malformed request line gets the connection dropped rather than a reply.
#[tokio::test]
async fn garbage_request_disconnects_without_reply() {
    let config = ViewServerConfig { addr: "127.0.0.1:0".parse().unwrap(), controllers: vec![] };
    let view_server = ViewServer::new(&config);

    let listener = TcpListener::bind(config.addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        view_server.serve(listener).await.unwrap();
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_half.write_all(b"not-a-real-request\n").await.unwrap();
    let mut line = String::new();
    let n = reader.read_line(&mut line).await.unwrap();
    assert_eq!(n, 0, "connection should be closed, not answered");
}

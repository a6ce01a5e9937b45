//! Per-controller ping loop: reuses the worker protocol with an empty
//! request and no password.

use super::ViewServer;
use crate::proto::{ControllerRequest, ControllerResponse};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

const SUCCESS_INTERVAL: Duration = Duration::from_secs(5);
const FAILURE_BACKOFF: Duration = Duration::from_secs(30);
const READ_DEADLINE: Duration = Duration::from_secs(5);

/// Holds one connection to `controller_addr` across consecutive successful
/// rounds, only reconnecting after a failure — the same discipline as
/// `worker::controller_link`'s `conn` variable.
pub async fn run(controller_addr: SocketAddr, view: Arc<ViewServer>) {
    let mut conn: Option<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> = None;

    loop {
        if conn.is_none() {
            conn = match TcpStream::connect(controller_addr).await {
                Ok(stream) => {
                    let (read_half, write_half) = stream.into_split();
                    Some((BufReader::new(read_half), write_half))
                }
                Err(_) => {
                    view.update_ping(controller_addr, false);
                    tokio::time::sleep(FAILURE_BACKOFF).await;
                    continue;
                }
            };
        }

        let (reader, writer) = conn.as_mut().unwrap();
        match ping_once(reader, writer).await {
            Ok(()) => {
                view.update_ping(controller_addr, true);
                tokio::time::sleep(SUCCESS_INTERVAL).await;
            }
            Err(_) => {
                conn = None;
                view.update_ping(controller_addr, false);
                tokio::time::sleep(FAILURE_BACKOFF).await;
            }
        }
    }
}

async fn ping_once(reader: &mut BufReader<OwnedReadHalf>, writer: &mut OwnedWriteHalf) -> std::io::Result<()> {
    let mut line = serde_json::to_string(&ControllerRequest::empty())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;

    let mut response_line = String::new();
    let n = tokio::time::timeout(READ_DEADLINE, reader.read_line(&mut response_line))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "ping read timed out"))??;
    if n == 0 {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "controller closed connection"));
    }

    let _: ControllerResponse =
        serde_json::from_str(response_line.trim_end()).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(())
}

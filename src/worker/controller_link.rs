//! The worker's controller-link task: holds one connection to the
//! currently active controller, posting capacity and pending results
//! every cycle.

use super::Shared;
use crate::proto::{ControllerRequest, ControllerResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;

const CYCLE_INTERVAL: Duration = Duration::from_secs(2);
const READ_DEADLINE: Duration = Duration::from_secs(5);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(10);
const NO_CONTROLLER_BACKOFF: Duration = Duration::from_secs(5);

pub async fn run(shared: Arc<Shared>, password: String) {
    let mut conn: Option<(BufReader<OwnedReadHalf>, tokio::net::tcp::OwnedWriteHalf, String)> = None;

    loop {
        let active = shared.active_controller();

        if let Some((_, _, current)) = &conn {
            if *current != active {
                info!("worker: controller changed from {current} to {active}, disconnecting");
                conn = None;
                continue;
            }
        }

        if conn.is_none() {
            if active.is_empty() {
                tokio::time::sleep(NO_CONTROLLER_BACKOFF).await;
                continue;
            }
            match connect(&active, &password).await {
                Ok(pair) => conn = Some((pair.0, pair.1, active.clone())),
                Err(e) => {
                    warn!("worker: connect error: {e}");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                    continue;
                }
            }
        }

        let (reader, writer, _) = conn.as_mut().unwrap();
        match cycle(reader, writer, &shared).await {
            Ok(()) => tokio::time::sleep(CYCLE_INTERVAL).await,
            Err(e) => {
                warn!("worker: controller disconnected: {e}");
                conn = None;
                tokio::time::sleep(RECONNECT_BACKOFF).await;
            }
        }
    }
}

async fn connect(addr: &str, password: &str) -> std::io::Result<(BufReader<OwnedReadHalf>, tokio::net::tcp::OwnedWriteHalf)> {
    info!("worker: connecting to controller at {addr}");
    let stream = TcpStream::connect(addr).await?;
    let (read_half, mut write_half) = stream.into_split();
    write_half.write_all(format!("{password}\n").as_bytes()).await?;
    Ok((BufReader::new(read_half), write_half))
}

async fn cycle(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    shared: &Arc<Shared>,
) -> std::io::Result<()> {
    let (count, pending) = shared.snapshot_request();
    let shipped: Vec<_> = pending.keys().copied().collect();
    let request = ControllerRequest { results: crate::proto::CheckResults(pending), count };

    let mut line = serde_json::to_string(&request).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;

    let mut response_line = String::new();
    tokio::time::timeout(READ_DEADLINE, reader.read_line(&mut response_line))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "controller read timed out"))??;
    if response_line.is_empty() {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "controller closed connection"));
    }

    let response: ControllerResponse = serde_json::from_str(response_line.trim_end())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    shared.apply_response(&shipped, response.checks);
    Ok(())
}

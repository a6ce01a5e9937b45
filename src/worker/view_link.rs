//! The worker's view task: polls the view server for the current active
//! controller.

use super::Shared;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const POLL_INTERVAL: Duration = Duration::from_secs(10);
const READ_DEADLINE: Duration = Duration::from_secs(5);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(10);

pub async fn run(view_addr: SocketAddr, shared: Arc<Shared>) {
    loop {
        info!("worker: connecting to viewserver at {view_addr}");
        let stream = match TcpStream::connect(view_addr).await {
            Ok(s) => s,
            Err(e) => {
                warn!("worker: viewserver connect error: {e}");
                tokio::time::sleep(RECONNECT_BACKOFF).await;
                continue;
            }
        };
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        loop {
            if let Err(e) = write_half.write_all(b"request\n").await {
                warn!("worker: viewserver disconnected: {e}");
                break;
            }

            let mut line = String::new();
            let read = tokio::time::timeout(READ_DEADLINE, reader.read_line(&mut line)).await;
            match read {
                Ok(Ok(n)) if n > 0 => {
                    shared.set_active_controller(line.trim().to_string());
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                _ => {
                    warn!("worker: viewserver disconnected");
                    break;
                }
            }
        }

        tokio::time::sleep(RECONNECT_BACKOFF).await;
    }
}

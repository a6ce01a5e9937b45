//! The view server: tracks controller health and answers "who is active?"
//! with sticky failover.

mod pinger;

use crate::config::ViewServerConfig;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub struct ViewServer {
    controllers: Vec<SocketAddr>,
    state: Mutex<State>,
}

struct State {
    /// Per-controller uptime counter; zero means down. Iteration order
    /// follows `controllers`, giving first-seen tie-break order.
    uptime: HashMap<SocketAddr, u32>,
    active: Option<SocketAddr>,
}

impl ViewServer {
    pub fn new(config: &ViewServerConfig) -> Arc<ViewServer> {
        let uptime = config.controllers.iter().map(|&addr| (addr, 0)).collect();
        Arc::new(ViewServer { controllers: config.controllers.clone(), state: Mutex::new(State { uptime, active: None }) })
    }

    fn active(&self) -> Option<SocketAddr> {
        self.state.lock().unwrap().active
    }

    /// Applies one ping result to the sticky-leader state machine: a
    /// healthy incumbent is never preempted, and only a failed ping
    /// triggers a promotion.
    fn update_ping(&self, controller: SocketAddr, up: bool) {
        let mut state = self.state.lock().unwrap();

        if up {
            *state.uptime.get_mut(&controller).unwrap() += 1;
            if state.active.is_none() {
                info!("viewserver: initializing controller to {controller}");
                state.active = Some(controller);
            }
            return;
        }

        info!("viewserver: marking controller {controller} as down");
        state.uptime.insert(controller, 0);

        if state.active == Some(controller) {
            let mut best: Option<(SocketAddr, u32)> = None;
            for &addr in &self.controllers {
                let up = state.uptime[&addr];
                if up > 0 && best.map(|(_, best_up)| up > best_up).unwrap_or(true) {
                    best = Some((addr, up));
                }
            }
            state.active = best.map(|(addr, _)| addr);
            match state.active {
                Some(next) => info!("viewserver: failover from {controller} to {next}"),
                None => warn!("viewserver: controller {controller} failed, but no one found to replace"),
            }
        }
    }

    /// Starts a pinger per configured controller, then the request
    /// listener.
    pub async fn start(self: &Arc<Self>, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("viewserver: listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Runs the pingers and accept loop against an already-bound listener.
    /// Split out of `start` so tests can bind to an ephemeral port and
    /// learn the real address before serving it.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        for &controller in &self.controllers {
            let view = self.clone();
            tokio::spawn(async move { pinger::run(controller, view).await });
        }

        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!("viewserver: error while accepting connection: {e}");
                    continue;
                }
            };
            info!("viewserver: new connection from {peer}");
            let view = self.clone();
            tokio::spawn(async move {
                if let Err(e) = view.handle(socket).await {
                    info!("viewserver: client at {peer} disconnected: {e}");
                }
            });
        }
    }

    async fn handle(self: &Arc<Self>, socket: TcpStream) -> std::io::Result<()> {
        let (read_half, mut write_half) = socket.into_split();
        let mut reader = BufReader::new(read_half);

        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                return Ok(());
            }
            if line.trim() != "request" {
                return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, format!("invalid request [{}]", line.trim())));
            }

            let active = self.active().map(|a| a.to_string()).unwrap_or_default();
            write_half.write_all(format!("{active}\n").as_bytes()).await?;
        }
    }
}

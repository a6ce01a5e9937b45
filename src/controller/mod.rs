//! The controller: authoritative in-memory check registry, confirmation
//! machine, and assignment policy.

mod fanout;
mod registry;

use crate::alert::AlertBackend;
use crate::check::Check;
use crate::config::ControllerConfig;
use crate::error::BearmonError;
use crate::proto::{CheckId, ControllerRequest, ControllerResponse};
use crate::store::Store;
use registry::Registry;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const RELOAD_INTERVAL: Duration = Duration::from_secs(60);

pub struct Controller {
    password: String,
    debug: bool,
    registry: Mutex<Registry>,
    store: Arc<dyn Store>,
    alerts: Arc<dyn AlertBackend>,
}

impl Controller {
    pub fn new(
        config: &ControllerConfig,
        password: String,
        debug: bool,
        store: Arc<dyn Store>,
        alerts: Arc<dyn AlertBackend>,
    ) -> Arc<Controller> {
        Arc::new(Controller { password, debug, registry: Mutex::new(Registry::new(config.confirmations)), store, alerts })
    }

    /// Thread-safe snapshot read used by a co-located worker's executors.
    pub fn get_check(&self, id: CheckId) -> Option<Check> {
        self.registry.lock().unwrap().get(id)
    }

    /// Binds a TCP listener, spawning a handler per connection plus the
    /// reload loop.
    pub async fn start(self: &Arc<Self>, addr: std::net::SocketAddr) -> io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("controller: listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Runs the accept loop and reload loop against an already-bound
    /// listener. Split out of `start` so tests can bind to an ephemeral
    /// port and learn the real address before serving it.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> io::Result<()> {
        let reload_controller = self.clone();
        tokio::spawn(async move {
            loop {
                reload_controller.reload().await;
                tokio::time::sleep(RELOAD_INTERVAL).await;
            }
        });

        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!("controller: error while accepting connection: {e}");
                    continue;
                }
            };
            info!("controller: new connection from {peer}");
            let controller = self.clone();
            tokio::spawn(async move {
                if let Err(e) = controller.handle(socket, peer.to_string()).await {
                    info!("controller: worker at {peer} disconnected: {e}");
                }
            });
        }
    }

    async fn handle(self: &Arc<Self>, socket: TcpStream, peer: String) -> Result<(), BearmonError> {
        let (read_half, mut write_half) = socket.into_split();
        let mut reader = BufReader::new(read_half);

        let mut password_line = String::new();
        reader.read_line(&mut password_line).await?;
        if password_line.trim_end() != self.password {
            info!("controller: terminating connection from {peer} due to incorrect password");
            return Ok(());
        }

        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(BearmonError::Protocol("connection closed".into()));
            }

            let request: ControllerRequest = serde_json::from_str(line.trim_end())?;
            let response = self.request(&peer, request).await;

            let mut out = serde_json::to_string(&response)?;
            out.push('\n');
            write_half.write_all(out.as_bytes()).await?;
        }
    }

    /// Runs the assignment algorithm under the registry lock, then
    /// dispatches fan-out for any transitions outside the lock.
    async fn request(self: &Arc<Self>, requestor: &str, request: ControllerRequest) -> ControllerResponse {
        let now = Instant::now();
        let (response, transitions) = {
            let mut registry = self.registry.lock().unwrap();
            registry.handle_request(requestor, request.results.0, request.count, now)
        };

        for transition in transitions {
            let Some(check) = self.get_check(transition.check_id) else { continue };
            info!("status of check {} changed to {}", check.name, transition.result.status);
            let controller = self.clone();
            let debug = self.debug;
            tokio::spawn(async move {
                let store = controller.store.clone();
                let alerts = controller.alerts.clone();
                fanout::report_and_update(&store, &alerts, debug, check, transition.result, move |id, result| {
                    controller.registry.lock().unwrap().revert(id, result.status);
                })
                .await;
            });
        }

        response
    }

    /// Queries the store for the full check set and applies it under the
    /// lock.
    async fn reload(&self) {
        match self.store.load_checks().await {
            Ok(checks) => {
                let now = Instant::now();
                self.registry.lock().unwrap().reload(checks, now);
            }
            Err(e) => error!("controller: reload error on query: {e}"),
        }
    }
}

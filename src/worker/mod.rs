//! The worker: a fixed-size probe executor pool multiplexed against a
//! single long-lived controller link.

mod controller_link;
mod executor;
mod view_link;

use crate::check::Check;
use crate::config::WorkerConfig;
use crate::controller::Controller;
use crate::probe::Probe;
use crate::proto::{CheckId, CheckResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

pub struct Worker {
    config: WorkerConfig,
    password: String,
    probe: Arc<dyn Probe>,
    shared: Arc<Shared>,
}

/// State shared between the executor pool and the controller-link task:
/// which executors are idle, and which results are waiting to ship.
/// Mirrors `worker.go`'s single worker-level mutex guarding
/// `availableWorkers`/`pendingResults`/`activeController`.
struct Shared {
    controller_ref: Option<Arc<Controller>>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    available_workers: HashMap<usize, oneshot::Sender<CheckId>>,
    pending_results: HashMap<CheckId, CheckResult>,
    active_controller: String,
}

impl Shared {
    fn get_check(&self, id: CheckId) -> Option<Check> {
        self.controller_ref.as_ref().and_then(|c| c.get_check(id))
    }

    fn register_available(&self, worker_id: usize, tx: oneshot::Sender<CheckId>) {
        self.state.lock().unwrap().available_workers.insert(worker_id, tx);
    }

    fn store_result(&self, id: CheckId, result: CheckResult) {
        self.state.lock().unwrap().pending_results.insert(id, result);
    }

    fn active_controller(&self) -> String {
        self.state.lock().unwrap().active_controller.clone()
    }

    fn set_active_controller(&self, addr: String) {
        let mut state = self.state.lock().unwrap();
        if state.active_controller != addr {
            info!("worker: updating controller from {} to {addr}", state.active_controller);
            state.active_controller = addr;
        }
    }

    /// Snapshots capacity and pending results for one controller-link
    /// cycle.
    fn snapshot_request(&self) -> (usize, HashMap<CheckId, CheckResult>) {
        let state = self.state.lock().unwrap();
        (state.available_workers.len(), state.pending_results.clone())
    }

    /// Removes the shipped results, then hands each returned id to one
    /// arbitrary available executor.
    fn apply_response(&self, shipped: &[CheckId], assigned: Vec<CheckId>) {
        let mut state = self.state.lock().unwrap();
        for id in shipped {
            state.pending_results.remove(id);
        }

        let requested = assigned.len();
        let mut distributed = 0;
        for id in assigned {
            let Some(worker_id) = state.available_workers.keys().next().copied() else { break };
            let tx = state.available_workers.remove(&worker_id).unwrap();
            let _ = tx.send(id);
            distributed += 1;
        }
        if distributed != requested {
            warn!("worker: got more checks than able to distribute! ({requested} assigned, {distributed} executors available)");
        }
    }
}

impl Worker {
    pub fn new(config: WorkerConfig, password: String, controller_ref: Option<Arc<Controller>>, probe: Arc<dyn Probe>) -> Worker {
        let shared = Arc::new(Shared { controller_ref, state: Mutex::new(State::default()) });
        Worker { config, password, probe, shared }
    }

    /// Launches the view task, the controller-link task, and the fixed
    /// pool of probe executors.
    pub fn start(&self) {
        let view_shared = self.shared.clone();
        let view_addr = self.config.view_addr;
        tokio::spawn(async move {
            view_link::run(view_addr, view_shared).await;
        });

        let link_shared = self.shared.clone();
        let password = self.password.clone();
        tokio::spawn(async move {
            controller_link::run(link_shared, password).await;
        });

        for worker_id in 0..self.config.num_threads {
            let shared = self.shared.clone();
            let probe = self.probe.clone();
            tokio::spawn(async move {
                executor::run(worker_id, shared, probe).await;
            });
        }
    }
}

//! A single probe executor: owns a one-shot per-cycle channel, registers
//! itself as available, and on receiving a `CheckId` resolves it, runs the
//! probe, and stores the result.

use super::Shared;
use crate::probe::Probe;
use crate::proto::{CheckId, CheckResult};
use std::sync::Arc;
use tokio::sync::oneshot;

pub async fn run(worker_id: usize, shared: Arc<Shared>, probe: Arc<dyn Probe>) {
    loop {
        let (tx, rx) = oneshot::channel();
        shared.register_available(worker_id, tx);

        let Ok(check_id) = rx.await else {
            // The sender side was dropped without a dispatch (e.g. during
            // shutdown); re-register and keep waiting.
            continue;
        };

        let result = resolve_and_run(&shared, &probe, check_id).await;
        shared.store_result(check_id, result);
    }
}

async fn resolve_and_run(shared: &Arc<Shared>, probe: &Arc<dyn Probe>, check_id: CheckId) -> CheckResult {
    let Some(check) = shared.get_check(check_id) else {
        warn!("assigned check id={check_id}, but check not found in local store");
        return CheckResult::fail("check does not exist");
    };

    let probe = probe.clone();
    tokio::task::spawn_blocking(move || {
        let params = crate::check::ProbeParams::decode(&check.check_type, &check.data);
        probe.run(&check.check_type, params.as_ref())
    })
    .await
    .unwrap_or_else(|e| CheckResult::fail(format!("executor panicked: {e}")))
}

//! Transition fan-out: alert delivery plus the store writes that follow a
//! confirmed status change. Runs detached from the registry lock — it
//! must not hold it while making network or store calls, re-acquiring
//! only to `revert` on permanent failure.

use crate::alert::AlertBackend;
use crate::check::Check;
use crate::error::retry;
use crate::proto::{CheckId, CheckResult};
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;

const REPORT_ATTEMPTS: u32 = 10;
const STORE_ATTEMPTS: u32 = 10;
const FAILED_ALERT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Attempts `report`, up to `REPORT_ATTEMPTS` times with 1s back-off. On
/// success, writes the status update and event-log row (each similarly
/// retried). On permanent failure, reverts the in-memory status via
/// `on_revert` so the confirmation machine re-arms for a later retry —
/// a deliberate, must-preserve choice rather than leaving the check stuck
/// on a status nobody could report.
pub async fn report_and_update<F>(
    store: &Arc<dyn Store>,
    alerts: &Arc<dyn AlertBackend>,
    debug: bool,
    check: Check,
    result: CheckResult,
    on_revert: F,
) where
    F: FnOnce(CheckId, CheckResult),
{
    let success = retry(REPORT_ATTEMPTS, || {
        let store = store.clone();
        let alerts = alerts.clone();
        let check = check.clone();
        let result = result.clone();
        async move { report(&store, &alerts, debug, &check, &result).await.is_ok() }
    })
    .await;

    if success {
        let id = check.id;
        let status = result.status;
        retry(STORE_ATTEMPTS, || {
            let store = store.clone();
            async move { store.update_check_status(id, status).await.is_ok() }
        })
        .await;
        retry(STORE_ATTEMPTS, || {
            let store = store.clone();
            async move { store.insert_check_event(id, status).await.is_ok() }
        })
        .await;
    } else {
        on_revert(check.id, result);
    }
}

/// Loads alert routes for this check's new status and dispatches each.
/// Success means at least one route succeeded, to avoid duplicate
/// alerting on a later retry. Routes that failed are retried once after
/// `FAILED_ALERT_RETRY_DELAY`; that retry's outcome is only logged.
async fn report(store: &Arc<dyn Store>, alerts: &Arc<dyn AlertBackend>, debug: bool, check: &Check, result: &CheckResult) -> Result<(), ()> {
    let routes = match store.load_alert_routes(check.id, result.status).await {
        Ok(routes) => routes,
        Err(e) => {
            warn!("controller: failed to load alert routes for check {}: {e}", check.id);
            return Err(());
        }
    };

    if routes.is_empty() {
        return Ok(());
    }

    let mut at_least_one_success = false;
    let mut failed = Vec::new();
    for route in routes {
        match alerts.deliver(route.kind, &route.data, check, result) {
            Ok(()) => at_least_one_success = true,
            Err(e) => {
                if debug {
                    debug!("controller: failed to alert {:?}/{} for check {}: {e} (trying again later)", route.kind, route.data, check.id);
                }
                failed.push(route);
            }
        }
    }

    if !at_least_one_success {
        return Err(());
    }

    if !failed.is_empty() {
        let alerts = alerts.clone();
        let check = check.clone();
        let result = result.clone();
        tokio::spawn(async move {
            tokio::time::sleep(FAILED_ALERT_RETRY_DELAY).await;
            for route in failed {
                if let Err(e) = alerts.deliver(route.kind, &route.data, &check, &result) {
                    error!("controller: permanently failed to alert {:?}/{} for check {}: {e}", route.kind, route.data, check.id);
                }
            }
        });
    }

    Ok(())
}

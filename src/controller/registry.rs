//! The check registry: confirmation state machine, assignment policy, and
//! reload diffing. All public methods here run under the controller's
//! single exclusive lock — this module itself holds no lock; `Controller`
//! wraps a `Registry` in a `std::sync::Mutex`.

use crate::check::{Check, StoredCheck};
use crate::proto::{CheckId, CheckResult, CheckStatus, ControllerResponse};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How long a reload leaves a just-fired transition alone before trusting
/// the store's `status` column again.
pub const RELOAD_STATUS_GRACE: Duration = Duration::from_secs(10 * 60);

/// How stale a lock has to be before a reload force-clears it.
pub const LOCK_EXPIRY: Duration = Duration::from_secs(2 * 60);

pub struct Registry {
    checks: HashMap<CheckId, Check>,
    confirmations: usize,
}

/// A transition that just committed under the lock; fan-out for it must
/// happen outside the lock.
pub struct Transition {
    pub check_id: CheckId,
    pub result: CheckResult,
}

impl Registry {
    pub fn new(confirmations: usize) -> Registry {
        Registry { checks: HashMap::new(), confirmations: confirmations.max(1) }
    }

    pub fn get(&self, id: CheckId) -> Option<Check> {
        self.checks.get(&id).cloned()
    }

    /// Reverts a committed status back to its opposite, re-arming the
    /// confirmation machine for a later retry. Named explicitly as a
    /// helper rather than inlined at the call site so the state machine
    /// stays auditable.
    pub fn revert(&mut self, id: CheckId, failed_status: CheckStatus) {
        if let Some(check) = self.checks.get_mut(&id) {
            check.status = failed_status.opposite();
        }
    }

    /// Applies a fresh snapshot from the store: upserts by id, removes ids
    /// no longer present, and force-clears locks older than
    /// `LOCK_EXPIRY`.
    pub fn reload(&mut self, fresh: Vec<StoredCheck>, now: Instant) {
        let mut seen = std::collections::HashSet::with_capacity(fresh.len());
        for stored in fresh {
            seen.insert(stored.id);
            match self.checks.get_mut(&stored.id) {
                Some(check) => check.apply_reload(stored, now, RELOAD_STATUS_GRACE),
                None => {
                    self.checks.insert(stored.id, Check::from_stored(stored, now));
                }
            }
        }
        self.checks.retain(|id, _| seen.contains(id));
        for check in self.checks.values_mut() {
            if check.is_locked() && now.duration_since(check.lock_time) >= LOCK_EXPIRY {
                check.clear_lock();
            }
        }
    }

    /// Runs the full per-request algorithm: ingest results into the
    /// confirmation machine, then select assignments for the requestor.
    /// Returns the response to send back plus any transitions that just
    /// committed (for the caller to fan out after releasing the lock).
    pub fn handle_request(
        &mut self,
        requestor: &str,
        results: HashMap<CheckId, CheckResult>,
        count: usize,
        now: Instant,
    ) -> (ControllerResponse, Vec<Transition>) {
        let mut transitions = Vec::new();

        for (id, result) in results {
            let Some(check) = self.checks.get_mut(&id) else { continue };
            if check.lock != requestor {
                continue;
            }

            check.clear_lock();
            check.last_time = now;
            check.last_worker = requestor.to_string();

            if result.status != CheckStatus::Online && result.status != CheckStatus::Offline {
                continue;
            }

            if result.status == check.status {
                check.turn_count = 0;
                check.turn_set.clear();
                continue;
            }

            check.turn_set.insert(requestor.to_string());
            if check.turn_set.len() >= self.confirmations {
                check.turn_set.clear();
                check.turn_count += 1;
                if check.turn_count > check.delay {
                    check.status = result.status;
                    check.last_status_change = now;
                    check.turn_count = 0;
                    transitions.push(Transition { check_id: id, result: result.clone() });
                }
            }
        }

        let mut response = ControllerResponse::default();
        for (id, check) in self.checks.iter_mut() {
            if response.checks.len() >= count {
                break;
            }
            if check.is_locked() {
                continue;
            }

            let assign = if !check.turn_set.is_empty() {
                !check.turn_set.contains(requestor)
            } else {
                now.duration_since(check.last_time) > Duration::from_secs(check.interval_secs)
                    && check.last_worker != requestor
            };

            if assign {
                check.lock = requestor.to_string();
                check.lock_time = now;
                response.checks.push(*id);
            }
        }

        (response, transitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_check(id: CheckId, status: CheckStatus, interval_secs: u64, delay: u32) -> StoredCheck {
        StoredCheck {
            id,
            name: format!("check-{id}"),
            check_type: "tcp".into(),
            data: serde_json::json!({}),
            interval_secs,
            delay,
            status,
        }
    }

    fn registry_with(confirmations: usize, checks: Vec<StoredCheck>, now: Instant) -> Registry {
        let mut reg = Registry::new(confirmations);
        reg.reload(checks, now);
        reg
    }

    /// Single-worker flap: Confirmations=2, Delay=0. Three single-worker
    /// offline reports never reach quorum, so status never flips.
    #[test]
    fn single_worker_flap_never_commits() {
        let t0 = Instant::now();
        let mut reg = registry_with(2, vec![fresh_check(1, CheckStatus::Online, 0, 0)], t0);

        for i in 0..3 {
            let mut results = HashMap::new();
            results.insert(1, CheckResult::offline("down"));
            // lock must be held by "A" for the result to be accepted
            reg.checks.get_mut(&1).unwrap().lock = "A".into();
            let (_resp, transitions) = reg.handle_request("A", results, 0, t0 + Duration::from_secs(i));
            assert!(transitions.is_empty());
        }
        assert_eq!(reg.get(1).unwrap().status, CheckStatus::Online);
        assert_eq!(reg.get(1).unwrap().turn_set.len(), 1);
    }

    /// Two-worker confirmation: Confirmations=2, Delay=0. A reports
    /// offline (turn_set={A}), then B reports offline and the quorum
    /// fires immediately (turn_count 1 > delay 0).
    #[test]
    fn two_worker_confirmation_commits_on_quorum() {
        let t0 = Instant::now();
        let mut reg = registry_with(2, vec![fresh_check(1, CheckStatus::Online, 0, 0)], t0);

        reg.checks.get_mut(&1).unwrap().lock = "A".into();
        let mut r = HashMap::new();
        r.insert(1, CheckResult::offline("down"));
        let (_resp, transitions) = reg.handle_request("A", r.clone(), 0, t0);
        assert!(transitions.is_empty());
        assert_eq!(reg.get(1).unwrap().turn_set.len(), 1);

        reg.checks.get_mut(&1).unwrap().lock = "B".into();
        let (_resp, transitions) = reg.handle_request("B", r, 0, t0);
        assert_eq!(transitions.len(), 1);
        assert_eq!(reg.get(1).unwrap().status, CheckStatus::Offline);
        assert!(reg.get(1).unwrap().turn_set.is_empty());
    }

    /// Delay: Confirmations=1, Delay=2. Three consecutive single-worker
    /// offline reports produce turn_count 1, 2, 3; only the third commits.
    #[test]
    fn delay_requires_delay_plus_one_quora() {
        let t0 = Instant::now();
        let mut reg = registry_with(1, vec![fresh_check(1, CheckStatus::Online, 0, 2)], t0);

        let mut committed_at = None;
        for i in 0..3 {
            reg.checks.get_mut(&1).unwrap().lock = "A".into();
            let mut r = HashMap::new();
            r.insert(1, CheckResult::offline("down"));
            let (_resp, transitions) = reg.handle_request("A", r, 0, t0 + Duration::from_secs(i));
            if !transitions.is_empty() {
                committed_at = Some(i);
            }
        }
        assert_eq!(committed_at, Some(2));
        assert_eq!(reg.get(1).unwrap().status, CheckStatus::Offline);
    }

    /// Reset: offline (from A) then online (from A) on an online check
    /// yields turn_set={A} then turn_set=empty, turn_count=0.
    #[test]
    fn same_status_report_resets_turn_state() {
        let t0 = Instant::now();
        let mut reg = registry_with(2, vec![fresh_check(1, CheckStatus::Online, 0, 0)], t0);

        reg.checks.get_mut(&1).unwrap().lock = "A".into();
        let mut r = HashMap::new();
        r.insert(1, CheckResult::offline("down"));
        reg.handle_request("A", r, 0, t0);
        assert_eq!(reg.get(1).unwrap().turn_set.len(), 1);

        reg.checks.get_mut(&1).unwrap().lock = "A".into();
        let mut r = HashMap::new();
        r.insert(1, CheckResult::online());
        reg.handle_request("A", r, 0, t0);
        assert!(reg.get(1).unwrap().turn_set.is_empty());
        assert_eq!(reg.get(1).unwrap().turn_count, 0);
    }

    /// Monotonic lock: assigning a check always gives it exactly one lock
    /// holder, and a locked check is never handed to a second requestor.
    #[test]
    fn assignment_respects_monotonic_lock() {
        let t0 = Instant::now();
        let mut reg = registry_with(1, vec![fresh_check(1, CheckStatus::Online, 0, 0)], t0);
        let later = t0 + Duration::from_secs(1);

        let (resp_a, _) = reg.handle_request("A", HashMap::new(), 1, later);
        assert_eq!(resp_a.checks, vec![1]);
        assert!(reg.get(1).unwrap().is_locked());

        // B asks for work while the check is locked by A: nothing to give.
        let (resp_b, _) = reg.handle_request("B", HashMap::new(), 1, later);
        assert!(resp_b.checks.is_empty());
    }

    /// Anti-affinity: a check last executed by "A" is not reassigned to
    /// "A" on the next cadence tick while "B" has capacity.
    #[test]
    fn anti_affinity_avoids_last_executor() {
        let t0 = Instant::now();
        let mut reg = registry_with(1, vec![fresh_check(1, CheckStatus::Online, 0, 0)], t0);
        reg.checks.get_mut(&1).unwrap().last_worker = "A".into();
        reg.checks.get_mut(&1).unwrap().last_time = t0;

        let later = t0 + Duration::from_secs(1);
        let (resp_a, _) = reg.handle_request("A", HashMap::new(), 1, later);
        assert!(resp_a.checks.is_empty(), "must not reassign to the last executor");

        let (resp_b, _) = reg.handle_request("B", HashMap::new(), 1, later);
        assert_eq!(resp_b.checks, vec![1]);
    }

    /// Idempotent reload: reloading identical data leaves turn/lock/status
    /// bookkeeping untouched and only refreshes mutable scalar fields.
    #[test]
    fn idempotent_reload_preserves_registry_state() {
        let t0 = Instant::now();
        let mut reg = registry_with(2, vec![fresh_check(1, CheckStatus::Online, 30, 1)], t0);
        reg.checks.get_mut(&1).unwrap().lock = "A".into();
        reg.checks.get_mut(&1).unwrap().turn_set.insert("A".into());
        reg.checks.get_mut(&1).unwrap().turn_count = 1;
        let before = reg.get(1).unwrap();

        reg.reload(vec![fresh_check(1, CheckStatus::Online, 30, 1)], t0 + Duration::from_secs(5));
        let after = reg.get(1).unwrap();

        assert_eq!(after.lock, before.lock);
        assert_eq!(after.turn_set, before.turn_set);
        assert_eq!(after.turn_count, before.turn_count);
        assert_eq!(after.last_status_change, before.last_status_change);
        assert_eq!(after.status, before.status);
    }

    /// Reload removes ids no longer present in the store and force-clears
    /// locks older than the expiry window.
    #[test]
    fn reload_deletes_missing_ids_and_clears_stale_locks() {
        let t0 = Instant::now();
        let mut reg =
            registry_with(1, vec![fresh_check(1, CheckStatus::Online, 0, 0), fresh_check(2, CheckStatus::Online, 0, 0)], t0);
        reg.checks.get_mut(&1).unwrap().lock = "A".into();
        reg.checks.get_mut(&1).unwrap().lock_time = t0;

        let later = t0 + LOCK_EXPIRY + Duration::from_secs(1);
        reg.reload(vec![fresh_check(1, CheckStatus::Online, 0, 0)], later);

        assert!(reg.get(2).is_none(), "check 2 dropped from store must be removed");
        assert!(!reg.get(1).unwrap().is_locked(), "stale lock must be cleared");
    }

    /// A pending transition (non-empty turn_set) forces assignment to a
    /// worker that hasn't yet confirmed, overriding the normal cadence
    /// check.
    #[test]
    fn pending_turn_forces_a_different_confirmer() {
        let t0 = Instant::now();
        let mut reg = registry_with(2, vec![fresh_check(1, CheckStatus::Online, 3600, 0)], t0);
        reg.checks.get_mut(&1).unwrap().turn_set.insert("A".into());

        // B has not confirmed yet and the check isn't locked: assign to B
        // even though the cadence interval (3600s) hasn't elapsed.
        let (resp_b, _) = reg.handle_request("B", HashMap::new(), 1, t0);
        assert_eq!(resp_b.checks, vec![1]);

        reg.checks.get_mut(&1).unwrap().clear_lock();
        // A already in the turn set: must not be reassigned to confirm its
        // own pending turn.
        let (resp_a, _) = reg.handle_request("A", HashMap::new(), 1, t0);
        assert!(resp_a.checks.is_empty());
    }
}

//! The small, enumerated SQL-shaped interface the controller reads and
//! writes through, a 1:1 read of the five SQL statements in
//! `controller.go`/`alert.go`.

use crate::alert::{AlertKind, AlertRoute};
use crate::check::StoredCheck;
use crate::error::StoreError;
use crate::proto::{CheckId, CheckStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[async_trait]
pub trait Store: Send + Sync {
    /// `SELECT id, name, type, data, check_interval, delay, status FROM checks`
    async fn load_checks(&self) -> Result<Vec<StoredCheck>, StoreError>;

    /// `UPDATE checks SET status = ? WHERE id = ?`
    async fn update_check_status(&self, id: CheckId, status: CheckStatus) -> Result<(), StoreError>;

    /// `INSERT INTO check_events (check_id, type) VALUES (?, ?)`
    async fn insert_check_event(&self, id: CheckId, status: CheckStatus) -> Result<(), StoreError>;

    /// `SELECT contacts.type, contacts.data FROM contacts, alerts WHERE
    /// alerts.check_id = ? AND alerts.contact_id = contacts.id AND
    /// (alerts.type = 'both' OR alerts.type = ?)`
    async fn load_alert_routes(&self, id: CheckId, when: CheckStatus) -> Result<Vec<AlertRoute>, StoreError>;

    /// `INSERT INTO charges (check_id, type, data) VALUES (?, ?, ?)`
    async fn insert_charge(&self, id: CheckId, kind: AlertKind, data: &str) -> Result<(), StoreError>;
}

/// In-memory store backing the test suite. No real database driver is in
/// scope; the persistent store is an external collaborator.
#[derive(Default)]
pub struct MemStore {
    pub checks: Mutex<HashMap<CheckId, StoredCheck>>,
    pub routes: Mutex<HashMap<CheckId, Vec<AlertRoute>>>,
    pub events: Mutex<Vec<(CheckId, CheckStatus)>>,
    pub charges: Mutex<Vec<(CheckId, AlertKind, String)>>,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore::default()
    }

    pub fn with_check(self, check: StoredCheck) -> Self {
        self.checks.lock().unwrap().insert(check.id, check);
        self
    }

    pub fn with_route(self, route: AlertRoute) -> Self {
        self.routes.lock().unwrap().entry(route.check_id).or_default().push(route);
        self
    }
}

#[async_trait]
impl Store for MemStore {
    async fn load_checks(&self) -> Result<Vec<StoredCheck>, StoreError> {
        Ok(self.checks.lock().unwrap().values().cloned().collect())
    }

    async fn update_check_status(&self, id: CheckId, status: CheckStatus) -> Result<(), StoreError> {
        if let Some(check) = self.checks.lock().unwrap().get_mut(&id) {
            check.status = status;
        }
        Ok(())
    }

    async fn insert_check_event(&self, id: CheckId, status: CheckStatus) -> Result<(), StoreError> {
        self.events.lock().unwrap().push((id, status));
        Ok(())
    }

    async fn load_alert_routes(&self, id: CheckId, when: CheckStatus) -> Result<Vec<AlertRoute>, StoreError> {
        let routes = self.routes.lock().unwrap();
        Ok(routes
            .get(&id)
            .into_iter()
            .flatten()
            .filter(|r| r.when.matches(when))
            .cloned()
            .collect())
    }

    async fn insert_charge(&self, id: CheckId, kind: AlertKind, data: &str) -> Result<(), StoreError> {
        self.charges.lock().unwrap().push((id, kind, data.to_string()));
        Ok(())
    }
}

//! Alert routes and the delivery backend trait. Delivery is a single
//! opaque collaborator; kind dispatch is a closed enum rather than the
//! `alerts.type` string column it's read out of.

use crate::check::Check;
use crate::error::AlertError;
use crate::proto::{CheckId, CheckResult, CheckStatus};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Email,
    Http,
    Sms,
    Voice,
}

/// `when` column of the `alerts` table: which new statuses this route
/// should fire for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertWhen {
    Online,
    Offline,
    Both,
}

impl AlertWhen {
    pub fn matches(self, status: CheckStatus) -> bool {
        matches!(
            (self, status),
            (AlertWhen::Both, _) | (AlertWhen::Online, CheckStatus::Online) | (AlertWhen::Offline, CheckStatus::Offline)
        )
    }
}

/// A single contact+kind route, as joined from `alerts`/`contacts` at
/// fan-out time.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertRoute {
    pub check_id: CheckId,
    pub kind: AlertKind,
    pub data: String,
    pub when: AlertWhen,
}

/// External alert-delivery collaborator (SMTP/SMS/voice/webhook); only
/// this interface matters to the coordination plane.
pub trait AlertBackend: Send + Sync {
    fn deliver(
        &self,
        kind: AlertKind,
        data: &str,
        check: &Check,
        result: &CheckResult,
    ) -> Result<(), AlertError>;
}

/// Records every delivery attempt in memory; used by tests and by a
/// stand-alone process with no SMTP/Twilio configured.
#[derive(Default)]
pub struct NullAlertBackend {
    pub delivered: std::sync::Mutex<Vec<(AlertKind, String)>>,
    pub fail_kinds: std::sync::Mutex<std::collections::HashSet<AlertKind>>,
}

impl AlertBackend for NullAlertBackend {
    fn deliver(
        &self,
        kind: AlertKind,
        data: &str,
        _check: &Check,
        _result: &CheckResult,
    ) -> Result<(), AlertError> {
        if self.fail_kinds.lock().unwrap().contains(&kind) {
            return Err(AlertError(format!("{kind:?} delivery forced to fail")));
        }
        self.delivered.lock().unwrap().push((kind, data.to_string()));
        Ok(())
    }
}

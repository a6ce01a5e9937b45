//! The in-memory `Check` record owned by the controller's registry, and the
//! typed probe parameters a check's `data` blob decodes into.

use crate::proto::{CheckId, CheckStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

/// A probe definition as loaded from the store: the fields that are
/// immutable per reload, plus the status a fresh row carries on first
/// load.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredCheck {
    pub id: CheckId,
    pub name: String,
    pub check_type: String,
    pub data: serde_json::Value,
    pub interval_secs: u64,
    pub delay: u32,
    pub status: CheckStatus,
}

/// The controller's authoritative, mutable record for a check. `lock`,
/// `turn_set`, `turn_count`, `last_status_change` and friends exist only
/// here — never in the store.
#[derive(Debug, Clone)]
pub struct Check {
    pub id: CheckId,
    pub name: String,
    pub check_type: String,
    pub data: serde_json::Value,
    pub interval_secs: u64,
    pub delay: u32,

    pub status: CheckStatus,

    /// Worker identity currently entitled to submit the next result.
    /// Empty string means unassigned.
    pub lock: String,
    pub lock_time: Instant,
    pub last_worker: String,
    pub last_time: Instant,

    /// Workers that have reported the pending new status this turn.
    pub turn_set: HashSet<String>,
    pub turn_count: u32,
    pub last_status_change: Instant,
}

impl Check {
    pub fn from_stored(stored: StoredCheck, now: Instant) -> Check {
        Check {
            id: stored.id,
            name: stored.name,
            check_type: stored.check_type,
            data: stored.data,
            interval_secs: stored.interval_secs,
            delay: stored.delay,
            status: stored.status,
            lock: String::new(),
            lock_time: now,
            last_worker: String::new(),
            last_time: now,
            turn_set: HashSet::new(),
            turn_count: 0,
            last_status_change: now,
        }
    }

    /// Applies the mutable fields of a fresh store row: `name`, `type`,
    /// `data`, `interval`, `delay` always; `status` only if the last
    /// confirmed transition is older than `grace`.
    pub fn apply_reload(&mut self, stored: StoredCheck, now: Instant, grace: std::time::Duration) {
        self.name = stored.name;
        self.check_type = stored.check_type;
        self.data = stored.data;
        self.interval_secs = stored.interval_secs;
        self.delay = stored.delay;
        if now.duration_since(self.last_status_change) >= grace {
            self.status = stored.status;
        }
    }

    pub fn is_locked(&self) -> bool {
        !self.lock.is_empty()
    }

    pub fn clear_lock(&mut self) {
        self.lock.clear();
    }
}

/// Tagged probe parameters: closed variants instead of dynamic dispatch
/// by string key, ported from `check_params.go`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProbeParams {
    Http {
        url: String,
        #[serde(default)]
        method: Option<String>,
        #[serde(default)]
        body: String,
        #[serde(default)]
        headers: std::collections::HashMap<String, String>,
        #[serde(default)]
        timeout_secs: Option<u32>,
        #[serde(default)]
        insecure: bool,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        expect_status: Option<u16>,
        #[serde(default)]
        expect_substring: Option<String>,
    },
    Tcp {
        address: String,
        #[serde(default)]
        timeout_secs: Option<u32>,
        #[serde(default)]
        payload: String,
        #[serde(default)]
        force_ip: Option<u8>,
        #[serde(default)]
        expect: Option<String>,
    },
    Icmp {
        target: String,
        #[serde(default)]
        packet_loss: bool,
        #[serde(default)]
        force_ip: Option<u8>,
    },
    SslExpire {
        address: String,
        days: u32,
    },
    Dns {
        #[serde(default)]
        server: Option<String>,
        name: String,
        record_type: String,
        #[serde(default)]
        expect: Option<String>,
    },
}

impl ProbeParams {
    /// Decodes `check.data` according to `check.check_type`. Returns `None`
    /// on an unknown type or undecodable blob — the caller turns this into
    /// a `fail` result, the same as `check.go`'s `checkFuncs[type] == nil`
    /// branch, never a panic.
    pub fn decode(check_type: &str, data: &serde_json::Value) -> Option<ProbeParams> {
        let tagged = match check_type {
            "http" | "tcp" | "icmp" | "sslexpire" | "dns" => {
                let mut obj = data.as_object()?.clone();
                obj.insert("type".to_string(), serde_json::Value::String(check_type.to_string()));
                serde_json::Value::Object(obj)
            }
            _ => return None,
        };
        serde_json::from_value(tagged).ok()
    }
}

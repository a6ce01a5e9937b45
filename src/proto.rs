//! Wire types shared by every worker<->controller and view-server<->worker
//! session: the line-delimited JSON request/response pair and the result
//! map's stringified-id encoding.

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque, store-stable check identifier.
pub type CheckId = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Online,
    Offline,
    /// Worker-only: probe type missing or check vanished. Never persisted
    /// and never fed into the confirmation machine.
    Fail,
}

impl CheckStatus {
    /// The status a confirmed transition away from `self` would flip to.
    /// Only meaningful for `Online`/`Offline`; panics on `Fail`, which
    /// never reaches the confirmation machine (see `controller::registry`).
    pub fn opposite(self) -> CheckStatus {
        match self {
            CheckStatus::Online => CheckStatus::Offline,
            CheckStatus::Offline => CheckStatus::Online,
            CheckStatus::Fail => panic!("fail status has no opposite"),
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckStatus::Online => "online",
            CheckStatus::Offline => "offline",
            CheckStatus::Fail => "fail",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    #[serde(default)]
    pub message: String,
}

impl CheckResult {
    pub fn online() -> CheckResult {
        CheckResult { status: CheckStatus::Online, message: String::new() }
    }

    pub fn offline(message: impl Into<String>) -> CheckResult {
        CheckResult { status: CheckStatus::Offline, message: message.into() }
    }

    pub fn fail(message: impl Into<String>) -> CheckResult {
        CheckResult { status: CheckStatus::Fail, message: message.into() }
    }
}

/// `{id -> result}`, serialized with decimal-string keys since JSON object
/// keys must be strings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CheckResults(pub HashMap<CheckId, CheckResult>);

impl Serialize for CheckResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, result) in &self.0 {
            map.serialize_entry(&id.to_string(), result)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CheckResults {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ResultsVisitor;
        impl<'de> Visitor<'de> for ResultsVisitor {
            type Value = CheckResults;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of decimal check ids to check results")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut out = HashMap::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, CheckResult>()? {
                    let id: CheckId = key.parse().map_err(serde::de::Error::custom)?;
                    out.insert(id, value);
                }
                Ok(CheckResults(out))
            }
        }
        deserializer.deserialize_map(ResultsVisitor)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ControllerRequest {
    pub results: CheckResults,
    pub count: usize,
}

impl ControllerRequest {
    pub fn empty() -> ControllerRequest {
        ControllerRequest::default()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ControllerResponse {
    pub checks: Vec<CheckId>,
}

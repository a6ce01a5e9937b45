//! The probe collaborator: `run_probe(type, params) -> online |
//! offline(reason)`. Probe implementations themselves (HTTP, TCP, ICMP,
//! DNS, TLS expiry) are out of scope; only this interface and a couple of
//! fixed stand-ins matter to the coordination plane.

use crate::check::ProbeParams;
use crate::proto::CheckResult;

pub trait Probe: Send + Sync {
    /// Runs a probe for the given check type against its decoded params.
    /// `check_type` is passed alongside `params` so an unrecognized type
    /// (one `ProbeParams::decode` couldn't parse) can still be reported as
    /// `fail` rather than panicking.
    fn run(&self, check_type: &str, params: Option<&ProbeParams>) -> CheckResult;
}

/// Always returns a fixed result, regardless of check type or params.
/// Used by tests and by deployments that haven't wired in real probe
/// backends yet.
pub struct NullProbe {
    pub result: CheckResult,
}

impl NullProbe {
    pub fn always_online() -> NullProbe {
        NullProbe { result: CheckResult::online() }
    }

    pub fn always_offline(message: impl Into<String>) -> NullProbe {
        NullProbe { result: CheckResult::offline(message) }
    }
}

impl Probe for NullProbe {
    fn run(&self, check_type: &str, params: Option<&ProbeParams>) -> CheckResult {
        if params.is_none() {
            return CheckResult::fail(format!("invalid check type: {check_type}"));
        }
        self.result.clone()
    }
}

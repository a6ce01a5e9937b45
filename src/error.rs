//! A small, `io::Error`-centered error surface: no deep hierarchy, a
//! handful of variants, `From` impls at the seams.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum BearmonError {
    Io(io::Error),
    Protocol(String),
    Store(StoreError),
    Config(String),
}

impl fmt::Display for BearmonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BearmonError::Io(e) => write!(f, "io error: {e}"),
            BearmonError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            BearmonError::Store(e) => write!(f, "store error: {e}"),
            BearmonError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for BearmonError {}

impl From<io::Error> for BearmonError {
    fn from(e: io::Error) -> Self {
        BearmonError::Io(e)
    }
}

impl From<serde_json::Error> for BearmonError {
    fn from(e: serde_json::Error) -> Self {
        BearmonError::Protocol(e.to_string())
    }
}

impl From<StoreError> for BearmonError {
    fn from(e: StoreError) -> Self {
        BearmonError::Store(e)
    }
}

/// Failures surfaced by the `Store` trait's enumerated SQL-shaped
/// operations.
#[derive(Debug, Clone)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for StoreError {}

/// Alert delivery failure: a route's `deliver` call came back `error`
/// instead of `ok`.
#[derive(Debug, Clone)]
pub struct AlertError(pub String);

impl fmt::Display for AlertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for AlertError {}

/// Retries `f` up to `attempts` times with a 1s back-off between attempts,
/// returning `true` on the first success. Ported from `retry()` in
/// `gobearmon.go`.
pub async fn retry<F, Fut>(attempts: u32, mut f: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..attempts {
        if f().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
    false
}

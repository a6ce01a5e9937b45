#[macro_use]
extern crate log;

pub mod alert;
pub mod check;
pub mod config;
pub mod controller;
pub mod error;
pub mod probe;
pub mod proto;
pub mod store;
pub mod viewserver;
pub mod worker;
